//! Action-scoped request tokens for the settings form and AJAX calls.
//!
//! A token is the SHA-256 of a per-install secret, the action, the user id
//! and the current tick, truncated for transport. Ticks last half of the
//! configured lifetime and a token verifies in its own tick and the one
//! before it.

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;

use tier_engine::UserId;

/// Form action guarded on the settings page.
pub const SAVE_ACTION: &str = "pricetier_save";
/// Action guarded on the AJAX endpoints.
pub const ADMIN_ACTION: &str = "pricetier_admin";

/// Token lifetime settings.
#[derive(Debug, Clone)]
pub struct NonceConfig {
    /// Full validity window; one tick is half of it.
    pub lifetime: Duration,
    /// Hex characters kept from the digest.
    pub token_len: usize,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(24 * 60 * 60),
            token_len: 10,
        }
    }
}

/// How old a verified token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceAge {
    /// Issued in the current tick.
    Current,
    /// Issued in the previous tick.
    Previous,
}

/// Issues and checks tokens.
pub struct Nonces {
    secret: [u8; 32],
    config: NonceConfig,
}

impl Nonces {
    /// Fresh random secret.
    pub fn new(config: NonceConfig) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret, config }
    }

    /// Fixed secret, for deterministic tokens across processes.
    pub fn with_secret(secret: [u8; 32], config: NonceConfig) -> Self {
        Self { secret, config }
    }

    fn tick(&self, now: DateTime<Utc>) -> i64 {
        let half = (self.config.lifetime.as_secs() / 2).max(1) as i64;
        // ceil like the host, so a tick boundary starts a new tick
        (now.timestamp() + half - 1) / half
    }

    fn token_for(&self, tick: i64, action: &str, user: UserId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(tick.to_be_bytes());
        hasher.update(b"|");
        hasher.update(action.as_bytes());
        hasher.update(b"|");
        hasher.update(user.0.to_be_bytes());

        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(self.config.token_len.min(hex.len()));
        hex
    }

    pub fn create(&self, action: &str, user: UserId) -> String {
        self.create_at(action, user, Utc::now())
    }

    pub fn create_at(&self, action: &str, user: UserId, now: DateTime<Utc>) -> String {
        self.token_for(self.tick(now), action, user)
    }

    pub fn verify(&self, token: &str, action: &str, user: UserId) -> Option<NonceAge> {
        self.verify_at(token, action, user, Utc::now())
    }

    pub fn verify_at(&self, token: &str, action: &str, user: UserId, now: DateTime<Utc>) -> Option<NonceAge> {
        if token.is_empty() {
            return None;
        }
        let tick = self.tick(now);
        if constant_time_eq(token, &self.token_for(tick, action, user)) {
            return Some(NonceAge::Current);
        }
        if constant_time_eq(token, &self.token_for(tick - 1, action, user)) {
            return Some(NonceAge::Previous);
        }
        None
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn nonces() -> Nonces {
        Nonces::with_secret([7u8; 32], NonceConfig::default())
    }

    #[test]
    fn test_round_trip() {
        let n = nonces();
        let token = n.create(SAVE_ACTION, UserId(4));
        assert_eq!(token.len(), 10);
        assert!(token.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert!(n.verify(&token, SAVE_ACTION, UserId(4)).is_some());
    }

    #[test]
    fn test_scoped_to_action_and_user() {
        let n = nonces();
        let token = n.create(SAVE_ACTION, UserId(4));
        assert_eq!(n.verify(&token, ADMIN_ACTION, UserId(4)), None);
        assert_eq!(n.verify(&token, SAVE_ACTION, UserId(5)), None);
        assert_eq!(n.verify("", SAVE_ACTION, UserId(4)), None);
    }

    #[test]
    fn test_previous_tick_still_valid() {
        let n = nonces();
        let issued = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let token = n.create_at(ADMIN_ACTION, UserId(1), issued);

        let next_tick = issued + ChronoDuration::hours(12);
        assert_eq!(
            n.verify_at(&token, ADMIN_ACTION, UserId(1), next_tick),
            Some(NonceAge::Previous)
        );

        let expired = issued + ChronoDuration::hours(24);
        assert_eq!(n.verify_at(&token, ADMIN_ACTION, UserId(1), expired), None);
    }

    #[test]
    fn test_secrets_differ_per_install() {
        let a = Nonces::new(NonceConfig::default());
        let b = Nonces::new(NonceConfig::default());
        assert_ne!(a.create(SAVE_ACTION, UserId(1)), b.create(SAVE_ACTION, UserId(1)));
    }
}
