//! Self-update checks against the latest GitHub release.
//!
//! The host asks twice: once while refreshing its update list
//! (`check_update`) and once when showing the plugin details dialog
//! (`plugin_info`). Both fetch the latest release, optionally through a
//! 12 hour transient. Any failure on the way means "no update known".

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::Transients;
use crate::types::OptionStore;

/// WordPress versions the release is declared against.
const TESTED_UP_TO: &str = "6.7";
const REQUIRES_WP: &str = "6.0";
const REQUIRES_PHP: &str = "7.4";

const CONNECT_TIMEOUT_MS: u64 = 3_000;

// ================================================================================================
// CONFIGURATION AND ERRORS
// ================================================================================================

/// Release source and cache settings.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// API root, without trailing slash.
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub installed_version: String,
    pub slug: String,
    pub basename: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Serve releases from the transient when one is stored.
    pub cache_allowed: bool,
    pub cache_ttl: chrono::Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: "adeelwebify".to_string(),
            repo: "pricetier".to_string(),
            installed_version: "1.0.0".to_string(),
            slug: "pricetier".to_string(),
            basename: "pricetier/pricetier.php".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: "WordPress/6.7; http://localhost".to_string(),
            cache_allowed: false,
            cache_ttl: chrono::Duration::hours(12),
        }
    }
}

impl UpdaterConfig {
    pub fn release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }

    pub fn cache_key(&self) -> String {
        format!("pricetier_updater_{}_release_info", self.slug)
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Release request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Release API returned {0}")]
    Status(StatusCode),

    #[error("Unusable release payload: {0}")]
    InvalidBody(String),
}

// ================================================================================================
// RELEASE RECORDS
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSections {
    pub description: String,
    pub installation: String,
    pub changelog: String,
}

/// The latest release, reduced to what the update screens need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRelease {
    pub name: String,
    pub version: String,
    pub last_updated: String,
    pub download_url: String,
    pub author: String,
    pub tested: String,
    pub requires: String,
    pub requires_php: String,
    pub sections: ReleaseSections,
}

fn str_field<'v>(value: &'v Value, key: &str) -> &'v str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

impl RemoteRelease {
    /// Reads a GitHub "latest release" payload. The first asset whose name
    /// contains `.zip` is preferred over the source zipball.
    pub fn from_github(body: &Value) -> Result<Self, UpdateError> {
        let fields = match body.as_object() {
            Some(fields) if !fields.is_empty() => fields,
            _ => return Err(UpdateError::InvalidBody("expected a non-empty object".to_string())),
        };

        let tag = str_field(body, "tag_name");
        let version = tag.strip_prefix('v').unwrap_or(tag).to_string();

        let asset_url = fields
            .get("assets")
            .and_then(Value::as_array)
            .and_then(|assets| {
                assets
                    .iter()
                    .find(|a| str_field(a, "name").contains(".zip"))
                    .map(|a| str_field(a, "browser_download_url").to_string())
            });
        let download_url = asset_url.unwrap_or_else(|| str_field(body, "zipball_url").to_string());

        let changelog = match fields.get("body") {
            Some(Value::String(text)) => nl2br(text),
            Some(Value::Null) | None => "No changelog provided.".to_string(),
            Some(other) => nl2br(&other.to_string()),
        };

        Ok(RemoteRelease {
            name: str_field(body, "name").to_string(),
            version,
            last_updated: str_field(body, "published_at").to_string(),
            download_url,
            author: body.get("author").map(|a| str_field(a, "login")).unwrap_or("").to_string(),
            tested: TESTED_UP_TO.to_string(),
            requires: REQUIRES_WP.to_string(),
            requires_php: REQUIRES_PHP.to_string(),
            sections: ReleaseSections {
                description: "Latest version from GitHub.".to_string(),
                installation: "Install via the Updates page.".to_string(),
                changelog,
            },
        })
    }
}

/// Update offer filed under the plugin basename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOffer {
    pub slug: String,
    pub plugin: String,
    pub new_version: String,
    pub tested: String,
    pub package: String,
}

/// The host's update-list transient: installed versions by basename and
/// the offers found so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTransient {
    #[serde(default)]
    pub checked: BTreeMap<String, String>,
    #[serde(default)]
    pub response: BTreeMap<String, UpdateOffer>,
}

/// Plugin details dialog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub slug: String,
    pub version: String,
    pub tested: String,
    pub requires: String,
    pub author: String,
    pub requires_php: String,
    pub last_updated: String,
    pub sections: ReleaseSections,
    pub download_link: String,
    pub trunk: String,
}

// ================================================================================================
// UPDATER
// ================================================================================================

pub struct Updater {
    config: UpdaterConfig,
    http_client: Client,
    cache: Option<Arc<dyn OptionStore>>,
}

impl Updater {
    pub fn new(config: UpdaterConfig) -> Result<Self, UpdateError> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS).min(config.timeout))
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(UpdateError::Client)?;

        Ok(Updater {
            config,
            http_client,
            cache: None,
        })
    }

    /// Stores fetched releases as a transient in `store`.
    pub fn with_cache(mut self, store: Arc<dyn OptionStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Fetches and parses the latest release.
    pub async fn fetch_release(&self) -> Result<RemoteRelease, UpdateError> {
        let url = self.config.release_url();
        let response = self
            .http_client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(UpdateError::Status(response.status()));
        }

        let text = response.text().await?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| UpdateError::InvalidBody(e.to_string()))?;
        RemoteRelease::from_github(&body)
    }

    fn cached_release(&self) -> Option<RemoteRelease> {
        if !self.config.cache_allowed {
            return None;
        }
        let store = self.cache.as_ref()?;
        let raw = Transients::new(store.as_ref()).get(&self.config.cache_key())?;
        serde_json::from_value(raw).ok()
    }

    fn store_release(&self, release: &RemoteRelease) {
        let Some(store) = self.cache.as_ref() else {
            return;
        };
        let encoded = match serde_json::to_value(release) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode release for cache: {}", e);
                return;
            }
        };
        if let Err(e) = Transients::new(store.as_ref()).set(&self.config.cache_key(), encoded, self.config.cache_ttl) {
            warn!("Failed to cache release info: {}", e);
        }
    }

    /// The latest release, or `None` when it cannot be determined.
    pub async fn remote(&self) -> Option<RemoteRelease> {
        if let Some(release) = self.cached_release() {
            debug!("Using cached release {}", release.version);
            return Some(release);
        }

        match self.fetch_release().await {
            Ok(release) => {
                self.store_release(&release);
                Some(release)
            }
            Err(e) => {
                warn!("Update check for {} failed: {}", self.config.slug, e);
                None
            }
        }
    }

    /// Adds an offer for this plugin when a newer release exists. A
    /// transient with nothing checked yet is returned as is.
    pub async fn check_update(&self, mut transient: UpdateTransient) -> UpdateTransient {
        if transient.checked.is_empty() {
            return transient;
        }

        let Some(remote) = self.remote().await else {
            return transient;
        };

        if is_newer(&self.config.installed_version, &remote.version) {
            info!(
                "Update available for {}: {} -> {}",
                self.config.slug, self.config.installed_version, remote.version
            );
            let offer = UpdateOffer {
                slug: self.config.slug.clone(),
                plugin: self.config.basename.clone(),
                new_version: remote.version,
                tested: remote.tested,
                package: remote.download_url,
            };
            transient.response.insert(self.config.basename.clone(), offer);
        }
        transient
    }

    /// Details for the plugin information dialog. `None` when the request
    /// is for another plugin or the release is unavailable.
    pub async fn plugin_info(&self, action: &str, slug: Option<&str>) -> Option<PluginInfo> {
        if slug != Some(self.config.slug.as_str()) {
            return None;
        }
        debug!("Answering {} for {}", action, self.config.slug);

        let remote = self.remote().await?;
        Some(PluginInfo {
            name: remote.name,
            slug: self.config.slug.clone(),
            version: remote.version,
            tested: remote.tested,
            requires: remote.requires,
            author: remote.author,
            requires_php: remote.requires_php,
            last_updated: remote.last_updated,
            sections: remote.sections,
            download_link: remote.download_url.clone(),
            trunk: remote.download_url,
        })
    }
}

// ================================================================================================
// VERSIONS AND TEXT
// ================================================================================================

/// Whether `remote` is a later version than `installed`.
pub fn is_newer(installed: &str, remote: &str) -> bool {
    version_compare(installed, remote) == Ordering::Less
}

/// Splits on `.`, `-`, `_` and `+`, and between digit and non-digit runs.
fn version_parts(version: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_digit: Option<bool> = None;

    for c in version.chars() {
        if matches!(c, '.' | '-' | '_' | '+') {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_digit = None;
            continue;
        }
        let digit = c.is_ascii_digit();
        if prev_digit.is_some_and(|p| p != digit) && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
        prev_digit = Some(digit);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Rank of a non-numeric part. `#` stands for any number.
fn special_rank(part: &str) -> i32 {
    const FORMS: [(&str, i32); 10] = [
        ("dev", 0),
        ("alpha", 1),
        ("a", 1),
        ("beta", 2),
        ("b", 2),
        ("RC", 3),
        ("rc", 3),
        ("#", 4),
        ("pl", 5),
        ("p", 5),
    ];
    FORMS
        .iter()
        .find(|(form, _)| part.starts_with(form))
        .map(|(_, rank)| *rank)
        .unwrap_or(-6)
}

fn is_number(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_parts(a: &str, b: &str) -> Ordering {
    match (is_number(a), is_number(b)) {
        (true, true) => compare_numbers(a, b),
        (true, false) => special_rank("#").cmp(&special_rank(b)),
        (false, true) => special_rank(a).cmp(&special_rank("#")),
        (false, false) => special_rank(a).cmp(&special_rank(b)),
    }
}

/// Dotted version ordering with pre-release ranking
/// `dev < alpha < beta < RC < number < pl`.
pub fn version_compare(a: &str, b: &str) -> Ordering {
    let left = version_parts(a);
    let right = version_parts(b);

    for i in 0..left.len().max(right.len()) {
        let ord = match (left.get(i), right.get(i)) {
            (Some(x), Some(y)) => compare_parts(x, y),
            (Some(x), None) if is_number(x) => Ordering::Greater,
            (Some(x), None) => compare_parts(x, "#"),
            (None, Some(y)) if is_number(y) => Ordering::Less,
            (None, Some(y)) => compare_parts("#", y),
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Inserts `<br />` before every line break.
pub fn nl2br(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' | '\n' => {
                out.push_str("<br />");
                out.push(c);
                // \r\n and \n\r are one break
                if let Some(&next) = chars.peek() {
                    if (next == '\n' || next == '\r') && next != c {
                        out.push(next);
                        chars.next();
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOptionStore;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn release_body() -> Value {
        json!({
            "name": "PriceTier 1.2.0",
            "tag_name": "v1.2.0",
            "published_at": "2024-05-01T10:00:00Z",
            "zipball_url": "https://api.github.com/repos/adeelwebify/pricetier/zipball/v1.2.0",
            "author": {"login": "adeelwebify"},
            "body": "Fixes\n- rounding",
            "assets": [
                {"name": "checksums.txt", "browser_download_url": "https://example.test/checksums.txt"},
                {"name": "pricetier.zip", "browser_download_url": "https://example.test/pricetier.zip"}
            ]
        })
    }

    /// Serves one canned HTTP response per accepted connection.
    async fn serve(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    fn config(api_base: String) -> UpdaterConfig {
        UpdaterConfig {
            api_base,
            timeout: Duration::from_secs(2),
            ..UpdaterConfig::default()
        }
    }

    fn checked() -> UpdateTransient {
        let mut transient = UpdateTransient::default();
        transient
            .checked
            .insert("pricetier/pricetier.php".to_string(), "1.0.0".to_string());
        transient
    }

    #[test]
    fn test_release_url_and_cache_key() {
        let config = UpdaterConfig::default();
        assert_eq!(
            config.release_url(),
            "https://api.github.com/repos/adeelwebify/pricetier/releases/latest"
        );
        assert_eq!(config.cache_key(), "pricetier_updater_pricetier_release_info");
        assert!(!config.cache_allowed);
    }

    #[test]
    fn test_release_from_github() {
        let release = RemoteRelease::from_github(&release_body()).unwrap();
        assert_eq!(release.version, "1.2.0");
        assert_eq!(release.download_url, "https://example.test/pricetier.zip");
        assert_eq!(release.author, "adeelwebify");
        assert_eq!(release.tested, "6.7");
        assert_eq!(release.requires_php, "7.4");
        assert_eq!(release.sections.changelog, "Fixes<br />\n- rounding");
    }

    #[test]
    fn test_release_without_assets_or_body() {
        let mut body = release_body();
        body["assets"] = json!([]);
        body["body"] = Value::Null;
        let release = RemoteRelease::from_github(&body).unwrap();
        assert!(release.download_url.ends_with("/zipball/v1.2.0"));
        assert_eq!(release.sections.changelog, "No changelog provided.");

        assert!(RemoteRelease::from_github(&json!({})).is_err());
        assert!(RemoteRelease::from_github(&json!("nope")).is_err());
    }

    #[test]
    fn test_version_compare() {
        assert_eq!(version_compare("1.0.0", "1.0.1"), Ordering::Less);
        assert_eq!(version_compare("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(version_compare("1.10", "1.9"), Ordering::Greater);
        assert_eq!(version_compare("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(version_compare("1.0.0-beta", "1.0.0"), Ordering::Less);
        assert_eq!(version_compare("1.0.0RC1", "1.0.0-beta2"), Ordering::Greater);
        assert_eq!(version_compare("1.0-dev", "1.0-alpha"), Ordering::Less);
        assert_eq!(version_compare("1.0pl1", "1.0"), Ordering::Greater);
        assert!(is_newer("1.0.0", "1.2.0"));
        assert!(!is_newer("1.2.0", "1.2.0"));
    }

    #[test]
    fn test_nl2br() {
        assert_eq!(nl2br("a\nb"), "a<br />\nb");
        assert_eq!(nl2br("a\r\nb"), "a<br />\r\nb");
        assert_eq!(nl2br("a\n\nb"), "a<br />\n<br />\nb");
        assert_eq!(nl2br("plain"), "plain");
    }

    #[tokio::test]
    async fn test_unreachable_api_gives_no_release() {
        let updater = Updater::new(config("http://127.0.0.1:1".to_string())).unwrap();
        assert!(updater.remote().await.is_none());

        let transient = updater.check_update(checked()).await;
        assert!(transient.response.is_empty());
        assert!(updater.plugin_info("plugin_information", Some("pricetier")).await.is_none());
    }

    #[tokio::test]
    async fn test_check_update_offers_newer_release() {
        let base = serve("200 OK", release_body().to_string()).await;
        let updater = Updater::new(config(base)).unwrap();

        let transient = updater.check_update(checked()).await;
        let offer = &transient.response["pricetier/pricetier.php"];
        assert_eq!(offer.new_version, "1.2.0");
        assert_eq!(offer.slug, "pricetier");
        assert_eq!(offer.package, "https://example.test/pricetier.zip");

        let untouched = updater.check_update(UpdateTransient::default()).await;
        assert!(untouched.response.is_empty());
    }

    #[tokio::test]
    async fn test_check_update_skips_same_version() {
        let mut body = release_body();
        body["tag_name"] = json!("v1.0.0");
        let base = serve("200 OK", body.to_string()).await;
        let updater = Updater::new(config(base)).unwrap();
        assert!(updater.check_update(checked()).await.response.is_empty());
    }

    #[tokio::test]
    async fn test_non_ok_status_gives_no_release() {
        let base = serve("404 Not Found", "{\"message\":\"Not Found\"}".to_string()).await;
        let updater = Updater::new(config(base)).unwrap();
        assert!(matches!(
            updater.fetch_release().await,
            Err(UpdateError::Status(StatusCode::NOT_FOUND))
        ));
        assert!(updater.remote().await.is_none());
    }

    #[tokio::test]
    async fn test_plugin_info() {
        let base = serve("200 OK", release_body().to_string()).await;
        let updater = Updater::new(config(base)).unwrap();

        assert!(updater.plugin_info("plugin_information", Some("other")).await.is_none());
        assert!(updater.plugin_info("plugin_information", None).await.is_none());

        let info = updater.plugin_info("plugin_information", Some("pricetier")).await.unwrap();
        assert_eq!(info.name, "PriceTier 1.2.0");
        assert_eq!(info.version, "1.2.0");
        assert_eq!(info.requires, "6.0");
        assert_eq!(info.download_link, info.trunk);
    }

    #[tokio::test]
    async fn test_cache_is_used_when_allowed() {
        let store: Arc<dyn OptionStore> = Arc::new(MemoryOptionStore::new());
        let base = serve("200 OK", release_body().to_string()).await;
        let warm = Updater::new(config(base)).unwrap().with_cache(store.clone());
        assert!(warm.remote().await.is_some());

        let offline = UpdaterConfig {
            cache_allowed: true,
            ..config("http://127.0.0.1:1".to_string())
        };
        let cached = Updater::new(offline).unwrap().with_cache(store);
        assert_eq!(cached.remote().await.map(|r| r.version), Some("1.2.0".to_string()));
    }
}
