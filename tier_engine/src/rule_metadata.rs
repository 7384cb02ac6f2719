// Identity types shared by rules, products and shoppers.
//
// These newtypes keep product ids, term ids and user ids from being mixed
// up in the matching code, even though all three are plain integers in the
// stored rule blob.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Taxonomy holding product categories.
pub const CATEGORY_TAXONOMY: &str = "product_cat";

/// Taxonomy holding product tags.
pub const TAG_TAXONOMY: &str = "product_tag";

/// Identifier of a pricing rule.
///
/// Rules saved through the admin form receive a UUID v4; rules written by
/// other means may carry any string, including the empty one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    /// Creates a RuleId from any string.
    pub fn new(id: impl Into<String>) -> Self {
        RuleId(id.into())
    }

    /// Creates a fresh random id.
    pub fn generate() -> Self {
        RuleId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no id has been assigned yet.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        RuleId(s.to_string())
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        RuleId(s)
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storefront product id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

/// Taxonomy term id (category, tag or attribute value).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub i64);

/// Site user id. Zero is the anonymous visitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

display_inner!(ProductId, TermId, UserId);
