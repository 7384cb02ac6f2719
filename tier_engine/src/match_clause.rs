// Matching side of a pricing rule: who the rule applies to (user
// condition) and which products it covers (product condition).
//
// Evaluation order is fixed: the user condition is checked first and the
// product condition only runs when the user matched.

use crate::rule_metadata::{ProductId, TermId, UserId, CATEGORY_TAXONOMY, TAG_TAXONOMY};
use serde::{Deserialize, Serialize};

// ============================================================================
// HOST VIEWS
// ============================================================================

/// Read access to the product being priced.
///
/// Implemented by the storefront integration; the engine never loads
/// products itself.
pub trait ProductView {
    /// The product id.
    fn product_id(&self) -> ProductId;

    /// Term ids the product carries in `taxonomy`, or `None` when the
    /// taxonomy does not exist.
    fn term_ids(&self, taxonomy: &str) -> Option<Vec<TermId>>;

    /// Raw meta value stored under `key`.
    fn meta_value(&self, key: &str) -> Option<String>;

    /// The product's own sale price field, unfiltered.
    fn sale_price(&self) -> Option<String>;
}

/// The user a price is being computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shopper {
    pub id: UserId,
    pub roles: Vec<String>,
}

impl Shopper {
    pub fn new(id: UserId, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Shopper {
            id,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Anonymous visitors carry id 0.
    pub fn exists(&self) -> bool {
        self.id.0 > 0
    }
}

/// Term membership with host semantics: an unknown taxonomy or a product
/// without terms never matches, an empty wanted list matches any product
/// that has at least one term.
pub fn has_term<P: ProductView + ?Sized>(product: &P, taxonomy: &str, wanted: &[TermId]) -> bool {
    let owned = match product.term_ids(taxonomy) {
        Some(terms) => terms,
        None => return false,
    };
    if owned.is_empty() {
        return false;
    }
    if wanted.is_empty() {
        return true;
    }
    wanted.iter().any(|t| owned.contains(t))
}

// ============================================================================
// CONDITION TYPES
// ============================================================================

/// Which products a rule covers.
///
/// Unrecognised keys are preserved so a rule survives a save round trip
/// untouched, but they never match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductScope {
    All,
    Products,
    Categories,
    Tags,
    Attribute,
    Unrecognized(String),
}

impl ProductScope {
    pub fn from_key(key: &str) -> Self {
        match key {
            "all" => ProductScope::All,
            "products" => ProductScope::Products,
            "categories" => ProductScope::Categories,
            "tags" => ProductScope::Tags,
            "attribute" => ProductScope::Attribute,
            other => ProductScope::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProductScope::All => "all",
            ProductScope::Products => "products",
            ProductScope::Categories => "categories",
            ProductScope::Tags => "tags",
            ProductScope::Attribute => "attribute",
            ProductScope::Unrecognized(key) => key,
        }
    }
}

impl Default for ProductScope {
    fn default() -> Self {
        ProductScope::All
    }
}

impl From<String> for ProductScope {
    fn from(s: String) -> Self {
        ProductScope::from_key(&s)
    }
}

impl From<ProductScope> for String {
    fn from(scope: ProductScope) -> Self {
        scope.as_str().to_string()
    }
}

/// Which users a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserScope {
    All,
    Roles,
    Users,
    Unrecognized(String),
}

impl UserScope {
    pub fn from_key(key: &str) -> Self {
        match key {
            "all" => UserScope::All,
            "roles" => UserScope::Roles,
            "users" => UserScope::Users,
            other => UserScope::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UserScope::All => "all",
            UserScope::Roles => "roles",
            UserScope::Users => "users",
            UserScope::Unrecognized(key) => key,
        }
    }
}

impl Default for UserScope {
    fn default() -> Self {
        UserScope::All
    }
}

impl From<String> for UserScope {
    fn from(s: String) -> Self {
        UserScope::from_key(&s)
    }
}

impl From<UserScope> for String {
    fn from(scope: UserScope) -> Self {
        scope.as_str().to_string()
    }
}

// ============================================================================
// CONDITIONS
// ============================================================================

/// Attribute taxonomy plus the wanted terms inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub taxonomy: String,
    pub terms: Vec<TermId>,
}

/// Product side of a rule. Only the list selected by `scope` is consulted;
/// the others are kept so switching scope in the admin form loses nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCondition {
    #[serde(rename = "type")]
    pub scope: ProductScope,
    pub products: Vec<ProductId>,
    pub categories: Vec<TermId>,
    pub tags: Vec<TermId>,
    pub attribute: AttributeFilter,
}

impl ProductCondition {
    /// Condition covering every product.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_products(ids: impl IntoIterator<Item = ProductId>) -> Self {
        ProductCondition {
            scope: ProductScope::Products,
            products: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn for_categories(ids: impl IntoIterator<Item = TermId>) -> Self {
        ProductCondition {
            scope: ProductScope::Categories,
            categories: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn for_tags(ids: impl IntoIterator<Item = TermId>) -> Self {
        ProductCondition {
            scope: ProductScope::Tags,
            tags: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn for_attribute(taxonomy: impl Into<String>, terms: impl IntoIterator<Item = TermId>) -> Self {
        ProductCondition {
            scope: ProductScope::Attribute,
            attribute: AttributeFilter {
                taxonomy: taxonomy.into(),
                terms: terms.into_iter().collect(),
            },
            ..Self::default()
        }
    }

    /// Evaluates the condition against a product.
    pub fn matches<P: ProductView + ?Sized>(&self, product: &P) -> bool {
        match &self.scope {
            ProductScope::All => true,
            ProductScope::Products => self.products.contains(&product.product_id()),
            ProductScope::Categories => has_term(product, CATEGORY_TAXONOMY, &self.categories),
            ProductScope::Tags => has_term(product, TAG_TAXONOMY, &self.tags),
            ProductScope::Attribute => {
                if self.attribute.taxonomy.is_empty() {
                    return false;
                }
                has_term(product, &self.attribute.taxonomy, &self.attribute.terms)
            }
            ProductScope::Unrecognized(_) => false,
        }
    }

    /// The id list consulted by the current scope, if it is id-based.
    pub fn selected_len(&self) -> Option<usize> {
        match self.scope {
            ProductScope::Products => Some(self.products.len()),
            ProductScope::Categories => Some(self.categories.len()),
            ProductScope::Tags => Some(self.tags.len()),
            ProductScope::Attribute => Some(self.attribute.terms.len()),
            _ => None,
        }
    }
}

/// User side of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCondition {
    #[serde(rename = "type")]
    pub scope: UserScope,
    pub roles: Vec<String>,
    pub users: Vec<UserId>,
}

impl UserCondition {
    /// Condition covering every logged-in user.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_roles(roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        UserCondition {
            scope: UserScope::Roles,
            roles: roles.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn for_users(ids: impl IntoIterator<Item = UserId>) -> Self {
        UserCondition {
            scope: UserScope::Users,
            users: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Evaluates the condition. A missing or anonymous user never matches,
    /// whatever the scope.
    pub fn matches(&self, user: Option<&Shopper>) -> bool {
        let user = match user {
            Some(u) if u.exists() => u,
            _ => return false,
        };

        match &self.scope {
            UserScope::All => true,
            UserScope::Users => self.users.contains(&user.id),
            UserScope::Roles => user.roles.iter().any(|r| self.roles.contains(r)),
            UserScope::Unrecognized(_) => false,
        }
    }
}
