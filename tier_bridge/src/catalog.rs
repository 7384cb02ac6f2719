//! In-memory catalog and user directory, used by tests, benches and demos
//! in place of the storefront's own product and user tables.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tier_engine::ProductId;

use crate::types::{Catalog, CatalogError, CatalogProduct, SiteUser, Term, UserDirectory};

/// Products and taxonomies held in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    /// Keyed by id so "first published" is the lowest id.
    products: RwLock<BTreeMap<ProductId, CatalogProduct>>,
    taxonomies: RwLock<HashMap<String, Vec<Term>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        let catalog = Self::default();
        catalog.register_taxonomy("product_cat", Vec::new());
        catalog.register_taxonomy("product_tag", Vec::new());
        catalog
    }

    pub fn insert_product(&self, product: CatalogProduct) {
        self.products.write().insert(product.id, product);
    }

    pub fn register_taxonomy(&self, taxonomy: &str, terms: Vec<Term>) {
        self.taxonomies.write().insert(taxonomy.to_string(), terms);
    }

    pub fn product_count(&self) -> usize {
        self.products.read().len()
    }
}

impl Catalog for MemoryCatalog {
    fn get_product(&self, id: ProductId) -> Option<CatalogProduct> {
        self.products.read().get(&id).cloned()
    }

    fn first_published_product(&self) -> Option<CatalogProduct> {
        self.products.read().values().find(|p| p.published).cloned()
    }

    fn taxonomy_terms(&self, taxonomy: &str) -> Result<Vec<Term>, CatalogError> {
        self.taxonomies
            .read()
            .get(taxonomy)
            .cloned()
            .ok_or_else(|| CatalogError::InvalidTaxonomy(taxonomy.to_string()))
    }
}

/// Site users held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<Vec<SiteUser>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: SiteUser) {
        self.users.write().push(user);
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn search(&self, needle: &str, limit: usize) -> Vec<SiteUser> {
        let needle = needle.to_lowercase();
        self.users
            .read()
            .iter()
            .filter(|u| {
                needle.is_empty()
                    || u.login.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
                    || u.display_name.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_published_skips_drafts() {
        let catalog = MemoryCatalog::new();
        catalog.insert_product(CatalogProduct::new(1, "Draft").unpublished());
        catalog.insert_product(CatalogProduct::new(2, "Live"));
        assert_eq!(catalog.first_published_product().map(|p| p.id), Some(ProductId(2)));
    }

    #[test]
    fn test_unknown_taxonomy_is_an_error() {
        let catalog = MemoryCatalog::new();
        assert_eq!(catalog.taxonomy_terms("product_cat"), Ok(Vec::new()));
        assert_eq!(
            catalog.taxonomy_terms("pa_color"),
            Err(CatalogError::InvalidTaxonomy("pa_color".to_string()))
        );
    }

    #[test]
    fn test_user_search_and_limit() {
        let users = MemoryUserDirectory::new();
        for i in 1..=30 {
            users.insert(SiteUser::new(i, format!("buyer{}", i)));
        }
        users.insert(SiteUser::new(99, "zed").with_email("ZED@shop.test"));

        assert_eq!(users.search("buyer", 20).len(), 20);
        assert_eq!(users.search("shop.test", 20).len(), 1);
        assert_eq!(users.search("Zed", 20)[0].id.0, 99);
    }
}
