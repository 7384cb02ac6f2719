// examples/pricing_usage.rs
//
// Walks through building a rule table from a stored blob and pricing a
// few products with it.
// Run with: cargo run --example pricing_usage

use std::collections::HashMap;

use serde_json::json;
use tier_engine::{
    GlobalSettings, PriceFacet, PricingEngine, ProductId, ProductView, RuleParser, RuleTable,
    RuleValidator, Shopper, TermId, UserId, CATEGORY_TAXONOMY,
};

struct DemoProduct {
    id: i64,
    categories: Vec<TermId>,
    meta: HashMap<String, String>,
    sale: Option<String>,
}

impl ProductView for DemoProduct {
    fn product_id(&self) -> ProductId {
        ProductId(self.id)
    }

    fn term_ids(&self, taxonomy: &str) -> Option<Vec<TermId>> {
        match taxonomy {
            CATEGORY_TAXONOMY => Some(self.categories.clone()),
            "product_tag" => Some(Vec::new()),
            _ => None,
        }
    }

    fn meta_value(&self, key: &str) -> Option<String> {
        self.meta.get(key).cloned()
    }

    fn sale_price(&self) -> Option<String> {
        self.sale.clone()
    }
}

fn product(id: i64, cost: &str, categories: &[i64], sale: Option<&str>) -> DemoProduct {
    DemoProduct {
        id,
        categories: categories.iter().map(|c| TermId(*c)).collect(),
        meta: HashMap::from([("_wc_cog_cost".to_string(), cost.to_string())]),
        sale: sale.map(str::to_string),
    }
}

fn main() {
    println!("=== PriceTier Engine Example ===\n");

    // ========================================================================
    // Example 1: Stored rules, as the settings page writes them
    // ========================================================================
    let stored = json!([
        {
            "id": "wholesale",
            "name": "Wholesale 15% over cost",
            "priority": "5",
            "users": { "type": "roles", "roles": ["wholesale_customer"] },
            "pricing": { "type": "percent", "value": "15", "rounding": "up" }
        },
        {
            "id": "shoes",
            "name": "Shoes at cost + 20",
            "priority": 10,
            "products": { "type": "categories", "categories": ["12"] },
            "pricing": { "type": "fixed", "value": 20, "min_price": "", "max_price": "150" }
        },
        {
            "id": "clearance",
            "name": "Clearance follows sale",
            "priority": 20,
            "pricing": { "apply_to": "sale", "value": 5 }
        },
        { "id": "draft", "name": "", "pricing": { "value": 99 } }
    ]);

    let rules = match RuleParser::from_value(stored.clone()) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("could not read rules: {}", e);
            return;
        }
    };
    let report = RuleValidator::new().validate(&rules);
    println!("Validation: valid={} errors={:?}", report.valid, report.errors);
    println!("Warnings: {:?}\n", report.warnings);

    // ========================================================================
    // Example 2: Table and engine for one request
    // ========================================================================
    let table = RuleTable::from_stored(Some(&stored));
    println!("Active rules: {:?}", table.list_rule_ids());
    println!("Stats: {:?}\n", table.get_table_stats());

    let settings = GlobalSettings::default();
    let engine = PricingEngine::new(&table, &settings);

    let wholesale = Shopper::new(UserId(2), ["wholesale_customer"]);
    let customer = Shopper::new(UserId(3), ["customer"]);

    // ========================================================================
    // Example 3: Pricing
    // ========================================================================
    let boots = product(1, "100", &[12], None);
    let scarf = product(2, "30", &[40], Some("25"));

    for (label, user) in [("wholesale", Some(&wholesale)), ("customer", Some(&customer)), ("guest", None)] {
        for (name, item, original) in [("boots", &boots, "180"), ("scarf", &scarf, "45")] {
            let regular = engine.price_for(PriceFacet::Regular, item, user).resolve(original);
            let outcome = engine.final_price(item, user);
            println!(
                "{:<9} {:<5} regular={:<6} final={:<6} via {:?}",
                label,
                name,
                regular,
                outcome.clone().resolve(original),
                outcome.rule_id().map(|id| id.to_string())
            );
        }
    }

    println!("\n=== Done ===");
}
