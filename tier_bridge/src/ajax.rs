//! AJAX endpoints behind the settings page: attribute terms, user search
//! and the cost lookup panel.
//!
//! Every endpoint checks the admin token first. A failed check answers 403
//! with the body `-1`; everything else is a `{success, data}` envelope.

use log::debug;
use serde::Serialize;
use serde_json::{json, Value};

use tier_engine::coerce::{parse_numeric, sanitize_text_str, to_int};
use tier_engine::{GlobalSettings, ProductId};

use crate::bridge::{HostEnvironment, PluginConfig};
use crate::form::unslash;
use crate::nonce::{Nonces, ADMIN_ACTION};
use crate::price_filters::RequestScope;
use crate::store::SETTINGS_OPTION;
use crate::types::{Catalog, MoneyFormat, OptionStore, SiteUser, Term, UserDirectory};

/// Maximum users returned by one search.
pub const USER_SEARCH_LIMIT: usize = 20;
/// Shown in the lookup panel for a missing or non-numeric value.
pub const MISSING_VALUE: &str = "—";

/// HTTP status and JSON body of an endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub struct AjaxResponse {
    pub status: u16,
    pub body: Value,
}

impl AjaxResponse {
    pub fn success(data: Value) -> Self {
        AjaxResponse {
            status: 200,
            body: json!({ "success": true, "data": data }),
        }
    }

    /// Error envelope; `None` leaves `data` out.
    pub fn error(data: Option<Value>) -> Self {
        let body = match data {
            Some(data) => json!({ "success": false, "data": data }),
            None => json!({ "success": false }),
        };
        AjaxResponse { status: 200, body }
    }

    pub fn forbidden() -> Self {
        AjaxResponse {
            status: 403,
            body: json!(-1),
        }
    }

    pub fn is_success(&self) -> bool {
        self.body.get("success").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// One select option as the page script expects it.
#[derive(Debug, Clone, Serialize)]
struct SelectOption {
    id: i64,
    text: String,
}

impl From<&Term> for SelectOption {
    fn from(term: &Term) -> Self {
        SelectOption {
            id: term.id.0,
            text: term.name.clone(),
        }
    }
}

/// A call to one of the endpoints: the acting user, the token and the
/// request parameters.
#[derive(Debug, Clone)]
pub struct AjaxCall {
    pub user: SiteUser,
    pub nonce: String,
    pub params: Value,
}

impl AjaxCall {
    pub fn new(user: SiteUser, nonce: impl Into<String>, params: Value) -> Self {
        AjaxCall {
            user,
            nonce: nonce.into(),
            params,
        }
    }

    fn param(&self, name: &str) -> Value {
        self.params.get(name).cloned().map(unslash).unwrap_or(Value::Null)
    }

    fn text_param(&self, name: &str) -> String {
        match self.param(name) {
            Value::String(s) => sanitize_text_str(&s),
            Value::Null => String::new(),
            other => sanitize_text_str(&other.to_string()),
        }
    }
}

pub struct AjaxEndpoints<'a> {
    config: &'a PluginConfig,
    env: &'a HostEnvironment,
    nonces: &'a Nonces,
}

impl<'a> AjaxEndpoints<'a> {
    pub fn new(config: &'a PluginConfig, env: &'a HostEnvironment, nonces: &'a Nonces) -> Self {
        AjaxEndpoints { config, env, nonces }
    }

    fn referer_ok(&self, call: &AjaxCall) -> bool {
        let ok = self.nonces.verify(&call.nonce, ADMIN_ACTION, call.user.id).is_some();
        if !ok {
            debug!("AJAX token check failed for user {}", call.user.id);
        }
        ok
    }

    /// Terms of an attribute taxonomy as `[{id, text}]`.
    pub fn get_attribute_terms(&self, call: &AjaxCall) -> AjaxResponse {
        if !self.referer_ok(call) {
            return AjaxResponse::forbidden();
        }
        let taxonomy = call.text_param("taxonomy");
        match self.env.catalog.taxonomy_terms(&taxonomy) {
            Ok(terms) => {
                let options: Vec<SelectOption> = terms.iter().map(SelectOption::from).collect();
                AjaxResponse::success(json!(options))
            }
            Err(e) => {
                debug!("Term lookup failed: {}", e);
                AjaxResponse::error(None)
            }
        }
    }

    /// Users matching `search`, as `[{id, text: "Name (email)"}]`.
    pub fn search_users(&self, call: &AjaxCall) -> AjaxResponse {
        if !self.referer_ok(call) {
            return AjaxResponse::forbidden();
        }
        let needle = call.text_param("search");
        let options: Vec<SelectOption> = self
            .env
            .users
            .search(&needle, USER_SEARCH_LIMIT)
            .into_iter()
            .map(|u| SelectOption {
                id: u.id.0,
                text: format!("{} ({})", u.display_name, u.email),
            })
            .collect();
        AjaxResponse::success(json!(options))
    }

    /// Cost and prices of one product for the lookup panel. Prices pass
    /// through the price filters for the acting user.
    pub fn lookup_product(&self, call: &AjaxCall) -> AjaxResponse {
        if !self.referer_ok(call) {
            return AjaxResponse::forbidden();
        }
        if !call.user.can(&self.config.capability) {
            return AjaxResponse::error(None);
        }

        let id = ProductId(to_int(&call.param("product_id")));
        let product = match self.env.catalog.get_product(id) {
            Some(product) => product,
            None => return AjaxResponse::error(Some(json!({ "message": "Product not found" }))),
        };

        let settings = GlobalSettings::from_stored(self.env.options.get_option(SETTINGS_OPTION).as_ref());
        let cost_key = settings.cost_meta_key();
        let cost = if cost_key.is_empty() {
            None
        } else {
            product.meta_or_price(&cost_key).and_then(|raw| parse_numeric(&raw))
        };

        let scope = RequestScope::new(self.env.options.clone(), call.user.clone());
        let regular = scope.filter_regular_price(&product.regular_price, &product);
        let sale = scope.filter_sale_price(&product.sale_price, &product);

        AjaxResponse::success(json!({
            "cost_key": cost_key,
            "cost": self.money_or_missing(cost),
            "regular": self.money_or_missing(price_amount(&regular)),
            "sale": self.money_or_missing(price_amount(&sale)),
        }))
    }

    fn money_or_missing(&self, amount: Option<f64>) -> String {
        match amount {
            Some(amount) => self.env.money.format_money(amount),
            None => MISSING_VALUE.to_string(),
        }
    }
}

/// A price string counts as set when it is non-empty and not zero.
fn price_amount(raw: &str) -> Option<f64> {
    if raw.is_empty() || raw == "0" {
        return None;
    }
    Some(parse_numeric(raw).unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MemoryUserDirectory};
    use crate::nonce::{NonceConfig, SAVE_ACTION};
    use crate::store::{MemoryOptionStore, RULES_OPTION};
    use crate::types::CatalogProduct;
    use std::sync::Arc;

    struct Fixture {
        config: PluginConfig,
        env: HostEnvironment,
        nonces: Nonces,
        catalog: Arc<MemoryCatalog>,
        users: Arc<MemoryUserDirectory>,
    }

    impl Fixture {
        fn new(store: MemoryOptionStore) -> Self {
            let catalog = Arc::new(MemoryCatalog::new());
            let users = Arc::new(MemoryUserDirectory::new());
            let env = HostEnvironment::new(Arc::new(store), catalog.clone(), users.clone());
            Fixture {
                config: PluginConfig::default(),
                env,
                nonces: Nonces::with_secret([9u8; 32], NonceConfig::default()),
                catalog,
                users,
            }
        }

        fn endpoints(&self) -> AjaxEndpoints<'_> {
            AjaxEndpoints::new(&self.config, &self.env, &self.nonces)
        }

        fn call(&self, user: SiteUser, params: Value) -> AjaxCall {
            let nonce = self.nonces.create(ADMIN_ACTION, user.id);
            AjaxCall::new(user, nonce, params)
        }
    }

    fn manager() -> SiteUser {
        SiteUser::new(1, "manager").with_capabilities(&["manage_woocommerce"])
    }

    #[test]
    fn test_bad_token_is_forbidden() {
        let fx = Fixture::new(MemoryOptionStore::new());
        let wrong_action = fx.nonces.create(SAVE_ACTION, manager().id);
        let call = AjaxCall::new(manager(), wrong_action, json!({"taxonomy": "product_cat"}));

        for response in [
            fx.endpoints().get_attribute_terms(&call),
            fx.endpoints().search_users(&call),
            fx.endpoints().lookup_product(&call),
        ] {
            assert_eq!(response.status, 403);
            assert_eq!(response.body, json!(-1));
        }
    }

    #[test]
    fn test_attribute_terms() {
        let fx = Fixture::new(MemoryOptionStore::new());
        fx.catalog
            .register_taxonomy("pa_color", vec![Term::new(4, "Red"), Term::new(5, "Blue")]);

        let response = fx.endpoints().get_attribute_terms(&fx.call(manager(), json!({"taxonomy": "pa_color"})));
        assert_eq!(
            response.body,
            json!({"success": true, "data": [{"id": 4, "text": "Red"}, {"id": 5, "text": "Blue"}]})
        );

        let response = fx.endpoints().get_attribute_terms(&fx.call(manager(), json!({"taxonomy": "pa_size"})));
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"success": false}));
    }

    #[test]
    fn test_search_users() {
        let fx = Fixture::new(MemoryOptionStore::new());
        for i in 1..=25 {
            fx.users.insert(SiteUser::new(i, format!("buyer{}", i)));
        }
        fx.users
            .insert(SiteUser::new(40, "jdoe").with_display_name("Jane Doe").with_email("jane@shop.test"));

        let response = fx.endpoints().search_users(&fx.call(manager(), json!({"search": "buyer"})));
        assert!(response.is_success());
        assert_eq!(response.body["data"].as_array().unwrap().len(), USER_SEARCH_LIMIT);

        let response = fx.endpoints().search_users(&fx.call(manager(), json!({"search": " <b>jane</b> "})));
        assert_eq!(response.body["data"], json!([{"id": 40, "text": "Jane Doe (jane@shop.test)"}]));
    }

    #[test]
    fn test_lookup_requires_capability() {
        let fx = Fixture::new(MemoryOptionStore::new());
        let clerk = SiteUser::new(2, "clerk");
        let response = fx.endpoints().lookup_product(&fx.call(clerk, json!({"product_id": "7"})));
        assert_eq!(response.body, json!({"success": false}));
    }

    #[test]
    fn test_lookup_unknown_product() {
        let fx = Fixture::new(MemoryOptionStore::new());
        let response = fx.endpoints().lookup_product(&fx.call(manager(), json!({"product_id": "99"})));
        assert_eq!(
            response.body,
            json!({"success": false, "data": {"message": "Product not found"}})
        );
    }

    #[test]
    fn test_lookup_product() {
        let fx = Fixture::new(MemoryOptionStore::with_options([(
            RULES_OPTION,
            json!([{"id": "r", "name": "Margin", "pricing": {"value": 50, "apply_to": "regular"}}]),
        )]));
        fx.catalog.insert_product(
            CatalogProduct::new(7, "Mug")
                .with_prices("12", "")
                .with_meta("_wc_cog_cost", "10"),
        );

        let response = fx.endpoints().lookup_product(&fx.call(manager(), json!({"product_id": "7"})));
        assert_eq!(
            response.body,
            json!({"success": true, "data": {
                "cost_key": "_wc_cog_cost",
                "cost": "$10.00",
                "regular": "$15.00",
                "sale": "—"
            }})
        );
    }
}
