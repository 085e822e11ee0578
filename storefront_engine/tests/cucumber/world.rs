use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use storefront_engine::{
    db_types::{CustomerIdentity, Product, ReturnRequest},
    order_objects::PlacedOrder,
    test_utils::{
        fixtures::{alice, bob},
        test_store::TestStore,
    },
    StorefrontDatabase,
};

#[derive(Default, World)]
pub struct StorefrontWorld {
    pub store: Option<TestStore>,
    pub products: HashMap<String, Product>,
    pub last_order: Option<PlacedOrder>,
    pub last_return: Option<ReturnRequest>,
    pub last_error: Option<String>,
}

impl Debug for StorefrontWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let db = self.store.as_ref().map(|s| s.db.url().to_string()).unwrap_or_default();
        write!(f, "StorefrontWorld(db: {db}, last order: {:?}, last error: {:?})", self.last_order, self.last_error)
    }
}

impl StorefrontWorld {
    pub fn store(&self) -> &TestStore {
        self.store.as_ref().expect("Store not initialised. Did you forget 'Given a fresh store'?")
    }

    pub fn product(&self, name: &str) -> &Product {
        self.products.get(name).unwrap_or_else(|| panic!("Product {name} has not been created"))
    }

    pub fn last_order_id(&self) -> i64 {
        self.last_order.as_ref().expect("No order has been placed").order_id
    }

    /// Stores the outcome of a request, remembering the error message if it failed.
    pub fn record<T, E: ToString>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e.to_string());
                None
            },
        }
    }
}

pub fn customer(name: &str) -> CustomerIdentity {
    match name {
        "alice" => alice(),
        "bob" => bob(),
        other => CustomerIdentity::new(format!("cust-{other}"), format!("{other}@example.com")),
    }
}
