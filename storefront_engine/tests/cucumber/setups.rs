use cucumber::given;
use shop_common::Money;
use storefront_engine::{db_types::CartItem, test_utils::test_store::TestStore, StorefrontDatabase};

use crate::cucumber::{world::customer, StorefrontWorld};

#[given("a fresh store")]
async fn fresh_store(world: &mut StorefrontWorld) {
    world.store = Some(TestStore::new().await);
}

#[given(expr = "the product '{word}' costs {int} pence with {int} in stock")]
async fn add_product(world: &mut StorefrontWorld, name: String, pence: i64, stock: i64) {
    let product = world.store().add_product(&name, Money::from_pence(pence), stock).await;
    world.products.insert(name, product);
}

#[given(expr = "'{word}' has {int} '{word}' in their cart")]
async fn add_to_cart(world: &mut StorefrontWorld, name: String, quantity: i64, product: String) {
    let customer = customer(&name);
    let product = world.product(&product).clone();
    let cart = world.store().db.fetch_cart(&customer.id).await.expect("Error fetching cart");
    let mut items = cart.map(|c| c.items).unwrap_or_default();
    items.retain(|i| i.product_id != product.id);
    items.push(CartItem::new(product.id, product.name.clone(), quantity));
    world.store().db.set_cart(&customer.id, &items).await.expect("Error filling cart");
}
