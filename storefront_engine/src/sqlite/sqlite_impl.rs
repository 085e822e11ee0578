//! `SqliteDatabase` is a concrete implementation of a storefront engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements [`StorefrontDatabase`]. Writes that touch more than one
//! table (placing an order, cancelling it, opening a return) run inside a single transaction.
use std::fmt::Debug;

use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{carts, catalog, db_url, new_pool, orders, products, returns};
use crate::{
    db_types::{
        Cart,
        CartItem,
        NewProduct,
        NewShippingMethod,
        Order,
        PaymentMethodType,
        Product,
        Promotion,
        ReturnRequest,
        ShippingMethod,
    },
    traits::{Pagination, StorefrontDatabase, StorefrontError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({})", self.url)
    }
}

impl StorefrontDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_cart(&self, customer_id: &str) -> Result<Option<Cart>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let cart = carts::fetch_cart(customer_id, &mut conn).await?;
        Ok(cart)
    }

    async fn remove_cart_line(&self, customer_id: &str, product_id: i64) -> Result<(), StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        carts::remove_cart_line(customer_id, product_id, &mut conn).await?;
        Ok(())
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_shipping_method(&self, id: i64) -> Result<Option<ShippingMethod>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        catalog::fetch_shipping_method(id, &mut conn).await
    }

    async fn fetch_promotion(&self, code: &str) -> Result<Option<Promotion>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let promotion = catalog::fetch_promotion(code, &mut conn).await?;
        Ok(promotion)
    }

    /// Stock is reserved before anything else is written, so the transaction takes the write lock with its first
    /// statement.
    async fn place_order(&self, order: Order) -> Result<Order, StorefrontError> {
        let mut tx = self.pool.begin().await?;
        for item in &order.items {
            if !products::reserve_stock(item.product_id, item.quantity, &mut tx).await? {
                debug!("🗃️ Not enough {} in stock for {}", item.name, order.order_number);
                return Err(StorefrontError::InsufficientStock(item.name.clone()));
            }
        }
        let customer_id = order.customer_id.clone();
        let order = orders::insert_order(order, &mut tx).await?;
        carts::clear_cart(&customer_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_number, order.id);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, &mut conn).await
    }

    async fn fetch_order_by_payment_reference(
        &self,
        method: PaymentMethodType,
        reference: &str,
    ) -> Result<Option<Order>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_payment_reference(method, reference, &mut conn).await
    }

    async fn fetch_orders_for_customer(
        &self,
        customer_id: &str,
        pagination: Pagination,
    ) -> Result<(Vec<Order>, i64), StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_customer(customer_id, pagination, &mut conn).await
    }

    async fn fetch_orders_awaiting_payment(&self) -> Result<Vec<Order>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_awaiting_payment(&mut conn).await
    }

    async fn update_order(&self, order: Order) -> Result<Order, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order(order, &mut conn).await
    }

    async fn cancel_order(&self, order: Order) -> Result<Order, StorefrontError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_order(order, &mut tx).await?;
        for item in &order.items {
            products::restock(item.product_id, item.quantity, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {} cancelled and {} lines restocked", order.order_number, order.items.len());
        Ok(order)
    }

    async fn fetch_return_request(&self, id: i64) -> Result<Option<ReturnRequest>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        returns::fetch_return_request(id, &mut conn).await
    }

    async fn fetch_return_requests_for_order(&self, order_id: i64) -> Result<Vec<ReturnRequest>, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        returns::fetch_return_requests_for_order(order_id, &mut conn).await
    }

    async fn submit_return_request(
        &self,
        request: ReturnRequest,
        mut order: Order,
    ) -> Result<(ReturnRequest, Order), StorefrontError> {
        let mut tx = self.pool.begin().await?;
        let request = returns::insert_return_request(request, &mut tx).await?;
        order.link_return_request(request.id, request.submitted_at);
        let order = orders::update_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok((request, order))
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `SF_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    /// Connects to the database at `url`, creating the file if it does not exist.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection in the pool. Pending queries are allowed to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub async fn insert_product(&self, product: NewProduct) -> Result<Product, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::insert_product(product, &mut conn).await?;
        Ok(product)
    }

    pub async fn set_cart(&self, customer_id: &str, items: &[CartItem]) -> Result<(), StorefrontError> {
        let mut tx = self.pool.begin().await?;
        carts::set_cart(customer_id, items, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_shipping_method(&self, method: NewShippingMethod) -> Result<ShippingMethod, StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_shipping_method(method, &mut conn).await
    }

    pub async fn insert_promotion(&self, promotion: Promotion) -> Result<(), StorefrontError> {
        let mut conn = self.pool.acquire().await?;
        catalog::upsert_promotion(promotion, &mut conn).await?;
        Ok(())
    }
}
