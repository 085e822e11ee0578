use mockall::mock;
use storefront_engine::{
    db_types::{Cart, Order, PaymentMethodType, Product, Promotion, ReturnRequest, ShippingMethod},
    traits::Pagination,
    StorefrontDatabase,
    StorefrontError,
};

mock! {
    pub StorefrontDb {}
    impl StorefrontDatabase for StorefrontDb {
        fn url(&self) -> &str;
        async fn fetch_cart(&self, customer_id: &str) -> Result<Option<Cart>, StorefrontError>;
        async fn remove_cart_line(&self, customer_id: &str, product_id: i64) -> Result<(), StorefrontError>;
        async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StorefrontError>;
        async fn fetch_shipping_method(&self, id: i64) -> Result<Option<ShippingMethod>, StorefrontError>;
        async fn fetch_promotion(&self, code: &str) -> Result<Option<Promotion>, StorefrontError>;
        async fn place_order(&self, order: Order) -> Result<Order, StorefrontError>;
        async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StorefrontError>;
        async fn fetch_order_by_payment_reference(&self, method: PaymentMethodType, reference: &str) -> Result<Option<Order>, StorefrontError>;
        async fn fetch_orders_for_customer(&self, customer_id: &str, pagination: Pagination) -> Result<(Vec<Order>, i64), StorefrontError>;
        async fn fetch_orders_awaiting_payment(&self) -> Result<Vec<Order>, StorefrontError>;
        async fn update_order(&self, order: Order) -> Result<Order, StorefrontError>;
        async fn cancel_order(&self, order: Order) -> Result<Order, StorefrontError>;
        async fn fetch_return_request(&self, id: i64) -> Result<Option<ReturnRequest>, StorefrontError>;
        async fn fetch_return_requests_for_order(&self, order_id: i64) -> Result<Vec<ReturnRequest>, StorefrontError>;
        async fn submit_return_request(&self, request: ReturnRequest, order: Order) -> Result<(ReturnRequest, Order), StorefrontError>;
    }
}
