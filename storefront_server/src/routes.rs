//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use log::*;
use storefront_engine::{
    db_types::{CryptoAsset, PaymentMethodType},
    order_objects::{PlaceOrderRequest, UpdateStatusRequest},
    payment_objects::RefundRequest,
    return_objects::SubmitReturnRequest,
    traits::Pagination,
    ExchangeRateCache,
    OrderFlowApi,
    PaymentFlowApi,
    RefundApi,
    ReturnsApi,
    StorefrontDatabase,
    StorefrontError,
};

use crate::{
    auth::{JwtClaims, Role},
    config::ServerOptions,
    data_objects::{outcome_message, CancelOrderParams, JsonResponse, PageParams, WebhookAck},
    errors::{ErrorContext, ServerError},
    helpers::get_remote_ip,
};

pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Webhook-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires [$($roles:expr),*]) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),*]));
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),*]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(place_order => Post "/user/orders/place-order" impl StorefrontDatabase where requires [Role::Customer]);
/// Route handler for checkout
///
/// Turns the caller's cart into an order. The body is a [`PlaceOrderRequest`]. For card and PayPal payments,
/// `paymentMethod.token` must carry the payment intent or PayPal order id that the client completed with the provider.
/// For Bitcoin and Monero, the response contains the address and amount the customer must pay, which is confirmed
/// later by the chain gateway.
pub async fn place_order<B: StorefrontDatabase>(
    claims: JwtClaims,
    body: web::Json<PlaceOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer = claims.customer();
    debug!("💻️ POST place-order for {}", customer.id);
    let placed = api.place_order(&customer, body.into_inner()).await.context("placing the order")?;
    Ok(HttpResponse::Created().json(JsonResponse::data(placed).with_message("Order placed successfully")))
}

route!(my_orders => Get "/user/orders" impl StorefrontDatabase where requires [Role::Customer]);
/// The caller's orders, newest first. Use the `page` and `limit` query parameters to page through them.
pub async fn my_orders<B: StorefrontDatabase>(
    claims: JwtClaims,
    query: web::Query<PageParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for {}", claims.sub);
    let pagination = Pagination::new(query.page, query.limit);
    let page = api.orders_for_customer(&claims.customer(), pagination).await.context("fetching orders")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(page)))
}

route!(my_order => Get "/user/orders/{order_id}" impl StorefrontDatabase where requires [Role::Customer]);
pub async fn my_order<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id} for {}", claims.sub);
    let order = api.order_for_customer(&claims.customer(), order_id).await.context("fetching the order")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(order)))
}

route!(cancel_order => Post "/user/orders/{order_id}/cancel" impl StorefrontDatabase where requires [Role::Customer]);
/// Customers can cancel their own orders until they have shipped. The body may carry an optional `reason`.
pub async fn cancel_order<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: Option<web::Json<CancelOrderParams>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST cancel order {order_id} for {}", claims.sub);
    let reason = body.and_then(|b| b.into_inner().reason);
    let order = api.cancel_order(&claims.customer(), order_id, reason).await.context("cancelling the order")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(order).with_message("Order cancelled")))
}

//----------------------------------------------   Returns  ----------------------------------------------------
route!(submit_return => Post "/user/returns" impl StorefrontDatabase where requires [Role::Customer]);
pub async fn submit_return<B: StorefrontDatabase>(
    claims: JwtClaims,
    body: web::Json<SubmitReturnRequest>,
    api: web::Data<ReturnsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST return request for {}", claims.sub);
    let request = api.submit_return(&claims.customer(), body.into_inner()).await.context("submitting the return")?;
    Ok(HttpResponse::Created().json(JsonResponse::data(request).with_message("Return request submitted")))
}

route!(my_return => Get "/user/returns/{return_id}" impl StorefrontDatabase where requires [Role::Customer]);
pub async fn my_return<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<ReturnsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET return request {id} for {}", claims.sub);
    let request =
        api.return_request_for_customer(&claims.customer(), id).await.context("fetching the return request")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(request)))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(admin_order => Get "/admin/orders/{order_id}" impl StorefrontDatabase where requires [Role::Admin]);
pub async fn admin_order<B: StorefrontDatabase>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET admin order {order_id}");
    let order = api.fetch_order(order_id).await.context("fetching the order")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(order)))
}

route!(update_order_status => Put "/admin/orders/{order_id}/status" impl StorefrontDatabase where requires [Role::Admin]);
/// Moves an order along its lifecycle. Only the transitions the order state machine allows are accepted. The body can
/// also carry tracking details and a note for the status history.
pub async fn update_order_status<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<UpdateStatusRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ PUT status for order {order_id} by {}", claims.sub);
    let order =
        api.update_order_status(order_id, body.into_inner(), &claims.sub).await.context("updating the order status")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(order).with_message("Order status updated")))
}

route!(refund_order => Post "/admin/orders/{order_id}/refund" impl StorefrontDatabase where requires [Role::Admin]);
/// Refunds part or all of a paid order. Card and PayPal refunds go back through the provider. Crypto refunds are
/// recorded as `manual_refund_required` and must be sent by hand.
pub async fn refund_order<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<RefundRequest>,
    api: web::Data<RefundApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ POST refund for order {order_id} by {}", claims.sub);
    let result = api.issue_refund(order_id, body.into_inner(), &claims.sub).await.context("processing refund")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(result).with_message("Refund processed successfully")))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(crypto_webhook => Post "/payment/{method}/webhook" impl StorefrontDatabase);
/// Payment notifications from the chain gateways.
///
/// The raw body must be signed with the gateway's webhook secret (hex HMAC-SHA256 in the `X-Webhook-Signature`
/// header). Notifications with a missing or invalid signature are rejected before they are parsed. Replaying a
/// notification is harmless.
pub async fn crypto_webhook<B: StorefrontDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    body: Bytes,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let method = parse_payment_method(&path.into_inner())?;
    let options = req.app_data::<web::Data<ServerOptions>>().map(|o| ***o).unwrap_or_default();
    let remote = get_remote_ip(&req, options).map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".into());
    debug!("💻️ Received {method} payment notification from {remote}");
    let signature = req.headers().get(WEBHOOK_SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let result = api.process_webhook(method, &body, signature).await.context("processing the payment notification")?;
    info!(
        "💻️ {method} notification for order {}: {:?}",
        result.order.order_number, result.outcome
    );
    let ack = WebhookAck::new(&result.order, result.outcome);
    Ok(HttpResponse::Ok().json(JsonResponse::data(ack).with_message(outcome_message(result.outcome))))
}

route!(payment_status => Get "/payment/{method}/status/{order_id}" impl StorefrontDatabase where requires [Role::Customer]);
/// Lets the customer's browser poll a crypto payment while it waits for confirmations. The gateway is queried if the
/// payment is still pending.
pub async fn payment_status<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<(String, i64)>,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (method, order_id) = path.into_inner();
    let method = parse_payment_method(&method)?;
    debug!("💻️ GET {method} payment status for order {order_id} by {}", claims.sub);
    let report = api
        .refresh_payment_status(Some(&claims.customer()), method, order_id)
        .await
        .context("checking the payment status")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(report)))
}

/// The current fiat price of a crypto asset, from the shared rate cache.
#[get("/payment/rates/{asset}")]
pub async fn exchange_rate(
    path: web::Path<String>,
    rates: web::Data<ExchangeRateCache>,
) -> Result<HttpResponse, ServerError> {
    let asset = path.into_inner();
    let asset = CryptoAsset::from_str(&asset).map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    trace!("💻️ GET exchange rate for {asset}");
    let quote = rates.get_exchange_rate(asset).await.map_err(StorefrontError::from).context("fetching the exchange rate")?;
    Ok(HttpResponse::Ok().json(JsonResponse::data(quote)))
}

fn parse_payment_method(s: &str) -> Result<PaymentMethodType, ServerError> {
    PaymentMethodType::from_str(s).map_err(|e| ServerError::InvalidRequestPath(e.to_string()))
}
