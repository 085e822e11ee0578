use std::time::Duration;

use futures::future::BoxFuture;
use log::*;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use storefront_engine::{
    events::{EventHandlers, EventHooks},
    helpers::build_http_client,
};

use crate::errors::ServerError;

/// Forwards order events to an external notification service (email, chat, fulfilment...).
///
/// Every event is logged. If a notification URL is configured, the event is also POSTed there as
/// `{"event": <kind>, "data": <event>}`. Delivery failures are logged and otherwise ignored: a notification that
/// cannot be sent never affects the order it is about.
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, ServerError> {
        let client = build_http_client(timeout).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { client, url })
    }

    pub fn send<T: Serialize>(&self, kind: &'static str, event: &T) -> BoxFuture<'static, ()> {
        let Some(url) = self.url.clone() else {
            return no_op();
        };
        let body = match serde_json::to_value(event) {
            Ok(data) => json!({ "event": kind, "data": data }),
            Err(e) => {
                error!("📬️ Could not serialize the {kind} event. It will not be sent. {e}");
                return no_op();
            },
        };
        let client = self.client.clone();
        Box::pin(async move { deliver(client, url, kind, body).await })
    }
}

async fn deliver(client: Client, url: String, kind: &'static str, body: Value) {
    match client.post(&url).json(&body).send().await {
        Ok(res) if res.status().is_success() => debug!("📬️ {kind} notification delivered to {url}"),
        Ok(res) => warn!("📬️ {kind} notification was refused by {url} with status {}", res.status()),
        Err(e) => warn!("📬️ Could not deliver the {kind} notification to {url}. {e}"),
    }
}

/// Builds the event handlers for the server. Call `producers()` on the result to wire them into the APIs, then
/// `start_handlers()` to start listening.
pub fn create_notification_handlers(notifier: Notifier, buffer_size: usize) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let n = notifier.clone();
    hooks.on_order_placed(move |ev| {
        info!(
            "📬️ Order {} placed by {} for {} ({})",
            ev.order.order_number, ev.order.customer_id, ev.order.total_amount, ev.order.payment_method.kind
        );
        n.send("order_placed", &ev)
    });
    let n = notifier.clone();
    hooks.on_order_paid(move |ev| {
        info!("📬️ Order {} has been paid", ev.order.order_number);
        n.send("order_paid", &ev)
    });
    let n = notifier.clone();
    hooks.on_order_annulled(move |ev| {
        info!("📬️ Order {} was cancelled. {}", ev.order.order_number, ev.reason);
        n.send("order_annulled", &ev)
    });
    let n = notifier.clone();
    hooks.on_order_refunded(move |ev| {
        info!(
            "📬️ {} refunded on order {} ({}). Provider status: {}",
            ev.refund.amount, ev.order.order_number, ev.refund.reason, ev.refund.provider_status
        );
        n.send("order_refunded", &ev)
    });
    hooks.on_return_submitted(move |ev| {
        info!(
            "📬️ Return {} opened on order {} for {}",
            ev.return_request.formatted_request_number, ev.order.order_number, ev.return_request.total_refund_amount
        );
        notifier.send("return_submitted", &ev)
    });
    EventHandlers::new(buffer_size, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
