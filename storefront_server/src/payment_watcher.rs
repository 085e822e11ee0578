use std::time::Duration;

use log::*;
use storefront_engine::{db_types::Order, PaymentFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the payment watcher. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// On every tick the watcher asks the chain gateways about every order still waiting for a crypto payment, then
/// cancels (and restocks) the orders whose payment window has closed.
pub fn start_payment_watcher(api: PaymentFlowApi<SqliteDatabase>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Payment watcher started. Checking pending payments every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            run_payment_sweep(&api).await;
        }
    })
}

pub async fn run_payment_sweep(api: &PaymentFlowApi<SqliteDatabase>) {
    trace!("🕰️ Polling pending crypto payments");
    match api.poll_pending_payments().await {
        Ok(summary) if summary.checked > 0 => info!(
            "🕰️ Checked {} pending payments. {} confirmed, {} expired, {} errors",
            summary.checked, summary.confirmed, summary.expired, summary.errors
        ),
        Ok(_) => trace!("🕰️ No payments are pending"),
        Err(e) => error!("🕰️ Error polling pending payments: {e}"),
    }
    match api.expire_overdue_payments().await {
        Ok(orders) if orders.is_empty() => trace!("🕰️ No overdue payments"),
        Ok(orders) => info!("🕰️ {} overdue orders cancelled: {}", orders.len(), order_list(&orders)),
        Err(e) => error!("🕰️ Error expiring overdue payments: {e}"),
    }
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] {} customer: {}", o.id, o.order_number, o.customer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
