use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

/// `ORD-YYYYMMDD-XXXXXX`, with a random upper-case alphanumeric suffix.
pub fn new_order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", now.format("%Y%m%d"), random_suffix(6))
}

pub fn new_refund_id(now: DateTime<Utc>) -> String {
    format!("RF-{}-{}", now.format("%Y%m%d%H%M%S"), random_suffix(4))
}

/// The first return-request number of the day: `YYYYMMDD * 10000`.
pub fn return_number_base(now: DateTime<Utc>) -> i64 {
    let date = now.format("%Y%m%d").to_string();
    date.parse::<i64>().unwrap_or_default() * 10_000
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(|c| (c as char).to_ascii_uppercase()).collect()
}
