mod clock;
mod http;
mod numbers;
mod signature;

pub use clock::{Clock, ManualClock, SystemClock};
pub use http::{build_http_client, path_segment, send_json, HttpCallError};
pub use numbers::{new_order_number, new_refund_id, return_number_base};
pub use signature::{sign_payload, verify_hmac_signature};
