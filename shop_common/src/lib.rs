mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, STORE_CURRENCY_CODE, STORE_CURRENCY_SYMBOL};
pub use secret::Secret;
