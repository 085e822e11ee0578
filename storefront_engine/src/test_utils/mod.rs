//! Helpers for the engine's own tests and for downstream crates that enable the `test_utils` feature.
pub mod fakes;
pub mod fixtures;
#[cfg(feature = "sqlite")]
pub mod prepare_env;
#[cfg(feature = "sqlite")]
pub mod test_store;
