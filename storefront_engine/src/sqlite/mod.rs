//! SQLite storage backend for the storefront engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
