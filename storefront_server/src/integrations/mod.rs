//! Hooks that connect engine events to the outside world.
pub mod notifications;
