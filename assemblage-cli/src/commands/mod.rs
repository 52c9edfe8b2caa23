//! CLI command implementations.

pub mod check;
pub mod serve;

pub use check::{check_config, CheckOptions};
pub use serve::{serve, ServeOptions};
