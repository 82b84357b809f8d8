pub mod adapters;
pub mod cdp;
pub mod daemon;
pub mod dap;
pub mod error;
pub mod formatters;
pub mod persistence;
pub mod race;
pub mod session;
pub mod timeouts;

pub use error::{Error, Result};
