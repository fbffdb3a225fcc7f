pub mod billing;
pub mod config;
pub mod error;
pub mod portal;
pub mod reconcile;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{ReconcileError, Result};
