pub mod config;
pub mod constants;
pub mod error;
pub mod keys;
pub mod model;
pub mod permission;

pub use error::{ErrorCode, FamError, FamResult};
