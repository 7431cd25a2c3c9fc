pub mod buffer;
pub mod client;

pub use buffer::{ClientBuffer, PeIdentity};
pub use client::{FamClient, FamClientConfig};
