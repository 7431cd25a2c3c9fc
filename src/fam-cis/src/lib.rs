pub mod layout;
pub mod server;
pub mod service;

pub use server::CisHandler;
pub use service::{CisConfig, ClientInterfaceService};
