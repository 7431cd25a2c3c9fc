pub mod async_jobs;
pub mod atomics;
pub mod backup;
pub mod fabric;
pub mod heap;
pub mod resource;
pub mod server;
pub mod service;

pub use fabric::{FabricProvider, FabricTarget, LoopbackFabric};
pub use server::MsHandler;
pub use service::{MemoryService, MemoryServiceConfig};
