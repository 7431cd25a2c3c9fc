pub mod client;
pub mod framing;
pub mod messages;
pub mod server;

pub use client::call;
pub use server::{serve, RequestHandler};
