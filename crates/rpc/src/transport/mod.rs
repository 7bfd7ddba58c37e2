//! Transport layer for the RPC framework.
//!
//! One persistent connection per client. Requests are multiplexed over it
//! and matched to responses by correlation id.

pub mod client;
pub mod server;

pub use client::{ClientBuilder, ClientConfig, RpcClient};
pub use server::{RpcServer, ServerConfig};
