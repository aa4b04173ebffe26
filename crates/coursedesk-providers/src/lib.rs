//! coursedesk-providers — Data provider backends.
//!
//! Implements the `DataProvider` trait over an HTTP-RPC endpoint and over an
//! in-memory store with optional file persistence, plus the configuration
//! that selects between them.

pub mod config;
pub mod memory;
pub mod rpc;

pub use config::{
    create_provider, load_config, load_config_from, AuthConfig, BackendConfig, CoursedeskConfig,
    PolicyConfig,
};
pub use memory::MemoryProvider;
pub use rpc::RpcProvider;
