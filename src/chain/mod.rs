//! Chain module - static chain table and per-chain RPC connections

pub mod provider;
pub mod registry;

pub use provider::{ChainProvider, GasPrice};
pub use registry::{ChainEndpoint, ChainRegistry};
