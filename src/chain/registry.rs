//! Static chain id -> endpoint table

use crate::config::{Settings, TxEncoding};
use crate::error::{RelayerError, RelayerResult};

use ethers::types::Address;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

/// RPC endpoint and permit contract for one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub permit_address: Address,
    pub tx_encoding: TxEncoding,
}

impl ChainEndpoint {
    /// Transaction type override the executor applies on this chain.
    /// `None` leaves the submitter on its default envelope.
    pub fn tx_type_override(&self) -> Option<TxEncoding> {
        match self.tx_encoding {
            TxEncoding::Legacy => Some(TxEncoding::Legacy),
            TxEncoding::Eip1559 => None,
        }
    }
}

/// Immutable after start-up; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    endpoints: HashMap<u64, ChainEndpoint>,
}

impl ChainRegistry {
    pub fn new(endpoints: impl IntoIterator<Item = ChainEndpoint>) -> RelayerResult<Self> {
        let mut map = HashMap::new();
        for endpoint in endpoints {
            let chain_id = endpoint.chain_id;
            if map.insert(chain_id, endpoint).is_some() {
                return Err(RelayerError::Config(format!(
                    "Chain {} is configured more than once",
                    chain_id
                )));
            }
        }
        Ok(Self { endpoints: map })
    }

    /// Build the registry from every enabled chain in the settings
    pub fn from_settings(settings: &Settings) -> RelayerResult<Self> {
        let mut endpoints = Vec::new();
        for (key, chain) in settings.enabled_chains() {
            let permit_address = Address::from_str(chain.permit_address.trim()).map_err(|e| {
                RelayerError::Config(format!(
                    "Chain {} has an invalid permit address {:?}: {}",
                    key, chain.permit_address, e
                ))
            })?;

            info!(
                "Registered chain {} (ID: {}, permit contract {:?}, {:?} transactions)",
                chain.name, chain.chain_id, permit_address, chain.tx_type
            );

            endpoints.push(ChainEndpoint {
                chain_id: chain.chain_id,
                name: chain.name.clone(),
                rpc_url: chain.rpc_url.trim().to_string(),
                permit_address,
                tx_encoding: chain.tx_type,
            });
        }
        Self::new(endpoints)
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainEndpoint> {
        self.endpoints.get(&chain_id)
    }

    /// Look up a chain, failing with `UnsupportedChain` on a miss
    pub fn resolve(&self, chain_id: u64) -> RelayerResult<&ChainEndpoint> {
        self.get(chain_id)
            .ok_or(RelayerError::UnsupportedChain { chain_id })
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &ChainEndpoint> {
        self.endpoints.values()
    }
}
