//! The two relay identities

use crate::config::WalletConfig;
use crate::error::{RelayerError, RelayerResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use serde::Serialize;
use tracing::info;

/// Which relay identity signs a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SignerRole {
    /// Pays gas for the permit transaction
    FeePayer,
    /// The permit's spender; executes `transferFrom`
    Spender,
}

impl std::fmt::Display for SignerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerRole::FeePayer => write!(f, "fee-payer"),
            SignerRole::Spender => write!(f, "spender"),
        }
    }
}

/// Both signing keys, constructed once at start-up and injected
#[derive(Clone)]
pub struct RelaySigners {
    fee_payer: LocalWallet,
    spender: LocalWallet,
}

impl std::fmt::Debug for RelaySigners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySigners")
            .field("fee_payer", &self.fee_payer.address())
            .field("spender", &self.spender.address())
            .finish()
    }
}

impl RelaySigners {
    pub fn new(fee_payer: LocalWallet, spender: LocalWallet) -> RelayerResult<Self> {
        if fee_payer.address() == spender.address() {
            return Err(RelayerError::Wallet(
                "Fee payer and spender must be distinct identities".to_string(),
            ));
        }
        Ok(Self { fee_payer, spender })
    }

    /// Load both wallets from the environment variables named in the config
    pub fn from_env(config: &WalletConfig) -> RelayerResult<Self> {
        let fee_payer = load_wallet(&config.fee_payer_key_env)?;
        let spender = load_wallet(&config.spender_key_env)?;
        let signers = Self::new(fee_payer, spender)?;

        info!(
            "Relay signers loaded: fee payer {:?}, spender {:?}",
            signers.address(SignerRole::FeePayer),
            signers.address(SignerRole::Spender)
        );
        Ok(signers)
    }

    pub fn wallet(&self, role: SignerRole) -> &LocalWallet {
        match role {
            SignerRole::FeePayer => &self.fee_payer,
            SignerRole::Spender => &self.spender,
        }
    }

    pub fn address(&self, role: SignerRole) -> Address {
        self.wallet(role).address()
    }
}

fn load_wallet(var: &str) -> RelayerResult<LocalWallet> {
    let key = std::env::var(var)
        .map_err(|_| RelayerError::Wallet(format!("No private key configured. Set {}", var)))?;
    key.trim()
        .parse::<LocalWallet>()
        .map_err(|e| RelayerError::Wallet(format!("Invalid private key in {}: {}", var, e)))
}
