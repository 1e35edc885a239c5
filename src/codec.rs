//! Calldata codec for the permit contract
//!
//! The ABI is fixed: EIP-2612 `permit` and ERC-20 `transferFrom`. Nothing
//! here is user-supplied beyond the calldata bytes themselves.

use crate::error::{RelayerError, RelayerResult};

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::EthCall;
use ethers::types::{Address, Bytes, U256};
use std::str::FromStr;

/// `permit(address,address,uint256,uint256,uint8,bytes32,bytes32)`, selector `0xd505accf`
#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "permit",
    abi = "permit(address,address,uint256,uint256,uint8,bytes32,bytes32)"
)]
pub struct PermitCall {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub deadline: U256,
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// `transferFrom(address,address,uint256)`, selector `0x23b872dd`
#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "transferFrom", abi = "transferFrom(address,address,uint256)")]
pub struct TransferFromCall {
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// The parts of a permit the relay acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPermit {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
}

/// Parse `0x`-prefixed (or bare) hex calldata
pub fn parse_calldata(calldata: &str) -> RelayerResult<Bytes> {
    let trimmed = calldata.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| RelayerError::MalformedCalldata(format!("calldata is not hex: {}", e)))
}

/// Decode a `permit` call; anything else is `MalformedCalldata`
pub fn decode_permit(calldata: &[u8]) -> RelayerResult<DecodedPermit> {
    if calldata.len() < 4 || calldata[..4] != PermitCall::selector() {
        return Err(RelayerError::MalformedCalldata(format!(
            "expected permit selector 0x{}",
            hex::encode(PermitCall::selector())
        )));
    }

    let call = PermitCall::decode(calldata)
        .map_err(|e| RelayerError::MalformedCalldata(e.to_string()))?;

    Ok(DecodedPermit {
        owner: call.owner,
        spender: call.spender,
        value: call.value,
    })
}

/// Encode `transferFrom(owner, spender, amount)`
pub fn encode_transfer_from(owner: Address, spender: Address, amount: U256) -> Bytes {
    TransferFromCall {
        from: owner,
        to: spender,
        value: amount,
    }
    .encode()
    .into()
}

/// Parse an address argument, rejecting anything that is not 20 bytes of hex
pub fn parse_address(value: &str) -> RelayerResult<Address> {
    Address::from_str(value.trim())
        .map_err(|e| RelayerError::InvalidArgument(format!("invalid address {:?}: {}", value, e)))
}
