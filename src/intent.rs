//! Transfer intents and relay directions.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// CHAINS AND DIRECTIONS
// ============================================================================

/// Chains the oracle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Fio,
    Ethereum,
    Polygon,
}

impl Chain {
    /// Short code used in audit logs and in FIO `chain_code` fields.
    pub fn code(self) -> &'static str {
        match self {
            Chain::Fio => "FIO",
            Chain::Ethereum => "ETH",
            Chain::Polygon => "MATIC",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One relay lane. Wrap directions carry FIO actions to an EVM chain,
/// unwrap directions carry EVM events back to FIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    WrapTokensEth,
    WrapDomainEth,
    WrapDomainPolygon,
    UnwrapTokensEth,
    UnwrapDomainEth,
    UnwrapDomainPolygon,
}

impl Direction {
    pub const WRAPS: [Direction; 3] = [
        Direction::WrapTokensEth,
        Direction::WrapDomainEth,
        Direction::WrapDomainPolygon,
    ];

    pub const UNWRAPS: [Direction; 3] = [
        Direction::UnwrapTokensEth,
        Direction::UnwrapDomainEth,
        Direction::UnwrapDomainPolygon,
    ];

    pub fn is_wrap(self) -> bool {
        matches!(
            self,
            Direction::WrapTokensEth | Direction::WrapDomainEth | Direction::WrapDomainPolygon
        )
    }

    pub fn is_domain(self) -> bool {
        !matches!(self, Direction::WrapTokensEth | Direction::UnwrapTokensEth)
    }

    /// The EVM side of the lane.
    pub fn evm_chain(self) -> Chain {
        match self {
            Direction::WrapDomainPolygon | Direction::UnwrapDomainPolygon => Chain::Polygon,
            _ => Chain::Ethereum,
        }
    }

    pub fn source_chain(self) -> Chain {
        if self.is_wrap() {
            Chain::Fio
        } else {
            self.evm_chain()
        }
    }

    pub fn destination_chain(self) -> Chain {
        if self.is_wrap() {
            self.evm_chain()
        } else {
            Chain::Fio
        }
    }

    /// FIO action name on the `fio.oracle` contract.
    pub fn fio_action(self) -> &'static str {
        match (self.is_wrap(), self.is_domain()) {
            (true, false) => "wraptokens",
            (true, true) => "wrapdomain",
            (false, false) => "unwraptokens",
            (false, true) => "unwrapdomain",
        }
    }

    /// Label of the EVM contract in audit logs.
    pub fn evm_contract_label(self) -> &'static str {
        if self.is_domain() {
            "fio.erc721"
        } else {
            "fio.erc20"
        }
    }

    /// File name stem for this lane's queue and dead-letter files.
    pub fn file_stem(self) -> &'static str {
        match self {
            Direction::WrapTokensEth => "WrapTokensEth",
            Direction::WrapDomainEth => "WrapDomainEth",
            Direction::WrapDomainPolygon => "WrapDomainPolygon",
            Direction::UnwrapTokensEth => "UnwrapTokensEth",
            Direction::UnwrapDomainEth => "UnwrapDomainEth",
            Direction::UnwrapDomainPolygon => "UnwrapDomainPolygon",
        }
    }

    /// Maps a FIO action on the oracle contract to a wrap direction.
    ///
    /// `destination` is the chain whose configured chain code the action
    /// named. `wraptokens` always targets Ethereum (the executor rejects other
    /// chain codes); `wrapdomain` is routed by its destination.
    pub fn classify_wrap(action_name: &str, destination: Option<Chain>) -> Option<Direction> {
        match (action_name, destination) {
            ("wraptokens", _) => Some(Direction::WrapTokensEth),
            ("wrapdomain", Some(Chain::Ethereum)) => Some(Direction::WrapDomainEth),
            ("wrapdomain", Some(Chain::Polygon)) => Some(Direction::WrapDomainPolygon),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{}",
            self.fio_action(),
            self.source_chain(),
            self.destination_chain()
        )
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Data of a FIO `wraptokens` / `wrapdomain` action.
///
/// Fields the relay does not use (fees, tpid, actor) are preserved in `extra`
/// so queue lines keep the action data as it was discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapPayload {
    pub public_address: String,
    pub chain_code: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_u64"
    )]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fio_domain: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Payload of a discovered intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IntentPayload {
    Wrap(WrapPayload),
    UnwrapTokens { fio_address: String, amount: u64 },
    UnwrapDomain { fio_address: String, domain: String },
}

/// One cross-chain relay unit discovered by a watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferIntent {
    /// Transaction id on the source chain
    pub source_tx_id: String,
    pub direction: Direction,
    pub payload: IntentPayload,
    /// Source chain block the intent was found in
    pub discovered_at_block: u64,
}

/// Accepts a JSON number or a decimal string; FIO history nodes emit both.
pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("amount {} is not an unsigned integer", n))),
        Some(serde_json::Value::String(s)) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("amount '{}': {}", s, e))),
        Some(other) => Err(D::Error::custom(format!("unexpected amount {}", other))),
    }
}
