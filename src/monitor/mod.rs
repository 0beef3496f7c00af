//! Chain Watchers Module
//!
//! Watchers discover transfer intents on a source chain since their stored
//! checkpoint:
//! - [`FioWrapWatcher`] reads `wraptokens` / `wrapdomain` actions from FIO history
//!   and feeds the durable wrap queues
//! - [`EvmUnwrapWatcher`] scans `unwrapped` events on an EVM wrap contract and
//!   relays each one straight to FIO

mod evm_unwrap;
mod fio_wrap;

pub use evm_unwrap::EvmUnwrapWatcher;
pub use fio_wrap::{DiscoveredAction, FioWrapWatcher};

use std::fmt;

use crate::intent::Direction;

/// Identity of a watcher; each owns one checkpoint and one job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherId {
    /// FIO history feeding all wrap directions
    FioWrap,
    /// One EVM contract feeding one unwrap direction
    EvmUnwrap(Direction),
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherId::FioWrap => f.write_str("FIO wrap"),
            WatcherId::EvmUnwrap(direction) => write!(f, "{}", direction),
        }
    }
}
