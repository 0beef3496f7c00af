//! Relay Module
//!
//! Destination-side machinery:
//! - [`lock`] - per-job execution slots guaranteeing single-flight execution
//! - [`evm_submitter`] - gas, nonce, signing, broadcast and receipt for Ethereum/Polygon
//! - [`fio_submitter`] - packed, signed unwrap actions pushed to FIO
//! - [`wrap_executor`] - worker loop draining one wrap queue in FIFO order

pub mod evm_submitter;
pub mod fio_submitter;
pub mod lock;
pub mod wrap_executor;

pub use evm_submitter::{ContractCall, EvmTransactionSubmitter, SubmissionPermit};
pub use fio_submitter::{FioUnwrapSubmitter, UnwrapAction};
pub use lock::{ExecutionLocks, JobKey, LockGuard, LockState};
pub use wrap_executor::{DrainOutcome, WrapExecutor};
