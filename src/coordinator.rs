//! Relay Coordinator
//!
//! Wires watchers, executors and submitters from the configuration and runs
//! every job on its own timer:
//! - the FIO wrap watcher, which triggers the executors it fed
//! - one EVM unwrap watcher per configured unwrap direction
//! - an executor tick, which restarts idle executors with pending entries
//!   (this also drains queues left over from a previous run)
//!
//! Every job holds its execution slot while running, so a tick that fires
//! while the previous invocation is still busy is skipped.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{Config, EvmChainConfig};
use crate::crypto::{EvmSigner, FioSigner};
use crate::evm_client::EvmClient;
use crate::fio_client::FioClient;
use crate::intent::{Chain, Direction};
use crate::monitor::{EvmUnwrapWatcher, FioWrapWatcher, WatcherId};
use crate::relay::{
    DrainOutcome, EvmTransactionSubmitter, ExecutionLocks, FioUnwrapSubmitter, JobKey, LockGuard,
    WrapExecutor,
};
use crate::storage::{
    CheckpointStore, DeadLetterStore, ErrorContext, OracleLogs, StorageLayout, TransferQueue,
};

/// Timer periods of the scheduled jobs.
#[derive(Debug, Clone, Copy)]
pub struct JobIntervals {
    pub wrap_poll: Duration,
    pub unwrap_poll: Duration,
    pub executor: Duration,
}

/// Owner of every job of the oracle.
pub struct RelayCoordinator {
    locks: Arc<ExecutionLocks>,
    logs: OracleLogs,
    fio_watcher: FioWrapWatcher,
    unwrap_watchers: BTreeMap<Direction, EvmUnwrapWatcher>,
    executors: BTreeMap<Direction, Arc<WrapExecutor>>,
    intervals: JobIntervals,
}

impl RelayCoordinator {
    /// Builds all jobs from the configuration.
    ///
    /// Directions whose chain or contract is not configured are left out.
    /// Private keys are read from the environment variables named in the
    /// configuration.
    ///
    /// # Returns
    ///
    /// * `Ok(RelayCoordinator)` - Ready to run
    /// * `Err(anyhow::Error)` - Missing key, bad key or unusable log directory
    pub fn from_config(config: &Config) -> Result<Self> {
        let layout = StorageLayout::new(&config.oracle.log_dir)?;
        let logs = OracleLogs::new(layout.clone());
        let ttl = match config.oracle.lock_ttl_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let locks = ExecutionLocks::new(ttl);

        let fio_client = FioClient::new(&config.fio.api_url, &config.fio.history_url)?;
        let fio_signer = FioSigner::from_key_string(&config.fio.get_private_key()?)
            .context("Failed to load FIO oracle key")?;
        info!("FIO oracle public key: {}", fio_signer.public_key());
        let fio_submitter = Arc::new(FioUnwrapSubmitter::new(
            fio_client.clone(),
            fio_signer,
            &config.fio,
            logs.clone(),
        ));

        let mut submitters: HashMap<Chain, Arc<EvmTransactionSubmitter>> = HashMap::new();
        for (chain, chain_config) in evm_chains(config) {
            let signer = EvmSigner::from_hex(&chain_config.get_private_key()?)
                .with_context(|| format!("Failed to load {} oracle key", chain_config.name))?;
            info!("{} oracle address: {}", chain, signer.address());
            let submitter =
                EvmTransactionSubmitter::new(chain, chain_config, signer, logs.clone(), &config.oracle)?;
            submitters.insert(chain, Arc::new(submitter));
        }

        let mut executors = BTreeMap::new();
        let mut queues = HashMap::new();
        for direction in Direction::WRAPS {
            let (chain_config, contract) = match direction_contract(config, direction) {
                Some(found) => found,
                None => {
                    info!("{} not configured, skipping", direction);
                    continue;
                }
            };
            let submitter = match submitters.get(&direction.evm_chain()) {
                Some(submitter) => Arc::clone(submitter),
                None => continue,
            };
            debug!("{} relays to {} on {}", direction, contract, chain_config.name);

            let queue = Arc::new(TransferQueue::open(layout.queue(direction))?);
            let dead_letters = Arc::new(DeadLetterStore::new(layout.dead_letter(direction)));
            queues.insert(direction, Arc::clone(&queue));
            executors.insert(
                direction,
                Arc::new(WrapExecutor::new(
                    direction,
                    contract,
                    submitter,
                    queue,
                    dead_letters,
                    Arc::clone(&locks),
                    logs.clone(),
                )),
            );
        }

        let fio_watcher = FioWrapWatcher::new(
            fio_client,
            config.fio.oracle_contract.clone(),
            config.fio.poll_offset,
            evm_chains(config)
                .into_iter()
                .map(|(chain, chain_config)| (chain_config.chain_code.clone(), chain))
                .collect(),
            CheckpointStore::new(layout.checkpoint(WatcherId::FioWrap)),
            queues,
            logs.clone(),
        );

        let mut unwrap_watchers = BTreeMap::new();
        for direction in Direction::UNWRAPS {
            let (chain_config, contract) = match direction_contract(config, direction) {
                Some(found) => found,
                None => {
                    info!("{} not configured, skipping", direction);
                    continue;
                }
            };
            unwrap_watchers.insert(
                direction,
                EvmUnwrapWatcher::new(
                    direction,
                    EvmClient::new(&chain_config.rpc_url)?,
                    contract,
                    chain_config.blocks_range_limit,
                    CheckpointStore::new(layout.checkpoint(WatcherId::EvmUnwrap(direction))),
                    Arc::clone(&fio_submitter),
                    Arc::new(DeadLetterStore::new(layout.dead_letter(direction))),
                    logs.clone(),
                ),
            );
        }

        Ok(Self {
            locks,
            logs,
            fio_watcher,
            unwrap_watchers,
            executors,
            intervals: JobIntervals {
                wrap_poll: Duration::from_millis(config.oracle.wrap_polling_interval_ms),
                unwrap_poll: Duration::from_millis(config.oracle.unwrap_polling_interval_ms),
                executor: Duration::from_millis(config.oracle.executor_interval_ms),
            },
        })
    }

    pub fn locks(&self) -> &Arc<ExecutionLocks> {
        &self.locks
    }

    pub fn executor(&self, direction: Direction) -> Option<&Arc<WrapExecutor>> {
        self.executors.get(&direction)
    }

    pub fn fio_watcher(&self) -> &FioWrapWatcher {
        &self.fio_watcher
    }

    pub fn unwrap_watcher(&self, direction: Direction) -> Option<&EvmUnwrapWatcher> {
        self.unwrap_watchers.get(&direction)
    }

    pub fn intervals(&self) -> JobIntervals {
        self.intervals
    }

    /// One FIO wrap discovery cycle.
    ///
    /// # Returns
    ///
    /// * Handles of the executor runs started for directions that received new entries
    pub async fn run_fio_wrap_cycle(&self) -> Vec<JoinHandle<DrainOutcome>> {
        let _guard = match self.acquire(JobKey::Watcher(WatcherId::FioWrap)) {
            Some(guard) => guard,
            None => return Vec::new(),
        };

        match self.fio_watcher.poll().await {
            Ok(touched) => touched
                .into_iter()
                .filter_map(|direction| self.executors.get(&direction))
                .filter_map(|executor| executor.trigger())
                .collect(),
            Err(e) => {
                self.logs.record_error(
                    &ErrorContext::new(
                        Chain::Fio,
                        self.fio_watcher.contract(),
                        "wrap",
                        "Wrap discovery",
                    ),
                    &format!("{:#}", e),
                );
                Vec::new()
            }
        }
    }

    /// One unwrap discovery cycle for `direction`.
    ///
    /// # Returns
    ///
    /// * `Some(usize)` - Events found and relayed
    /// * `None` - Not configured, already running, or the cycle failed
    pub async fn run_unwrap_cycle(&self, direction: Direction) -> Option<usize> {
        let watcher = self.unwrap_watchers.get(&direction)?;
        let guard = self.acquire(JobKey::Watcher(WatcherId::EvmUnwrap(direction)))?;

        match watcher.poll_holding(&guard).await {
            Ok(found) => Some(found),
            Err(e) => {
                self.logs.record_error(
                    &ErrorContext::new(
                        direction.evm_chain(),
                        direction.evm_contract_label(),
                        direction.fio_action(),
                        "Unwrap discovery",
                    ),
                    &format!("{:#}", e),
                );
                None
            }
        }
    }

    /// Starts every idle executor.
    pub fn run_executor_tick(&self) -> Vec<JoinHandle<DrainOutcome>> {
        self.executors
            .values()
            .filter_map(|executor| executor.trigger())
            .collect()
    }

    /// Runs every job until `shutdown` completes.
    ///
    /// All timers fire immediately on start, so queues persisted by a previous
    /// run are drained right away.
    pub async fn run<F>(self: Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting FIO oracle: {} wrap executors, {} unwrap watchers",
            self.executors.len(),
            self.unwrap_watchers.len()
        );
        self.check_registrations().await;

        let mut jobs = Vec::new();

        let coordinator = Arc::clone(&self);
        jobs.push(spawn_job(self.intervals.wrap_poll, move || {
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator.run_fio_wrap_cycle().await;
            }
        }));

        for direction in self.unwrap_watchers.keys().copied() {
            let coordinator = Arc::clone(&self);
            jobs.push(spawn_job(self.intervals.unwrap_poll, move || {
                let coordinator = Arc::clone(&coordinator);
                async move {
                    coordinator.run_unwrap_cycle(direction).await;
                }
            }));
        }

        let coordinator = Arc::clone(&self);
        jobs.push(spawn_job(self.intervals.executor, move || {
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator.run_executor_tick();
            }
        }));

        shutdown.await;
        info!("Shutdown requested, stopping {} jobs", jobs.len());
        for job in &jobs {
            job.abort();
        }
        futures::future::join_all(jobs).await;
        Ok(())
    }

    /// Logs whether the oracle is registered on every wrap contract.
    ///
    /// Failures only warn; executors check again before each submission.
    async fn check_registrations(&self) {
        for executor in self.executors.values() {
            match executor
                .submitter()
                .ensure_oracle_registered(executor.contract())
                .await
            {
                Ok(()) => info!(
                    "{}: oracle {} registered on {}",
                    executor.direction(),
                    executor.submitter().oracle_address(),
                    executor.contract()
                ),
                Err(e) => warn!("{}: {}", executor.direction(), e),
            }
        }
    }

    fn acquire(&self, key: JobKey) -> Option<LockGuard> {
        let guard = match self.locks.try_acquire(key) {
            Some(guard) => guard,
            None => {
                debug!("{} still running, skipping tick", key);
                return None;
            }
        };
        if let Some(stalled) = guard.reclaimed_after() {
            self.logs.record_error(
                &ErrorContext::new(Chain::Fio, "oracle", key.to_string(), "Execution lock reclaimed"),
                &format!("previous run made no progress for {}s", stalled.as_secs()),
            );
        }
        Some(guard)
    }
}

/// Configured EVM chains with their chain identity.
fn evm_chains(config: &Config) -> Vec<(Chain, &EvmChainConfig)> {
    let mut chains = vec![(Chain::Ethereum, &config.ethereum)];
    if let Some(polygon) = &config.polygon {
        chains.push((Chain::Polygon, polygon));
    }
    chains
}

/// Chain settings and contract address a direction relays through, if configured.
fn direction_contract(config: &Config, direction: Direction) -> Option<(&EvmChainConfig, String)> {
    let chain_config = match direction.evm_chain() {
        Chain::Polygon => config.polygon.as_ref()?,
        _ => &config.ethereum,
    };
    let contract = if direction.is_domain() {
        chain_config.nft_contract_addr.clone()?
    } else {
        chain_config.token_contract_addr.clone()?
    };
    Some((chain_config, contract))
}

/// Spawns a job on a timer; ticks missed while the job runs are skipped.
fn spawn_job<F, Fut>(period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            job().await;
        }
    })
}
