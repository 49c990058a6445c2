// node/src/runtime.rs
use crate::{DarknodeEngine, EngineError, EngineResult, EngineStatus, NodeConfig};
use darknode_core::{ErrorKind, Timestamp};
use darknode_crypto::Address;
use registry::{Epoch, RegistryError};
use std::sync::Arc;
use storage::Database;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};

pub struct Node {
    config: NodeConfig,
    engine: Arc<RwLock<DarknodeEngine>>,
    database: Arc<Database>,
}

impl Node {
    /// Open the database and restore the engine, or create it at genesis
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        tracing::info!("Initializing node components");

        let database = Arc::new(Database::open(config.database_config())?);

        let engine = match database.load_snapshot()? {
            Some(snapshot) => {
                let engine = DarknodeEngine::from_snapshot(snapshot)?;
                tracing::info!(
                    "Restored engine at epoch {} with {} darknodes",
                    engine.registry().current_epoch().number,
                    engine.registry().num_darknodes()
                );
                engine
            }
            None => {
                let engine = DarknodeEngine::new(config.engine_config(current_timestamp())?)?;
                database.save_snapshot(&engine.snapshot())?;
                tracing::info!("Created genesis engine");
                engine
            }
        };

        Ok(Self {
            config,
            engine: Arc::new(RwLock::new(engine)),
            database,
        })
    }

    pub async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        tracing::info!("Starting darknode node");

        if self.config.runtime.auto_epoch {
            self.clone().start_epoch_ticker();
        }

        let status = self.status().await;
        tracing::info!("  Data Dir: {}", self.config.data_dir);
        tracing::info!("  Epoch:    {} ({} darknodes)", status.epoch, status.num_darknodes);
        tracing::info!("  Cycle:    {}", status.payment_cycle);
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("Shutting down node...");

        let engine = self.engine.read().await;
        self.database.save_snapshot(&engine.snapshot())?;
        self.database.compact()?;

        tracing::info!("Node shutdown complete");
        Ok(())
    }

    pub fn engine(&self) -> &Arc<RwLock<DarknodeEngine>> {
        &self.engine
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub async fn status(&self) -> EngineStatus {
        self.engine.read().await.status()
    }

    /// Apply `operation` under the write lock and persist the result.
    ///
    /// The operation runs against a copy of the engine; the copy replaces the
    /// live engine only after it succeeded and was written to disk.
    pub async fn execute<T, F>(&self, operation: F) -> EngineResult<T>
    where
        F: FnOnce(&mut DarknodeEngine) -> EngineResult<T>,
    {
        let mut engine = self.engine.write().await;
        let mut next = engine.clone();

        let output = operation(&mut next)?;
        self.database.save_snapshot(&next.snapshot())?;

        *engine = next;
        Ok(output)
    }

    /// Advance the epoch on behalf of `caller`
    pub async fn advance_epoch(&self, caller: Address, now: Timestamp) -> EngineResult<Epoch> {
        self.execute(|engine| engine.epoch(&caller, now)).await
    }

    // ==================== BACKGROUND TASKS ====================

    fn start_epoch_ticker(self: Arc<Self>) {
        let poll_secs = self.config.runtime.epoch_poll_secs.max(1);
        let keeper = match self.config.owner() {
            Ok(owner) => owner,
            Err(e) => {
                tracing::error!("Epoch ticker disabled, invalid owner: {}", e);
                return;
            }
        };

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(poll_secs));
            loop {
                ticker.tick().await;
                match self.advance_epoch(keeper, current_timestamp()).await {
                    Ok(epoch) => tracing::info!("Ticker advanced to epoch {}", epoch.number),
                    Err(EngineError::Registry(RegistryError::EpochTooSoon { earliest, .. })) => {
                        tracing::debug!("Next epoch due at {}", earliest);
                    }
                    Err(e) if e.kind() == ErrorKind::Internal => {
                        tracing::error!("Epoch ticker failed to persist: {}", e);
                    }
                    Err(e) => tracing::warn!("Epoch ticker: {}", e),
                }
            }
        });

        tracing::info!("✓ Epoch ticker started (every {}s)", poll_secs);
    }
}

/// Helper to get current timestamp
pub fn current_timestamp() -> Timestamp {
    chrono::Utc::now().timestamp().max(0) as Timestamp
}
