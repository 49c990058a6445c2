// storage/src/db.rs

use crate::{StorageError, StorageResult};
use darknode_core::TokenLedger;
use darknode_crypto::Address;
use payment::DarknodePayment;
use registry::{DarknodeRegistryStore, RegistryState, Slasher};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 2;

const SCHEMA_KEY: &str = "schema_version";
const CURRENT: &[u8] = b"current";
const SLASHER: &[u8] = b"slasher";
const PENDING_SLASHER: &[u8] = b"pending_slasher";

/// Column families for different data types
#[derive(Debug, Clone, Copy)]
pub enum ColumnFamily {
    /// Bond store: darknode records, ordering and store ownership
    Store,
    /// Registry logic state and the slasher
    Registry,
    Payment,
    /// Token ledgers keyed by token address
    Tokens,
    Meta,
}

impl ColumnFamily {
    fn as_str(&self) -> &'static str {
        match self {
            ColumnFamily::Store => "store",
            ColumnFamily::Registry => "registry",
            ColumnFamily::Payment => "payment",
            ColumnFamily::Tokens => "tokens",
            ColumnFamily::Meta => "meta",
        }
    }

    fn all() -> Vec<Self> {
        vec![
            Self::Store,
            Self::Registry,
            Self::Payment,
            Self::Tokens,
            Self::Meta,
        ]
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub max_open_files: i32,
    pub cache_size_mb: u64,
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
            create_if_missing: true,
            max_open_files: 1024,
            cache_size_mb: 64,
            write_buffer_size: 16 * 1024 * 1024, // 16 MB
            max_write_buffer_number: 2,
        }
    }
}

/// Everything the engine persists, written and read as one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub registry: RegistryState,
    pub store: DarknodeRegistryStore,
    pub slasher: Slasher,
    /// Replacement slasher waiting for the registry to activate its address
    #[serde(default)]
    pub pending_slasher: Option<Slasher>,
    pub payment: DarknodePayment,
    pub tokens: Vec<TokenLedger>,
}

/// Main database interface
pub struct Database {
    db: Arc<DB>,
    config: DatabaseConfig,
}

impl Database {
    /// Open or create the database and bring its schema up to date
    pub fn open(config: DatabaseConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.optimize_for_point_lookup(config.cache_size_mb);
        opts.increase_parallelism(num_cpus::get() as i32);

        let cfs: Vec<_> = ColumnFamily::all().iter().map(|cf| cf.as_str()).collect();
        let db = DB::open_cf(&opts, &config.path, &cfs)?;

        tracing::info!("Database opened at {}", config.path);

        let database = Self {
            db: Arc::new(db),
            config,
        };
        database.ensure_schema()?;
        Ok(database)
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    // ==================== SCHEMA ====================

    pub fn schema_version(&self) -> StorageResult<Option<u32>> {
        match self.get_meta(SCHEMA_KEY)? {
            Some(bytes) => {
                let version = u32::from_be_bytes(bytes.try_into()
                    .map_err(|_| StorageError::Corruption("Invalid schema version".into()))?);
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    fn ensure_schema(&self) -> StorageResult<()> {
        let mut version = match self.schema_version()? {
            Some(version) => version,
            None => {
                tracing::info!("Initializing schema version {}", SCHEMA_VERSION);
                return self.store_meta(SCHEMA_KEY, &SCHEMA_VERSION.to_be_bytes());
            }
        };

        if version > SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchema {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        while version < SCHEMA_VERSION {
            let mut batch = WriteBatch::default();
            match version {
                1 => self.migrate_token_keys(&mut batch)?,
                other => {
                    return Err(StorageError::Corruption(format!("No migration from schema {}", other)))
                }
            }
            version += 1;
            batch.put_cf(self.cf(ColumnFamily::Meta)?, SCHEMA_KEY.as_bytes(), version.to_be_bytes());
            self.db.write(batch)?;
            tracing::info!("Migrated database to schema version {}", version);
        }
        Ok(())
    }

    /// Schema 1 keyed token ledgers by symbol; schema 2 keys them by address
    fn migrate_token_keys(&self, batch: &mut WriteBatch) -> StorageResult<()> {
        let cf = self.cf(ColumnFamily::Tokens)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            if key.len() == 20 {
                continue;
            }
            let ledger: TokenLedger = decode(&value)?;
            batch.delete_cf(cf, &key);
            batch.put_cf(cf, ledger.id().as_bytes(), &value);
            tracing::debug!("Re-keyed token ledger {}", ledger.symbol());
        }
        Ok(())
    }

    // ==================== ENGINE SNAPSHOTS ====================

    /// Write a full engine state in one batch
    pub fn save_snapshot(&self, snapshot: &EngineSnapshot) -> StorageResult<()> {
        let mut batch = WriteBatch::default();

        batch.put_cf(self.cf(ColumnFamily::Store)?, CURRENT, encode(&snapshot.store)?);
        batch.put_cf(self.cf(ColumnFamily::Registry)?, CURRENT, encode(&snapshot.registry)?);
        batch.put_cf(self.cf(ColumnFamily::Registry)?, SLASHER, encode(&snapshot.slasher)?);
        match &snapshot.pending_slasher {
            Some(pending) => batch.put_cf(self.cf(ColumnFamily::Registry)?, PENDING_SLASHER, encode(pending)?),
            None => batch.delete_cf(self.cf(ColumnFamily::Registry)?, PENDING_SLASHER),
        }
        batch.put_cf(self.cf(ColumnFamily::Payment)?, CURRENT, encode(&snapshot.payment)?);

        let cf_tokens = self.cf(ColumnFamily::Tokens)?;
        for ledger in &snapshot.tokens {
            batch.put_cf(cf_tokens, ledger.id().as_bytes(), encode(ledger)?);
        }

        self.db.write(batch)?;
        tracing::debug!(
            "Saved snapshot at epoch {} with {} darknodes",
            snapshot.registry.scheduler.current().number,
            snapshot.store.len()
        );
        Ok(())
    }

    /// Load the engine state; `None` on a fresh database
    pub fn load_snapshot(&self) -> StorageResult<Option<EngineSnapshot>> {
        let Some(registry) = self.load_registry_state()? else {
            return Ok(None);
        };
        let store = self.load_store()?
            .ok_or_else(|| StorageError::Corruption("Registry state without a store".into()))?;
        let slasher = self.get(ColumnFamily::Registry, SLASHER)?
            .ok_or_else(|| StorageError::Corruption("Missing slasher".into()))?;
        let pending_slasher = self.get(ColumnFamily::Registry, PENDING_SLASHER)?;
        let payment = self.get(ColumnFamily::Payment, CURRENT)?
            .ok_or_else(|| StorageError::Corruption("Missing payment ledger".into()))?;

        Ok(Some(EngineSnapshot {
            registry,
            store,
            slasher,
            pending_slasher,
            payment,
            tokens: self.load_tokens()?,
        }))
    }

    // ==================== STORE AND LOGIC ====================

    /// Persist the bond store on its own
    pub fn save_store(&self, store: &DarknodeRegistryStore) -> StorageResult<()> {
        self.put(ColumnFamily::Store, CURRENT, store)
    }

    pub fn load_store(&self) -> StorageResult<Option<DarknodeRegistryStore>> {
        self.get(ColumnFamily::Store, CURRENT)
    }

    /// Persist the registry logic state on its own, leaving the store as is
    pub fn save_registry_state(&self, state: &RegistryState) -> StorageResult<()> {
        self.put(ColumnFamily::Registry, CURRENT, state)
    }

    pub fn load_registry_state(&self) -> StorageResult<Option<RegistryState>> {
        self.get(ColumnFamily::Registry, CURRENT)
    }

    pub fn load_token(&self, token: &Address) -> StorageResult<Option<TokenLedger>> {
        self.get(ColumnFamily::Tokens, token.as_bytes())
    }

    pub fn load_tokens(&self) -> StorageResult<Vec<TokenLedger>> {
        let cf = self.cf(ColumnFamily::Tokens)?;
        let mut tokens = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            tokens.push(decode(&value)?);
        }
        Ok(tokens)
    }

    // ==================== METADATA OPERATIONS ====================

    /// Store metadata
    pub fn store_meta(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let cf = self.cf(ColumnFamily::Meta)?;
        Ok(self.db.put_cf(cf, key.as_bytes(), value)?)
    }

    /// Get metadata
    pub fn get_meta(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.cf(ColumnFamily::Meta)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    // ==================== UTILITY OPERATIONS ====================

    /// Compact database
    pub fn compact(&self) -> StorageResult<()> {
        tracing::info!("Compacting database...");

        for cf_type in ColumnFamily::all() {
            if let Ok(cf) = self.cf(cf_type) {
                self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
            }
        }

        tracing::info!("Database compaction complete");
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> StorageResult<DatabaseStats> {
        let store = self.load_store()?;
        let cf_tokens = self.cf(ColumnFamily::Tokens)?;

        Ok(DatabaseStats {
            schema_version: self.schema_version()?.unwrap_or(SCHEMA_VERSION),
            darknodes: store.as_ref().map_or(0, |s| s.len()),
            tokens: self.db.iterator_cf(cf_tokens, IteratorMode::Start).count(),
            epoch: self.load_registry_state()?.map(|s| s.scheduler.current().number),
        })
    }

    fn put<T: Serialize>(&self, cf_type: ColumnFamily, key: &[u8], value: &T) -> StorageResult<()> {
        let cf = self.cf(cf_type)?;
        Ok(self.db.put_cf(cf, key, encode(value)?)?)
    }

    fn get<T: DeserializeOwned>(&self, cf_type: ColumnFamily, key: &[u8]) -> StorageResult<Option<T>> {
        let cf = self.cf(cf_type)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get column family handle
    fn cf(&self, cf_type: ColumnFamily) -> StorageResult<&rocksdb::ColumnFamily> {
        self.db.cf_handle(cf_type.as_str())
            .ok_or_else(|| StorageError::DatabaseError(format!("{} CF not found", cf_type.as_str())))
    }
}

fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub schema_version: u32,
    pub darknodes: usize,
    pub tokens: usize,
    pub epoch: Option<u64>,
}
