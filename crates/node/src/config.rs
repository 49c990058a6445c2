// node/src/config.rs
use crate::EngineConfig;
use darknode_core::{Amount, Timestamp};
use darknode_crypto::Address;
use registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use storage::DatabaseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    pub registry: RegistrySection,
    pub payment: PaymentSection,
    pub storage: StorageSection,
    pub runtime: RuntimeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySection {
    /// Symbol of the bond token
    pub bond_token: String,
    /// Bond in base token units
    pub minimum_bond: u64,
    pub minimum_pod_size: u64,
    pub minimum_epoch_interval_secs: u64,
    /// Hex address of the registry owner
    pub owner: String,
    /// Hex address of the slasher; empty for the built-in one
    #[serde(default)]
    pub slasher: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSection {
    pub payout_percent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    pub cache_size_mb: u64,
    pub max_open_files: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Advance epochs automatically once they are due
    pub auto_epoch: bool,
    pub epoch_poll_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            registry: RegistrySection {
                bond_token: "REN".into(),
                minimum_bond: 100_000,
                minimum_pod_size: 24,
                minimum_epoch_interval_secs: 24 * 3600,
                owner: Address::from_label("darknode-owner").to_hex(),
                slasher: String::new(),
            },
            payment: PaymentSection {
                payout_percent: 50,
            },
            storage: StorageSection {
                cache_size_mb: 64,
                max_open_files: 1024,
            },
            runtime: RuntimeSection {
                auto_epoch: true,
                epoch_poll_secs: 30,
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn owner(&self) -> anyhow::Result<Address> {
        Ok(Address::from_hex(&self.registry.owner)?)
    }

    pub fn slasher(&self) -> anyhow::Result<Address> {
        if self.registry.slasher.is_empty() {
            return Ok(Address::zero());
        }
        Ok(Address::from_hex(&self.registry.slasher)?)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            path: format!("{}/db", self.data_dir),
            cache_size_mb: self.storage.cache_size_mb,
            max_open_files: self.storage.max_open_files,
            ..Default::default()
        }
    }

    /// Genesis parameters for an engine created at `genesis_time`
    pub fn engine_config(&self, genesis_time: Timestamp) -> anyhow::Result<EngineConfig> {
        if self.registry.minimum_bond == 0 {
            anyhow::bail!("registry.minimum_bond must be non-zero");
        }
        if self.payment.payout_percent > darknode_core::MAX_PERCENT {
            anyhow::bail!("payment.payout_percent must be at most 100");
        }

        Ok(EngineConfig {
            owner: self.owner()?,
            bond_token: self.registry.bond_token.clone(),
            registry: RegistryConfig {
                minimum_bond: Amount::from_u64(self.registry.minimum_bond),
                minimum_pod_size: self.registry.minimum_pod_size,
                minimum_epoch_interval: self.registry.minimum_epoch_interval_secs,
                slasher: self.slasher()?,
                darknode_payment: Address::zero(),
            },
            payout_percent: self.payment.payout_percent,
            genesis_time,
        })
    }
}
