//! Deployment configuration loading
//!
//! Handles loading the hub and spoke deployments from a JSON file: chain
//! ids, contract addresses, deployment blocks, lookback limits and RPC
//! endpoints. Validation failures are loud; a config that parses is safe to
//! build clients from.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// The hub contract deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubDeployment {
    pub chain_id: u64,
    pub address: Address,
    pub deployment_block: u64,
    /// Maximum blocks per sub-range query; 0 disables pagination
    #[serde(default)]
    pub max_lookback: u64,
    pub rpc_url: String,
}

/// One spoke contract deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpokeDeployment {
    pub chain_id: u64,
    pub address: Address,
    pub deployment_block: u64,
    /// Start indexing here instead of the deployment block (route
    /// enablement is still recovered from deployment)
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Maximum blocks per sub-range query; 0 disables pagination
    #[serde(default)]
    pub max_lookback: u64,
    pub rpc_url: String,
}

/// Full indexer configuration: one hub, any number of spokes.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    pub hub: HubDeployment,
    pub spokes: Vec<SpokeDeployment>,
}

impl HubDeployment {
    /// The pagination lookback, with 0 mapped to "disabled".
    pub fn lookback(&self) -> Option<u64> {
        (self.max_lookback > 0).then_some(self.max_lookback)
    }
}

impl SpokeDeployment {
    /// The pagination lookback, with 0 mapped to "disabled".
    pub fn lookback(&self) -> Option<u64> {
        (self.max_lookback > 0).then_some(self.max_lookback)
    }
}

/// Load and validate an indexer configuration file.
pub fn load_config(path: &Path) -> Result<IndexerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: IndexerConfig =
        serde_json::from_str(&contents).context("Failed to parse config file")?;

    if config.spokes.is_empty() {
        anyhow::bail!("Config has no spoke deployments");
    }

    let mut chain_ids = HashSet::new();
    chain_ids.insert(config.hub.chain_id);
    for spoke in &config.spokes {
        if !chain_ids.insert(spoke.chain_id) {
            anyhow::bail!("Duplicate chain id {} in config", spoke.chain_id);
        }
        if let Some(start) = spoke.start_block {
            if start < spoke.deployment_block {
                anyhow::bail!(
                    "Spoke {} start block {} precedes deployment block {}",
                    spoke.chain_id,
                    start,
                    spoke.deployment_block
                );
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"{
        "hub": {
            "chainId": 1,
            "address": "0x1111111111111111111111111111111111111111",
            "deploymentBlock": 100,
            "maxLookback": 10000,
            "rpcUrl": "http://127.0.0.1:8545"
        },
        "spokes": [
            {
                "chainId": 10,
                "address": "0x2222222222222222222222222222222222222222",
                "deploymentBlock": 5,
                "startBlock": 50,
                "maxLookback": 0,
                "rpcUrl": "http://127.0.0.1:9545"
            }
        ]
    }"#;

    #[test]
    fn test_load_valid_config() {
        let file = write_config(VALID);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.hub.chain_id, 1);
        assert_eq!(config.hub.lookback(), Some(10_000));
        assert_eq!(config.spokes.len(), 1);
        assert_eq!(config.spokes[0].start_block, Some(50));
        // 0 is the conventional "pagination disabled" sentinel
        assert_eq!(config.spokes[0].lookback(), None);
    }

    #[test]
    fn test_no_spokes_rejected() {
        let file = write_config(
            r#"{
                "hub": {
                    "chainId": 1,
                    "address": "0x1111111111111111111111111111111111111111",
                    "deploymentBlock": 100,
                    "rpcUrl": "http://127.0.0.1:8545"
                },
                "spokes": []
            }"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_duplicate_chain_id_rejected() {
        let file = write_config(
            r#"{
                "hub": {
                    "chainId": 1,
                    "address": "0x1111111111111111111111111111111111111111",
                    "deploymentBlock": 100,
                    "rpcUrl": "http://127.0.0.1:8545"
                },
                "spokes": [
                    {
                        "chainId": 1,
                        "address": "0x2222222222222222222222222222222222222222",
                        "deploymentBlock": 5,
                        "rpcUrl": "http://127.0.0.1:9545"
                    }
                ]
            }"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_start_block_before_deployment_rejected() {
        let file = write_config(
            r#"{
                "hub": {
                    "chainId": 1,
                    "address": "0x1111111111111111111111111111111111111111",
                    "deploymentBlock": 100,
                    "rpcUrl": "http://127.0.0.1:8545"
                },
                "spokes": [
                    {
                        "chainId": 10,
                        "address": "0x2222222222222222222222222222222222222222",
                        "deploymentBlock": 50,
                        "startBlock": 10,
                        "rpcUrl": "http://127.0.0.1:9545"
                    }
                ]
            }"#,
        );
        assert!(load_config(file.path()).is_err());
    }
}
