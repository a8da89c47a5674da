//! Race contract artifacts (ABI and compiled bytecode) loaded from disk

use ethers::abi::Abi;
use ethers::types::Bytes;
use std::path::Path;
use tracing::debug;

use crate::constants::events;
use crate::error::{AdapterError, Result};

/// Compiled contract interface and deployment bytecode
#[derive(Debug, Clone)]
pub struct ContractArtifacts {
    pub abi: Abi,
    pub bytecode: Bytes,
}

impl ContractArtifacts {
    /// Read `Race.abi` (JSON) and `Race.bin` (hex, optional `0x` prefix)
    pub fn load(abi_path: &Path, bin_path: &Path) -> Result<Self> {
        let abi_json = read_artifact(abi_path)?;
        let bin_hex = read_artifact(bin_path)?;

        let abi = Self::parse_abi(&abi_json).map_err(|reason| AdapterError::InvalidArtifact {
            path: abi_path.to_path_buf(),
            reason,
        })?;
        let bytecode =
            Self::parse_bytecode(&bin_hex).map_err(|reason| AdapterError::InvalidArtifact {
                path: bin_path.to_path_buf(),
                reason,
            })?;

        debug!(
            "Loaded contract artifacts: {} functions, {} events, {} bytes of bytecode",
            abi.functions.len(),
            abi.events.len(),
            bytecode.len()
        );

        Ok(Self { abi, bytecode })
    }

    fn parse_abi(json: &str) -> std::result::Result<Abi, String> {
        let abi: Abi = serde_json::from_str(json).map_err(|e| e.to_string())?;

        for event in [
            events::BET_PLACED,
            events::PLAYERS_READY_TO_RACE_CHANGED,
            events::FINISHED_RACE,
        ] {
            if abi.event(event).is_err() {
                return Err(format!("missing event `{}`", event));
            }
        }

        Ok(abi)
    }

    fn parse_bytecode(text: &str) -> std::result::Result<Bytes, String> {
        let text = text.trim();
        let hex_str = text.strip_prefix("0x").unwrap_or(text);

        if hex_str.is_empty() {
            return Err("bytecode is empty".to_string());
        }

        hex::decode(hex_str)
            .map(Bytes::from)
            .map_err(|e| e.to_string())
    }
}

fn read_artifact(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AdapterError::ArtifactNotFound {
            path: path.to_path_buf(),
        },
        _ => AdapterError::Io(e),
    })
}
