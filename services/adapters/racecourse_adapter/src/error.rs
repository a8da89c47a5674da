//! Error types for the racecourse adapter

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Result type alias for calls across the chain seam
pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Errors raised by the chain node or the contract binding
///
/// These are carried unmodified inside [`AdapterError`]; the adapter never
/// interprets revert reasons.
#[derive(Debug, Error)]
pub enum ChainError {
    /// JSON-RPC transport or node error
    #[error("provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    /// Contract call encoding, decoding or execution error
    #[error("contract error: {0}")]
    Contract(String),

    /// ABI does not describe a required function or event
    #[error("ABI error: {0}")]
    Abi(#[from] ethers::abi::Error),

    /// No contract code deployed at the address
    #[error("no contract code at {0:?}")]
    NoCode(ethers::types::Address),

    /// Transaction dropped from the mempool before a receipt was produced
    #[error("transaction {0:?} dropped without receipt")]
    MissingReceipt(ethers::types::TxHash),

    /// Receipt carries no created contract address
    #[error("receipt for {0:?} has no contract address")]
    MissingContractAddress(ethers::types::TxHash),

    /// Operation exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Node reported no usable accounts
    #[error("node has no unlocked accounts")]
    NoAccounts,
}

/// Main error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Chain node unreachable
    #[error("Unable to connect to {endpoint}: {reason}")]
    ConnectionFailed {
        /// Endpoint that could not be reached
        endpoint: String,
        /// Underlying transport failure
        reason: String,
    },

    /// No contract found at the configured address
    #[error("Could not find contract at address {address}")]
    ContractNotFound {
        /// Address that was looked up
        address: String,
    },

    /// Deployment transaction failed
    #[error("Error deploying contract: {0}")]
    DeploymentFailed(#[source] ChainError),

    /// A state read failed; the aggregate read is aborted
    #[error("Failed to read {entry_point}: {source}")]
    ReadFailed {
        /// Contract entry point that failed
        entry_point: &'static str,
        /// Chain client error
        #[source]
        source: ChainError,
    },

    /// Transaction submission failed
    #[error("Failed to submit {entry_point}: {source}")]
    WriteFailed {
        /// Contract entry point that was invoked
        entry_point: &'static str,
        /// Chain client error
        #[source]
        source: ChainError,
    },

    /// Event watch could not be installed (logged, never returned from connect)
    #[error("Could not setup event watching for {event}: {source}")]
    SubscriptionSetup {
        /// Contract event name
        event: &'static str,
        /// Chain client error
        #[source]
        source: ChainError,
    },

    /// Deployment or attachment was not acknowledged in time
    #[error("Contract synchronization timed out after {timeout_ms}ms")]
    SyncTimeout {
        /// Configured synchronization timeout
        timeout_ms: u64,
    },

    /// Required contract artifact is missing
    #[error("Contract artifact not found: {path:?}")]
    ArtifactNotFound {
        /// Path that was read
        path: PathBuf,
    },

    /// Contract artifact exists but cannot be parsed
    #[error("Invalid contract artifact {path:?}: {reason}")]
    InvalidArtifact {
        /// Path that was read
        path: PathBuf,
        /// Parse failure
        reason: String,
    },

    /// Malformed account or contract address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Bet amount is not a decimal integer
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Configuration error in adapter settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error while reading artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Check if this error ends the session and cannot be fixed by calling again
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AdapterError::ConnectionFailed { .. }
                | AdapterError::ArtifactNotFound { .. }
                | AdapterError::InvalidArtifact { .. }
                | AdapterError::Configuration(_)
        )
    }

    /// Check if this error came from a failed on-chain read or write
    pub fn is_chain_call(&self) -> bool {
        matches!(
            self,
            AdapterError::ReadFailed { .. } | AdapterError::WriteFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = AdapterError::ConnectionFailed {
            endpoint: "http://localhost:8545".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unable to connect to http://localhost:8545: connection refused"
        );

        let err = AdapterError::ReadFailed {
            entry_point: "jackpot",
            source: ChainError::Contract("execution reverted".to_string()),
        };
        assert!(err.to_string().contains("jackpot"));
        assert!(err.to_string().contains("execution reverted"));
    }

    #[test]
    fn test_classification() {
        assert!(AdapterError::Configuration("x".into()).is_permanent());
        assert!(!AdapterError::InvalidAmount("x".into()).is_permanent());
        assert!(AdapterError::WriteFailed {
            entry_point: "placeBet",
            source: ChainError::NoAccounts,
        }
        .is_chain_call());
    }
}
