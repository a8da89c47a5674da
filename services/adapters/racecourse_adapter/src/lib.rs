//! Racecourse Adapter
//!
//! Client-side adapter between a front-end and the Race betting contract.
//! All game rules live in the contract; this crate only moves requests and
//! notifications across the chain boundary.
//!
//! Features:
//! - Deploy a new Race contract or attach to an existing address
//! - Watch `betPlaced`, `playersReadyToRaceChanged` and `finishedRace` events
//! - Aggregate the contract state into one snapshot with full `uint256` precision
//! - Submit `placeBet` and `playerReadyToRace` transactions with fixed gas
//!
//! ## Example
//! ```no_run
//! use racecourse_adapter::{RaceAdapter, RacecourseConfig};
//!
//! # async fn run() -> racecourse_adapter::Result<()> {
//! let config = RacecourseConfig::default();
//! let mut adapter = RaceAdapter::connect(
//!     &config,
//!     |event| println!("event: {}", event),
//!     |status| println!("status: {}", status),
//! )
//! .await?;
//!
//! let state = adapter.get_state().await?;
//! println!("{} horses, jackpot {}", state.horses.len(), state.jackpot);
//!
//! adapter.stop_watching();
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod artifacts;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod rpc_client;
pub mod state;
pub mod subscription;

pub use adapter::RaceAdapter;
pub use artifacts::ContractArtifacts;
pub use chain::{BetRecord, ChainNode, EventLog, EventStream, HorseRecord, RaceContract, RaceEvent, TxHandle};
pub use config::RacecourseConfig;
pub use error::{AdapterError, ChainError, ChainResult, Result};
pub use rpc_client::{EthersNode, EthersRaceContract};
pub use state::{Bet, ContractState, Horse};
pub use subscription::{EventCallback, EventSubscription};

#[cfg(test)]
mod tests;
