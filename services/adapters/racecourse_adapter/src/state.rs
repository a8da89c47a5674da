//! Contract state snapshot returned by [`crate::RaceAdapter::get_state`]
//!
//! Every integer is kept as the decimal string of the on-chain `uint256` so
//! balances never pass through a float. Serializes with the camelCase field
//! names the front-end consumes.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::chain::{BetRecord, HorseRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horse {
    pub index: String,
    pub name: String,
}

impl From<HorseRecord> for Horse {
    fn from(record: HorseRecord) -> Self {
        Self {
            index: record.index.to_string(),
            name: record.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub index: String,
    pub player: Address,
    pub amount: String,
    pub player_ready_to_race: bool,
}

impl From<BetRecord> for Bet {
    fn from(record: BetRecord) -> Self {
        Self {
            index: record.index.to_string(),
            player: record.player,
            amount: record.amount.to_string(),
            player_ready_to_race: record.player_ready_to_race,
        }
    }
}

/// Point-in-time view of the race, rebuilt on every read
///
/// Fields come from separate calls, so a transaction mined between them can
/// make the snapshot internally inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractState {
    pub horses: Vec<Horse>,
    pub bets: Vec<Bet>,
    pub players_ready_to_race: String,
    pub race_finished: bool,
    pub jackpot: String,
    pub winner_horse: String,
}

impl ContractState {
    /// Jackpot parsed back into an integer
    pub fn jackpot_wei(&self) -> Option<U256> {
        U256::from_dec_str(&self.jackpot).ok()
    }
}
