//! Chain node and contract-binding seams
//!
//! [`ChainNode`] is the connection to a node (accounts, block height, deploy,
//! attach). [`RaceContract`] is the typed binding over one deployed Race
//! contract. The adapter only talks to these traits; [`crate::rpc_client`]
//! implements them over ethers JSON-RPC.

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use futures::stream::BoxStream;
use std::fmt;

use crate::constants::events;
use crate::error::{ChainError, ChainResult};

/// Contract events the adapter watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaceEvent {
    BetPlaced,
    PlayersReadyToRaceChanged,
    RaceFinished,
}

impl RaceEvent {
    pub const ALL: [RaceEvent; 3] = [
        RaceEvent::BetPlaced,
        RaceEvent::PlayersReadyToRaceChanged,
        RaceEvent::RaceFinished,
    ];

    /// Event name in the contract ABI
    pub fn abi_name(&self) -> &'static str {
        match self {
            RaceEvent::BetPlaced => events::BET_PLACED,
            RaceEvent::PlayersReadyToRaceChanged => events::PLAYERS_READY_TO_RACE_CHANGED,
            RaceEvent::RaceFinished => events::FINISHED_RACE,
        }
    }

    /// Human-readable name passed to the event callback
    pub fn display_name(&self) -> &'static str {
        match self {
            RaceEvent::BetPlaced => "Bet placed",
            RaceEvent::PlayersReadyToRaceChanged => "Players ready to race changed",
            RaceEvent::RaceFinished => "Finished race",
        }
    }
}

impl fmt::Display for RaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abi_name())
    }
}

/// One log delivered by an event watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    pub event: RaceEvent,
    /// `None` for logs from pending blocks
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
}

/// Notification stream of one event watch; errors do not end the stream
pub type EventStream = BoxStream<'static, ChainResult<EventLog>>;

/// Handle to a submitted, unconfirmed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: TxHash,
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.hash)
    }
}

/// Raw `horses(i)` return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorseRecord {
    pub index: U256,
    pub name: String,
}

/// Raw `bets(i)` return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetRecord {
    pub index: U256,
    pub player: Address,
    pub amount: U256,
    pub player_ready_to_race: bool,
}

/// Connection to a chain node
#[async_trait]
pub trait ChainNode: Send + Sync + 'static {
    /// Binding type produced by deploy/attach
    type Contract: RaceContract;

    /// Endpoint description used in errors and logs
    fn endpoint(&self) -> &str;

    /// Round-trip to the node; fails when it is unreachable
    async fn check_connection(&self) -> ChainResult<()>;

    /// Accounts managed by the node
    async fn accounts(&self) -> ChainResult<Vec<Address>>;

    /// Current block height
    async fn block_number(&self) -> ChainResult<u64>;

    /// Submit the deployment transaction from `from`
    async fn submit_deployment(&self, from: Address) -> ChainResult<TxHash>;

    /// Wait for the deployment receipt and bind to the created contract
    async fn deployed_contract(&self, tx_hash: TxHash) -> ChainResult<Self::Contract>;

    /// Bind to an existing contract; fails with [`ChainError::NoCode`] if none is deployed there
    async fn attach(&self, address: Address) -> ChainResult<Self::Contract>;

    /// Empty transaction from `from`, used to make dev nodes mine a block
    async fn send_noop(&self, from: Address) -> ChainResult<TxHash>;
}

/// Typed binding over a deployed Race contract
#[async_trait]
pub trait RaceContract: Send + Sync + 'static {
    fn address(&self) -> Address;

    async fn horse_count(&self) -> ChainResult<U256>;
    async fn horse(&self, index: U256) -> ChainResult<HorseRecord>;
    async fn bet_count(&self) -> ChainResult<U256>;
    async fn bet(&self, index: U256) -> ChainResult<BetRecord>;
    async fn players_ready_to_race(&self) -> ChainResult<U256>;
    async fn race_finished(&self) -> ChainResult<bool>;
    async fn jackpot(&self) -> ChainResult<U256>;
    async fn winner_horse(&self) -> ChainResult<U256>;

    /// Submit `placeBet(horse, amount)` without waiting for confirmation
    async fn place_bet(&self, horse: U256, amount: U256, from: Address) -> ChainResult<TxHash>;

    /// Submit `playerReadyToRace()` without waiting for confirmation
    async fn player_ready_to_race(&self, from: Address) -> ChainResult<TxHash>;

    /// Install a log filter for `event` starting at the latest block
    async fn watch(&self, event: RaceEvent) -> ChainResult<EventStream>;
}

/// Convert a `U256` count into a loop bound
pub(crate) fn count_to_u64(count: U256, what: &'static str) -> ChainResult<u64> {
    if count > U256::from(u64::MAX) {
        return Err(ChainError::Contract(format!("{} out of range: {}", what, count)));
    }
    Ok(count.as_u64())
}
