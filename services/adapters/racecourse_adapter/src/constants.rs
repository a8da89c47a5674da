//! Race contract entry points and transaction defaults
//!
//! Entry point and event names are fixed by the contract ABI. Gas settings are
//! defaults only; the effective values come from [`crate::RacecourseConfig`].

/// Contract functions called by the adapter
pub mod entry_points {
    /// `horseCount() returns (uint)`
    pub const HORSE_COUNT: &str = "horseCount";

    /// `horses(uint) returns (uint index, string name)`
    pub const HORSES: &str = "horses";

    /// `betCount() returns (uint)`
    pub const BET_COUNT: &str = "betCount";

    /// `bets(uint) returns (uint index, address player, uint amount, bool playerReadyToRace)`
    pub const BETS: &str = "bets";

    /// `playersReadyToRace() returns (uint)`
    pub const PLAYERS_READY_TO_RACE: &str = "playersReadyToRace";

    /// `raceFinished() returns (bool)`
    pub const RACE_FINISHED: &str = "raceFinished";

    /// `jackpot() returns (uint)`
    pub const JACKPOT: &str = "jackpot";

    /// `winnerHorse() returns (uint)`
    pub const WINNER_HORSE: &str = "winnerHorse";

    /// `placeBet(uint horse, uint amount)`
    pub const PLACE_BET: &str = "placeBet";

    /// `playerReadyToRace()`
    pub const PLAYER_READY_TO_RACE: &str = "playerReadyToRace";
}

/// Contract events watched by the adapter
pub mod events {
    pub const BET_PLACED: &str = "betPlaced";
    pub const PLAYERS_READY_TO_RACE_CHANGED: &str = "playersReadyToRaceChanged";
    pub const FINISHED_RACE: &str = "finishedRace";
}

/// Status messages reported through the connect status callback
pub mod status {
    pub const CONNECTED: &str = "Connection successful";
    pub const ALREADY_DEPLOYED: &str = "Contract already deployed";
    pub const DEPLOYING: &str = "Deploying contract...";
    pub const DEPLOYED: &str = "Contract successfully deployed";
    /// Followed by the contract address
    pub const ATTACHED_PREFIX: &str = "Using contract at address ";
}

/// Environment variables read by [`crate::RacecourseConfig::apply_env_overrides`]
pub mod env_vars {
    /// JSON-RPC endpoint of the signing wallet service
    pub const RPC_URL: &str = "SIGNER_URL";
    pub const RPC_USER: &str = "RPC_USER";
    pub const RPC_PASSWORD: &str = "RPC_PASSWORD";
    /// Address of an already deployed Race contract
    pub const CONTRACT_ADDRESS: &str = "CONTRACT_ADDRESS";
    pub const ABI_PATH: &str = "RACE_ABI_PATH";
    pub const BIN_PATH: &str = "RACE_BIN_PATH";
}

/// Gas limit for deployment and every contract transaction
pub const DEFAULT_GAS_LIMIT: u64 = 5_000_000;

/// Private test networks run with free gas
pub const DEFAULT_GAS_PRICE: u64 = 0;

/// How long deployment/attachment may take before giving up
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 60_000;

/// Delay before the follow-up transaction that forces a block to be mined
pub const DEFAULT_FORCE_MINING_DELAY_MS: u64 = 1_000;

/// Filter polling interval for event watches
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_ABI_PATH: &str = "../contracts/Race.abi";
pub const DEFAULT_BIN_PATH: &str = "../contracts/Race.bin";
