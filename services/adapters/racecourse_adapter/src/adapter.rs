//! Race Adapter Implementation
//!
//! Owns the node connection, the bound Race contract and the three event
//! watches. Built by [`RaceAdapter::connect`] (JSON-RPC node from config) or
//! [`RaceAdapter::with_node`] (any [`ChainNode`]).

use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::artifacts::ContractArtifacts;
use crate::chain::{count_to_u64, ChainNode, RaceContract, RaceEvent, TxHandle};
use crate::config::{is_contract_address, RacecourseConfig};
use crate::constants::{entry_points, status};
use crate::error::{AdapterError, ChainError, ChainResult, Result};
use crate::rpc_client::EthersNode;
use crate::state::{Bet, ContractState, Horse};
use crate::subscription::{EventCallback, EventSubscription};

/// Client adapter for one Race contract instance
pub struct RaceAdapter<N: ChainNode = EthersNode> {
    node: Arc<N>,
    contract: N::Contract,
    skip_block: Option<u64>,
    subscriptions: Vec<EventSubscription>,
}

impl RaceAdapter<EthersNode> {
    /// Connect to the configured JSON-RPC node, then deploy or attach
    ///
    /// Loads the contract artifacts first; missing files fail before any
    /// network traffic.
    pub async fn connect<E, S>(config: &RacecourseConfig, on_event: E, on_status: S) -> Result<Self>
    where
        E: Fn(&str) + Send + Sync + 'static,
        S: Fn(&str) + Send + Sync,
    {
        if let Some(address) = config.contract_address.as_deref() {
            parse_contract_address(address)?;
        }
        config
            .validate()
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;

        let artifacts = ContractArtifacts::load(&config.abi_path, &config.bin_path)?;
        let node = EthersNode::new(config, artifacts)?;

        Self::with_node(node, config, on_event, on_status).await
    }
}

impl<N: ChainNode> RaceAdapter<N> {
    /// Run the connect sequence against `node`
    ///
    /// 1. check the node is reachable (`on_status` is not called on failure)
    /// 2. attach to `config.contract_address`, or deploy a new contract
    /// 3. record the current block as the skip marker
    /// 4. start the three event watches; setup failures leave none running
    pub async fn with_node<E, S>(
        node: N,
        config: &RacecourseConfig,
        on_event: E,
        on_status: S,
    ) -> Result<Self>
    where
        E: Fn(&str) + Send + Sync + 'static,
        S: Fn(&str) + Send + Sync,
    {
        info!("🔗 Connecting to chain node: {}", node.endpoint());

        node.check_connection()
            .await
            .map_err(|e| AdapterError::ConnectionFailed {
                endpoint: node.endpoint().to_string(),
                reason: e.to_string(),
            })?;

        info!("✅ Connected to {}", node.endpoint());
        on_status(status::CONNECTED);

        let node = Arc::new(node);

        let contract = match config.contract_address.as_deref() {
            Some(address) => Self::attach(&node, address, config, &on_status).await?,
            None => Self::deploy(&node, config, &on_status).await?,
        };

        let skip_block = match node.block_number().await {
            Ok(block) => Some(block),
            Err(e) => {
                warn!("Could not read current block, no events will be skipped: {}", e);
                None
            }
        };

        let on_event: EventCallback = Arc::new(on_event);
        let subscriptions = Self::subscribe(&contract, skip_block, on_event).await;

        info!(
            "📡 Watching {} contract events from block {:?}",
            subscriptions.len(),
            skip_block
        );

        Ok(Self {
            node,
            contract,
            skip_block,
            subscriptions,
        })
    }

    async fn attach<S>(
        node: &Arc<N>,
        address: &str,
        config: &RacecourseConfig,
        on_status: &S,
    ) -> Result<N::Contract>
    where
        S: Fn(&str) + Send + Sync,
    {
        on_status(status::ALREADY_DEPLOYED);

        let parsed = parse_contract_address(address)?;

        let contract = timeout(config.sync_timeout(), node.attach(parsed))
            .await
            .map_err(|_| AdapterError::SyncTimeout {
                timeout_ms: config.sync_timeout_ms,
            })?
            .map_err(|e| {
                warn!("Attach to {} failed: {}", address, e);
                AdapterError::ContractNotFound {
                    address: address.to_string(),
                }
            })?;

        info!("✅ Using contract at {:?}", contract.address());
        on_status(&format!("{}{}", status::ATTACHED_PREFIX, address));

        Ok(contract)
    }

    async fn deploy<S>(node: &Arc<N>, config: &RacecourseConfig, on_status: &S) -> Result<N::Contract>
    where
        S: Fn(&str) + Send + Sync,
    {
        on_status(status::DEPLOYING);

        let accounts = node.accounts().await.map_err(AdapterError::DeploymentFailed)?;
        let from = *accounts
            .first()
            .ok_or(AdapterError::DeploymentFailed(ChainError::NoAccounts))?;

        info!("🚀 Deploying Race contract from {:?}", from);

        let deployment = async {
            let tx_hash = node.submit_deployment(from).await?;
            if config.force_mining {
                Self::spawn_force_mining(node.clone(), from, config);
            }
            let contract = node.deployed_contract(tx_hash).await?;
            Ok::<_, ChainError>(contract)
        };

        let contract = timeout(config.sync_timeout(), deployment)
            .await
            .map_err(|_| AdapterError::SyncTimeout {
                timeout_ms: config.sync_timeout_ms,
            })?
            .map_err(AdapterError::DeploymentFailed)?;

        info!("✅ Contract deployed at {:?}", contract.address());
        on_status(status::DEPLOYED);

        Ok(contract)
    }

    /// Some dev nodes only mine when a transaction is pending; a second
    /// transaction shortly after the submitted deployment gets it mined.
    fn spawn_force_mining(node: Arc<N>, from: Address, config: &RacecourseConfig) {
        let delay = config.force_mining_delay();
        tokio::spawn(async move {
            sleep(delay).await;
            match node.send_noop(from).await {
                Ok(hash) => debug!("⛏️ Sent block-mining transaction {:?}", hash),
                Err(e) => warn!("Block-mining transaction failed: {}", e),
            }
        });
    }

    async fn subscribe(
        contract: &N::Contract,
        skip_block: Option<u64>,
        on_event: EventCallback,
    ) -> Vec<EventSubscription> {
        let mut subscriptions = Vec::with_capacity(RaceEvent::ALL.len());

        for event in RaceEvent::ALL {
            match contract.watch(event).await {
                Ok(stream) => subscriptions.push(EventSubscription::spawn(
                    event,
                    stream,
                    skip_block,
                    on_event.clone(),
                )),
                Err(source) => {
                    let err = AdapterError::SubscriptionSetup {
                        event: event.abi_name(),
                        source,
                    };
                    warn!("⚠️ Warning: {}", err);
                    // Dropping the started watches stops them
                    return Vec::new();
                }
            }
        }

        subscriptions
    }

    /// Read the full race state with one call per field, in order
    ///
    /// Any failed read aborts the whole snapshot.
    pub async fn get_state(&self) -> Result<ContractState> {
        let result = self.read_state().await;
        if let Err(e) = &result {
            error!("❌ {}", e);
        }
        result
    }

    async fn read_state(&self) -> Result<ContractState> {
        let contract = &self.contract;

        let horse_count = read(entry_points::HORSE_COUNT, contract.horse_count().await)?;
        let horse_count = read(
            entry_points::HORSE_COUNT,
            count_to_u64(horse_count, entry_points::HORSE_COUNT),
        )?;
        let mut horses = Vec::new();
        for i in 0..horse_count {
            let horse = read(entry_points::HORSES, contract.horse(U256::from(i)).await)?;
            horses.push(Horse::from(horse));
        }

        let bet_count = read(entry_points::BET_COUNT, contract.bet_count().await)?;
        let bet_count = read(
            entry_points::BET_COUNT,
            count_to_u64(bet_count, entry_points::BET_COUNT),
        )?;
        let mut bets = Vec::new();
        for i in 0..bet_count {
            let bet = read(entry_points::BETS, contract.bet(U256::from(i)).await)?;
            bets.push(Bet::from(bet));
        }

        let players_ready_to_race = read(
            entry_points::PLAYERS_READY_TO_RACE,
            contract.players_ready_to_race().await,
        )?;
        let race_finished = read(entry_points::RACE_FINISHED, contract.race_finished().await)?;
        let jackpot = read(entry_points::JACKPOT, contract.jackpot().await)?;
        let winner_horse = read(entry_points::WINNER_HORSE, contract.winner_horse().await)?;

        Ok(ContractState {
            horses,
            bets,
            players_ready_to_race: players_ready_to_race.to_string(),
            race_finished,
            jackpot: jackpot.to_string(),
            winner_horse: winner_horse.to_string(),
        })
    }

    /// Submit a bet of `amount` (decimal string) on horse `horse_index`
    ///
    /// Returns once the node accepted the transaction; confirmation is not awaited.
    pub async fn place_bet(
        &self,
        horse_index: u64,
        amount: &str,
        account: Address,
    ) -> Result<TxHandle> {
        let amount_value = parse_amount(amount)?;

        let hash = self
            .contract
            .place_bet(U256::from(horse_index), amount_value, account)
            .await
            .map_err(|source| AdapterError::WriteFailed {
                entry_point: entry_points::PLACE_BET,
                source,
            })?;

        info!(
            "🎲 Bet of {} on horse {} from {:?} submitted: {:?}",
            amount, horse_index, account, hash
        );
        Ok(TxHandle { hash })
    }

    /// Mark `account` ready to race; confirmation is not awaited
    pub async fn player_ready_to_race(&self, account: Address) -> Result<TxHandle> {
        let hash = self
            .contract
            .player_ready_to_race(account)
            .await
            .map_err(|source| AdapterError::WriteFailed {
                entry_point: entry_points::PLAYER_READY_TO_RACE,
                source,
            })?;

        info!("🏁 {:?} ready to race: {:?}", account, hash);
        Ok(TxHandle { hash })
    }

    /// Stop all event watches. Calling it again is a no-op.
    pub fn stop_watching(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }

        let count = self.subscriptions.len();
        for mut subscription in self.subscriptions.drain(..) {
            subscription.stop();
        }
        info!("⏹️ Stopped {} event watches", count);
    }

    /// Accounts managed by the node
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        self.node
            .accounts()
            .await
            .map_err(|source| AdapterError::ReadFailed {
                entry_point: "eth_accounts",
                source,
            })
    }

    pub fn contract_address(&self) -> Address {
        self.contract.address()
    }

    /// Block whose events are not reported (current block at connect time)
    pub fn skip_block(&self) -> Option<u64> {
        self.skip_block
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }
}

fn read<T>(entry_point: &'static str, result: ChainResult<T>) -> Result<T> {
    result.map_err(|source| AdapterError::ReadFailed {
        entry_point,
        source,
    })
}

/// `0x`-prefixed, 40 hex digits
fn parse_contract_address(address: &str) -> Result<Address> {
    if !is_contract_address(address) {
        return Err(AdapterError::InvalidAddress(address.to_string()));
    }
    address
        .parse()
        .map_err(|_| AdapterError::InvalidAddress(address.to_string()))
}

fn parse_amount(amount: &str) -> Result<U256> {
    let digits = amount.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AdapterError::InvalidAmount(amount.to_string()));
    }
    U256::from_dec_str(digits).map_err(|_| AdapterError::InvalidAmount(amount.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("100").unwrap(), U256::from(100u64));
        assert_eq!(
            parse_amount("1000000000000000000000").unwrap(),
            U256::exp10(21)
        );
        assert!(parse_amount("").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("1.5").is_err());
        assert!(parse_amount("0x10").is_err());
        // 2^256 overflows
        assert!(parse_amount(
            "115792089237316195423570985008687907853269984665640564039457584007913129639936"
        )
        .is_err());
    }

    #[test]
    fn test_parse_contract_address() {
        assert_eq!(
            parse_contract_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap(),
            Address::from_slice(&hex::decode("5fbdb2315678afecb367f032d93f642f64180aa3").unwrap())
        );
        for bad in [
            "0x1234",
            "5FbDB2315678afecb367f032d93F642f64180aa3",
            "0xZZbDB2315678afecb367f032d93F642f64180aa3",
        ] {
            assert!(matches!(
                parse_contract_address(bad),
                Err(AdapterError::InvalidAddress(_))
            ));
        }
    }
}
