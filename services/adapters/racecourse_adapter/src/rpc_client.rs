//! JSON-RPC implementation of the chain seams
//!
//! Talks to the node over HTTP with ethers. The node signs transactions for
//! its own unlocked accounts (`eth_sendTransaction`), so no wallet is held here.
//! Event watches poll `eth_getFilterChanges`; a poll failure is delivered on
//! the stream as an error item and polling continues.

use async_trait::async_trait;
use ethers::abi::{Detokenize, Tokenize};
use ethers::contract::{Contract, ContractCall};
use ethers::providers::{
    Authorization, FilterKind, Http, JsonRpcClient, Middleware, PendingTransaction, Provider,
};
use ethers::types::{
    Address, BlockNumber, Filter, Log, TransactionRequest, TxHash, U256, U64,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::artifacts::ContractArtifacts;
use crate::chain::{BetRecord, ChainNode, EventLog, EventStream, HorseRecord, RaceContract, RaceEvent};
use crate::config::RacecourseConfig;
use crate::constants::entry_points;
use crate::error::{AdapterError, ChainError, ChainResult, Result};

/// Buffered notifications per watch before the poller waits on the consumer
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Gas and polling settings applied to every transaction and watch
#[derive(Debug, Clone, Copy)]
pub struct TxSettings {
    pub gas_limit: u64,
    pub gas_price: u64,
    pub poll_interval: Duration,
}

impl From<&RacecourseConfig> for TxSettings {
    fn from(config: &RacecourseConfig) -> Self {
        Self {
            gas_limit: config.gas_limit,
            gas_price: config.gas_price,
            poll_interval: config.poll_interval(),
        }
    }
}

/// Chain node reached over HTTP JSON-RPC
pub struct EthersNode {
    endpoint: String,
    provider: Arc<Provider<Http>>,
    artifacts: ContractArtifacts,
    settings: TxSettings,
}

impl EthersNode {
    /// Create the HTTP provider; no request is made until the first call
    pub fn new(config: &RacecourseConfig, artifacts: ContractArtifacts) -> Result<Self> {
        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| AdapterError::Configuration(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?;

        let transport = match &config.rpc_user {
            Some(user) => {
                let password = config.rpc_password.clone().unwrap_or_default();
                Http::new_with_auth(url, Authorization::basic(user, password)).map_err(|e| {
                    AdapterError::Configuration(format!("Invalid RPC credentials: {}", e))
                })?
            }
            None => Http::new(url),
        };

        let settings = TxSettings::from(config);
        let provider = Provider::new(transport).interval(settings.poll_interval);

        Ok(Self {
            endpoint: config.rpc_url.clone(),
            provider: Arc::new(provider),
            artifacts,
            settings,
        })
    }

    fn bind(&self, address: Address) -> EthersRaceContract {
        EthersRaceContract {
            contract: Contract::new(address, self.artifacts.abi.clone(), self.provider.clone()),
            provider: self.provider.clone(),
            settings: self.settings,
        }
    }
}

#[async_trait]
impl ChainNode for EthersNode {
    type Contract = EthersRaceContract;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn check_connection(&self) -> ChainResult<()> {
        let block = self.provider.get_block_number().await?;
        debug!("Node at {} is at block {}", self.endpoint, block);
        Ok(())
    }

    async fn accounts(&self) -> ChainResult<Vec<Address>> {
        Ok(self.provider.get_accounts().await?)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn submit_deployment(&self, from: Address) -> ChainResult<TxHash> {
        let tx = TransactionRequest::new()
            .from(from)
            .data(self.artifacts.bytecode.clone())
            .gas(self.settings.gas_limit)
            .gas_price(self.settings.gas_price);

        let pending = self.provider.send_transaction(tx, None).await?;
        let tx_hash = *pending;
        info!("📤 Deployment transaction submitted: {:?}", tx_hash);
        Ok(tx_hash)
    }

    async fn deployed_contract(&self, tx_hash: TxHash) -> ChainResult<Self::Contract> {
        let receipt = PendingTransaction::new(tx_hash, &*self.provider)
            .interval(self.settings.poll_interval)
            .await?
            .ok_or(ChainError::MissingReceipt(tx_hash))?;

        if receipt.status == Some(U64::zero()) {
            return Err(ChainError::Contract(format!(
                "deployment transaction {:?} reverted",
                tx_hash
            )));
        }

        let address = receipt
            .contract_address
            .ok_or(ChainError::MissingContractAddress(tx_hash))?;

        Ok(self.bind(address))
    }

    async fn attach(&self, address: Address) -> ChainResult<Self::Contract> {
        let code = self.provider.get_code(address, None).await?;
        if code.is_empty() {
            return Err(ChainError::NoCode(address));
        }
        Ok(self.bind(address))
    }

    async fn send_noop(&self, from: Address) -> ChainResult<TxHash> {
        let tx = TransactionRequest::new()
            .from(from)
            .to(from)
            .value(0u64)
            .gas(self.settings.gas_limit)
            .gas_price(self.settings.gas_price);

        let pending = self.provider.send_transaction(tx, None).await?;
        Ok(*pending)
    }
}

/// Race contract bound through ethers' dynamic ABI contract
pub struct EthersRaceContract {
    contract: Contract<Provider<Http>>,
    provider: Arc<Provider<Http>>,
    settings: TxSettings,
}

impl EthersRaceContract {
    async fn query<T, D>(&self, name: &str, args: T) -> ChainResult<D>
    where
        T: Tokenize + Send,
        D: Detokenize + Send,
    {
        self.contract
            .method::<T, D>(name, args)
            .map_err(contract_error)?
            .call()
            .await
            .map_err(contract_error)
    }

    fn transaction<T: Tokenize>(
        &self,
        name: &str,
        args: T,
        from: Address,
    ) -> ChainResult<ContractCall<Provider<Http>, ()>> {
        Ok(self
            .contract
            .method::<T, ()>(name, args)
            .map_err(contract_error)?
            .legacy()
            .from(from)
            .gas(self.settings.gas_limit)
            .gas_price(self.settings.gas_price))
    }

    async fn submit(call: ContractCall<Provider<Http>, ()>) -> ChainResult<TxHash> {
        let pending = call.send().await.map_err(contract_error)?;
        Ok(pending.tx_hash())
    }
}

#[async_trait]
impl RaceContract for EthersRaceContract {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn horse_count(&self) -> ChainResult<U256> {
        self.query(entry_points::HORSE_COUNT, ()).await
    }

    async fn horse(&self, index: U256) -> ChainResult<HorseRecord> {
        let (index, name): (U256, String) = self.query(entry_points::HORSES, index).await?;
        Ok(HorseRecord { index, name })
    }

    async fn bet_count(&self) -> ChainResult<U256> {
        self.query(entry_points::BET_COUNT, ()).await
    }

    async fn bet(&self, index: U256) -> ChainResult<BetRecord> {
        let (index, player, amount, player_ready_to_race): (U256, Address, U256, bool) =
            self.query(entry_points::BETS, index).await?;
        Ok(BetRecord {
            index,
            player,
            amount,
            player_ready_to_race,
        })
    }

    async fn players_ready_to_race(&self) -> ChainResult<U256> {
        self.query(entry_points::PLAYERS_READY_TO_RACE, ()).await
    }

    async fn race_finished(&self) -> ChainResult<bool> {
        self.query(entry_points::RACE_FINISHED, ()).await
    }

    async fn jackpot(&self) -> ChainResult<U256> {
        self.query(entry_points::JACKPOT, ()).await
    }

    async fn winner_horse(&self) -> ChainResult<U256> {
        self.query(entry_points::WINNER_HORSE, ()).await
    }

    async fn place_bet(&self, horse: U256, amount: U256, from: Address) -> ChainResult<TxHash> {
        let call = self.transaction(entry_points::PLACE_BET, (horse, amount), from)?;
        Self::submit(call).await
    }

    async fn player_ready_to_race(&self, from: Address) -> ChainResult<TxHash> {
        let call = self.transaction(entry_points::PLAYER_READY_TO_RACE, (), from)?;
        Self::submit(call).await
    }

    async fn watch(&self, event: RaceEvent) -> ChainResult<EventStream> {
        let signature = self.contract.abi().event(event.abi_name())?.signature();

        let filter = Filter::new()
            .address(self.contract.address())
            .topic0(signature)
            .from_block(BlockNumber::Latest);

        let filter_id = self.provider.new_filter(FilterKind::Logs(&filter)).await?;
        debug!("Installed {} filter {:?}", event, filter_id);

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        tokio::spawn(poll_filter(
            self.provider.clone(),
            filter_id,
            event,
            self.settings.poll_interval,
            tx,
        ));

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(stream.boxed())
    }
}

/// Poll filter changes until the consumer drops the stream, then uninstall the filter
async fn poll_filter<P: JsonRpcClient + 'static>(
    provider: Arc<Provider<P>>,
    filter_id: U256,
    event: RaceEvent,
    interval: Duration,
    tx: mpsc::Sender<ChainResult<EventLog>>,
) {
    let mut ticker = tokio::time::interval(interval);

    'poll: loop {
        tokio::select! {
            _ = tx.closed() => break 'poll,
            _ = ticker.tick() => {}
        }

        match provider.get_filter_changes::<_, Log>(filter_id).await {
            Ok(logs) => {
                for log in logs {
                    let item = EventLog {
                        event,
                        block_number: log.block_number.map(|n| n.as_u64()),
                        transaction_hash: log.transaction_hash,
                    };
                    if tx.send(Ok(item)).await.is_err() {
                        break 'poll;
                    }
                }
            }
            Err(e) => {
                if tx.send(Err(ChainError::from(e))).await.is_err() {
                    break 'poll;
                }
            }
        }
    }

    match provider.uninstall_filter(filter_id).await {
        Ok(_) => debug!("Uninstalled {} filter {:?}", event, filter_id),
        Err(e) => warn!("Failed to uninstall {} filter {:?}: {}", event, filter_id, e),
    }
}

fn contract_error<E: std::fmt::Display>(e: E) -> ChainError {
    ChainError::Contract(e.to_string())
}
