//! Tests for RaceAdapter against an in-memory chain node

use super::*;
use async_trait::async_trait;
use ethers::types::{Address, TxHash, H256, U256};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

const ENDPOINT: &str = "mock://node";
const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

#[derive(Default)]
struct MockState {
    unreachable: bool,
    accounts: Vec<Address>,
    block_number: u64,
    deployed: Vec<Address>,
    deploy_error: Option<String>,
    deploy_delay: Option<Duration>,
    noop_senders: Vec<Address>,
    submissions: Vec<&'static str>,

    horses: Vec<HorseRecord>,
    bets: Vec<BetRecord>,
    players_ready_to_race: U256,
    race_finished: bool,
    jackpot: U256,
    winner_horse: U256,
    fail_read: Option<&'static str>,
    reads: Vec<&'static str>,

    fail_write: bool,
    placed_bets: Vec<(U256, U256, Address)>,
    ready_players: Vec<Address>,
    tx_count: u64,

    fail_watch: Option<RaceEvent>,
    watchers: HashMap<RaceEvent, mpsc::UnboundedSender<ChainResult<EventLog>>>,
}

impl MockState {
    fn next_tx(&mut self) -> TxHash {
        self.tx_count += 1;
        H256::from_low_u64_be(self.tx_count)
    }
}

#[derive(Clone, Default)]
struct MockNode {
    state: Arc<Mutex<MockState>>,
}

impl MockNode {
    fn new() -> Self {
        let node = Self::default();
        {
            let mut state = node.state.lock();
            state.accounts = vec![Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)];
            state.block_number = 42;
            state.deployed.push(CONTRACT.parse().unwrap());
        }
        node
    }

    fn with_race(self) -> Self {
        {
            let mut state = self.state.lock();
            state.horses = vec![
                HorseRecord {
                    index: U256::zero(),
                    name: "Seabiscuit".to_string(),
                },
                HorseRecord {
                    index: U256::one(),
                    name: "Secretariat".to_string(),
                },
            ];
            state.bets = vec![BetRecord {
                index: U256::zero(),
                player: Address::repeat_byte(0xbb),
                amount: U256::from_dec_str("98765432109876543210").unwrap(),
                player_ready_to_race: true,
            }];
            state.players_ready_to_race = U256::one();
            state.jackpot = U256::from_dec_str("98765432109876543210").unwrap();
            state.winner_horse = U256::one();
            state.race_finished = true;
        }
        self
    }

    /// Deliver a log on the event's watch; false when nothing is listening
    fn emit(&self, event: RaceEvent, block: u64) -> bool {
        let state = self.state.lock();
        match state.watchers.get(&event) {
            Some(tx) => tx
                .send(Ok(EventLog {
                    event,
                    block_number: Some(block),
                    transaction_hash: None,
                }))
                .is_ok(),
            None => false,
        }
    }

    fn emit_error(&self, event: RaceEvent) -> bool {
        let state = self.state.lock();
        match state.watchers.get(&event) {
            Some(tx) => tx
                .send(Err(ChainError::Contract("filter not found".to_string())))
                .is_ok(),
            None => false,
        }
    }

    fn noop_count(&self) -> usize {
        self.state.lock().noop_senders.len()
    }
}

struct MockContract {
    address: Address,
    state: Arc<Mutex<MockState>>,
}

impl MockContract {
    fn read<T>(&self, name: &'static str, value: impl FnOnce(&MockState) -> T) -> ChainResult<T> {
        let mut state = self.state.lock();
        state.reads.push(name);
        if state.fail_read == Some(name) {
            return Err(ChainError::Contract("execution reverted".to_string()));
        }
        Ok(value(&state))
    }
}

#[async_trait]
impl ChainNode for MockNode {
    type Contract = MockContract;

    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    async fn check_connection(&self) -> ChainResult<()> {
        if self.state.lock().unreachable {
            return Err(ChainError::Contract("connection refused".to_string()));
        }
        Ok(())
    }

    async fn accounts(&self) -> ChainResult<Vec<Address>> {
        Ok(self.state.lock().accounts.clone())
    }

    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.state.lock().block_number)
    }

    async fn submit_deployment(&self, _from: Address) -> ChainResult<TxHash> {
        let mut state = self.state.lock();
        state.submissions.push("deployment");
        Ok(state.next_tx())
    }

    async fn deployed_contract(&self, _tx_hash: TxHash) -> ChainResult<Self::Contract> {
        let delay = self.state.lock().deploy_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(reason) = &state.deploy_error {
            return Err(ChainError::Contract(reason.clone()));
        }
        let address = Address::repeat_byte(0xcc);
        state.deployed.push(address);
        Ok(MockContract {
            address,
            state: self.state.clone(),
        })
    }

    async fn attach(&self, address: Address) -> ChainResult<Self::Contract> {
        if !self.state.lock().deployed.contains(&address) {
            return Err(ChainError::NoCode(address));
        }
        Ok(MockContract {
            address,
            state: self.state.clone(),
        })
    }

    async fn send_noop(&self, from: Address) -> ChainResult<TxHash> {
        let mut state = self.state.lock();
        state.noop_senders.push(from);
        state.submissions.push("noop");
        Ok(state.next_tx())
    }
}

#[async_trait]
impl RaceContract for MockContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn horse_count(&self) -> ChainResult<U256> {
        self.read("horseCount", |s| U256::from(s.horses.len()))
    }

    async fn horse(&self, index: U256) -> ChainResult<HorseRecord> {
        self.read("horses", |s| s.horses[index.as_usize()].clone())
    }

    async fn bet_count(&self) -> ChainResult<U256> {
        self.read("betCount", |s| U256::from(s.bets.len()))
    }

    async fn bet(&self, index: U256) -> ChainResult<BetRecord> {
        self.read("bets", |s| s.bets[index.as_usize()].clone())
    }

    async fn players_ready_to_race(&self) -> ChainResult<U256> {
        self.read("playersReadyToRace", |s| s.players_ready_to_race)
    }

    async fn race_finished(&self) -> ChainResult<bool> {
        self.read("raceFinished", |s| s.race_finished)
    }

    async fn jackpot(&self) -> ChainResult<U256> {
        self.read("jackpot", |s| s.jackpot)
    }

    async fn winner_horse(&self) -> ChainResult<U256> {
        self.read("winnerHorse", |s| s.winner_horse)
    }

    async fn place_bet(&self, horse: U256, amount: U256, from: Address) -> ChainResult<TxHash> {
        let mut state = self.state.lock();
        if state.fail_write {
            return Err(ChainError::Contract("execution reverted".to_string()));
        }
        state.placed_bets.push((horse, amount, from));
        Ok(state.next_tx())
    }

    async fn player_ready_to_race(&self, from: Address) -> ChainResult<TxHash> {
        let mut state = self.state.lock();
        if state.fail_write {
            return Err(ChainError::Contract("execution reverted".to_string()));
        }
        state.ready_players.push(from);
        Ok(state.next_tx())
    }

    async fn watch(&self, event: RaceEvent) -> ChainResult<EventStream> {
        let mut state = self.state.lock();
        if state.fail_watch == Some(event) {
            return Err(ChainError::Contract("eth_newFilter not supported".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.watchers.insert(event, tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

fn config(contract_address: Option<&str>) -> RacecourseConfig {
    RacecourseConfig {
        contract_address: contract_address.map(str::to_string),
        force_mining: false,
        force_mining_delay_ms: 0,
        ..Default::default()
    }
}

type Recorded = Arc<Mutex<Vec<String>>>;

fn status_recorder() -> (Recorded, impl Fn(&str) + Send + Sync) {
    let statuses: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    (statuses, move |status: &str| sink.lock().push(status.to_string()))
}

fn event_channel() -> (
    mpsc::UnboundedReceiver<String>,
    impl Fn(&str) + Send + Sync + 'static,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (rx, move |name: &str| {
        let _ = tx.send(name.to_string());
    })
}

fn connect_err<N: ChainNode>(result: Result<RaceAdapter<N>>) -> AdapterError {
    match result {
        Ok(_) => panic!("expected connect to fail"),
        Err(e) => e,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_attach_reports_status_and_subscribes() {
    let node = MockNode::new();
    let (statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    assert_eq!(
        *statuses.lock(),
        vec![
            "Connection successful".to_string(),
            "Contract already deployed".to_string(),
            format!("Using contract at address {}", CONTRACT),
        ]
    );
    assert_eq!(adapter.contract_address(), CONTRACT.parse::<Address>().unwrap());
    assert_eq!(adapter.skip_block(), Some(42));
    assert_eq!(adapter.active_subscriptions(), 3);
    assert_eq!(node.noop_count(), 0);
}

#[tokio::test]
async fn test_deploy_status_sequence() {
    let node = MockNode::new();
    let (statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(None), on_event, on_status).await
    );

    assert_eq!(
        *statuses.lock(),
        vec![
            "Connection successful",
            "Deploying contract...",
            "Contract successfully deployed"
        ]
    );
    assert_eq!(adapter.contract_address(), Address::repeat_byte(0xcc));

    // Deployed handle is usable
    let state = assert_ok!(adapter.get_state().await);
    assert!(state.horses.is_empty());
}

#[tokio::test]
async fn test_deploy_forces_block_from_first_account() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();
    let config = RacecourseConfig {
        force_mining: true,
        ..config(None)
    };

    let _adapter = assert_ok!(RaceAdapter::with_node(node.clone(), &config, on_event, on_status).await);

    tokio::time::timeout(Duration::from_secs(1), async {
        while node.noop_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("block-mining transaction was not sent");

    assert_eq!(node.state.lock().noop_senders, vec![Address::repeat_byte(0xaa)]);
    // Mining is only forced once the deployment is on its way
    assert_eq!(node.state.lock().submissions, vec!["deployment", "noop"]);
}

#[tokio::test]
async fn test_deploy_without_forced_mining() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let _adapter = assert_ok!(RaceAdapter::with_node(node.clone(), &config(None), on_event, on_status).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(node.noop_count(), 0);
}

#[tokio::test]
async fn test_unreachable_node_never_reports_status() {
    let node = MockNode::new();
    node.state.lock().unreachable = true;
    let (statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let err = connect_err(RaceAdapter::with_node(node, &config(None), on_event, on_status).await);

    match err {
        AdapterError::ConnectionFailed { endpoint, .. } => assert_eq!(endpoint, ENDPOINT),
        other => panic!("expected ConnectionFailed, got {:?}", other),
    }
    assert!(statuses.lock().is_empty());
}

#[tokio::test]
async fn test_attach_without_code_is_not_found() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();
    let missing = "0x0000000000000000000000000000000000000001";

    let err = connect_err(
        RaceAdapter::with_node(node, &config(Some(missing)), on_event, on_status).await
    );

    match err {
        AdapterError::ContractNotFound { address } => assert_eq!(address, missing),
        other => panic!("expected ContractNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_address_rejected() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let err = connect_err(
        RaceAdapter::with_node(node, &config(Some("0x1234")), on_event, on_status).await
    );
    assert!(matches!(err, AdapterError::InvalidAddress(_)));

    // Same error whichever entry point is used
    let unprefixed = "5fbdb2315678afecb367f032d93f642f64180aa3";
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();
    let err = connect_err(
        RaceAdapter::with_node(MockNode::new(), &config(Some(unprefixed)), on_event, on_status)
            .await,
    );
    assert!(matches!(err, AdapterError::InvalidAddress(_)));

    let err = connect_err(RaceAdapter::connect(&config(Some(unprefixed)), |_| {}, |_| {}).await);
    assert!(matches!(err, AdapterError::InvalidAddress(_)));
}

#[tokio::test]
async fn test_deployment_failures() {
    let node = MockNode::new();
    node.state.lock().deploy_error = Some("out of gas".to_string());
    let (statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let err = connect_err(RaceAdapter::with_node(node, &config(None), on_event, on_status).await);
    assert!(matches!(err, AdapterError::DeploymentFailed(_)));
    assert!(err.to_string().contains("out of gas"));
    assert!(!statuses.lock().iter().any(|s| s == "Contract successfully deployed"));

    let node = MockNode::new();
    node.state.lock().accounts.clear();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let err = connect_err(RaceAdapter::with_node(node, &config(None), on_event, on_status).await);
    assert!(matches!(
        err,
        AdapterError::DeploymentFailed(ChainError::NoAccounts)
    ));
}

#[tokio::test]
async fn test_deployment_sync_timeout() {
    let node = MockNode::new();
    node.state.lock().deploy_delay = Some(Duration::from_secs(5));
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();
    let config = RacecourseConfig {
        sync_timeout_ms: 20,
        ..config(None)
    };

    let err = connect_err(RaceAdapter::with_node(node, &config, on_event, on_status).await);
    assert!(matches!(err, AdapterError::SyncTimeout { timeout_ms: 20 }));
}

#[tokio::test]
async fn test_event_at_skip_block_is_suppressed() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (mut events, on_event) = event_channel();

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );
    let skip = adapter.skip_block().unwrap();

    assert!(node.emit(RaceEvent::BetPlaced, skip));
    assert!(node.emit(RaceEvent::BetPlaced, skip + 1));

    assert_eq!(next_event(&mut events).await.as_deref(), Some("Bet placed"));
    // The skip-block log was ahead of it on the same stream
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_each_event_kind_is_reported() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (mut events, on_event) = event_channel();

    let _adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    assert!(node.emit(RaceEvent::PlayersReadyToRaceChanged, 43));
    assert_eq!(
        next_event(&mut events).await.as_deref(),
        Some("Players ready to race changed")
    );

    assert!(node.emit(RaceEvent::RaceFinished, 44));
    assert_eq!(next_event(&mut events).await.as_deref(), Some("Finished race"));
}

#[tokio::test]
async fn test_watch_error_keeps_watching() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (mut events, on_event) = event_channel();

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    assert!(node.emit_error(RaceEvent::BetPlaced));
    assert!(node.emit(RaceEvent::BetPlaced, 50));

    assert_eq!(next_event(&mut events).await.as_deref(), Some("Bet placed"));
    assert_eq!(adapter.active_subscriptions(), 3);
}

#[tokio::test]
async fn test_subscription_setup_failure_is_not_fatal() {
    let node = MockNode::new();
    node.state.lock().fail_watch = Some(RaceEvent::PlayersReadyToRaceChanged);
    let (statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let adapter = assert_ok!(
        RaceAdapter::with_node(node, &config(Some(CONTRACT)), on_event, on_status).await
    );

    assert_eq!(adapter.active_subscriptions(), 0);
    assert_eq!(statuses.lock().len(), 3);
}

#[tokio::test]
async fn test_stop_watching_silences_events() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (mut events, on_event) = event_channel();

    let mut adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    adapter.stop_watching();
    assert_eq!(adapter.active_subscriptions(), 0);

    node.emit(RaceEvent::BetPlaced, 100);
    node.emit(RaceEvent::RaceFinished, 100);

    // The callback is only held by the watch tasks: once they are gone the
    // channel closes without delivering anything.
    assert_eq!(next_event(&mut events).await, None);

    // Idempotent
    adapter.stop_watching();
    assert_eq!(adapter.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_get_state_reads_in_order_with_full_precision() {
    let node = MockNode::new().with_race();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    let state = assert_ok!(adapter.get_state().await);

    assert_eq!(state.horses.len(), 2);
    assert_eq!(state.bets.len(), 1);
    assert_eq!(state.horses[1].index, "1");
    assert_eq!(state.horses[1].name, "Secretariat");
    assert_eq!(state.bets[0].amount, "98765432109876543210");
    assert_eq!(state.bets[0].player, Address::repeat_byte(0xbb));
    assert!(state.bets[0].player_ready_to_race);
    assert_eq!(state.players_ready_to_race, "1");
    assert!(state.race_finished);
    assert_eq!(state.jackpot, "98765432109876543210");
    assert_eq!(state.winner_horse, "1");

    assert_eq!(
        node.state.lock().reads,
        vec![
            "horseCount",
            "horses",
            "horses",
            "betCount",
            "bets",
            "playersReadyToRace",
            "raceFinished",
            "jackpot",
            "winnerHorse"
        ]
    );
}

#[tokio::test]
async fn test_get_state_aborts_on_read_failure() {
    let node = MockNode::new().with_race();
    node.state.lock().fail_read = Some("jackpot");
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    let err = assert_err!(adapter.get_state().await);
    assert!(matches!(
        err,
        AdapterError::ReadFailed {
            entry_point: "jackpot",
            ..
        }
    ));
    assert!(!node.state.lock().reads.contains(&"winnerHorse"));
}

#[tokio::test]
async fn test_place_bet_returns_pending_handle() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();
    let account = Address::repeat_byte(0xbb);

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    let handle = assert_ok!(adapter.place_bet(0, "100", account).await);
    assert_eq!(handle.hash, H256::from_low_u64_be(1));
    assert_eq!(
        node.state.lock().placed_bets,
        vec![(U256::zero(), U256::from(100u64), account)]
    );

    let err = assert_err!(adapter.place_bet(0, "ten", account).await);
    assert!(matches!(err, AdapterError::InvalidAmount(_)));
    assert_eq!(node.state.lock().placed_bets.len(), 1);
}

#[tokio::test]
async fn test_player_ready_and_write_failures() {
    let node = MockNode::new();
    let (_statuses, on_status) = status_recorder();
    let (_events, on_event) = event_channel();
    let account = Address::repeat_byte(0xaa);

    let adapter = assert_ok!(
        RaceAdapter::with_node(node.clone(), &config(Some(CONTRACT)), on_event, on_status).await
    );

    assert_ok!(adapter.player_ready_to_race(account).await);
    assert_eq!(node.state.lock().ready_players, vec![account]);

    node.state.lock().fail_write = true;
    let err = assert_err!(adapter.player_ready_to_race(account).await);
    match err {
        AdapterError::WriteFailed { entry_point, source } => {
            assert_eq!(entry_point, "playerReadyToRace");
            assert_eq!(source.to_string(), "contract error: execution reverted");
        }
        other => panic!("expected WriteFailed, got {:?}", other),
    }

    let err = assert_err!(adapter.place_bet(1, "5", account).await);
    assert!(err.is_chain_call());
}

#[tokio::test]
async fn test_connect_fails_without_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = RacecourseConfig {
        abi_path: dir.path().join("Race.abi"),
        bin_path: dir.path().join("Race.bin"),
        ..Default::default()
    };

    let err = connect_err(RaceAdapter::connect(&config, |_| {}, |_| {}).await);
    assert!(matches!(err, AdapterError::ArtifactNotFound { .. }));
}
