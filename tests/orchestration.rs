//! End-to-end runs of the orchestration handlers against the in-memory store,
//! a recording push channel and a dispatcher whose tasks the test runs by hand.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;
use word_derby_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, memory::MemoryGameStore},
        models::{GameEntity, PendingSlotEntity, PlayerEntity},
        storage::{Conditional, StorageResult},
        words::WordDictionary,
    },
    dto::ws::NewPlayer,
    services::{
        dispatcher::{DispatchError, Task, TaskDispatcher},
        game_service::GameService,
        notifier::{Notifier, PushChannel, PushError},
    },
    state::state_machine::GameState,
};

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingChannel {
    fn messages_for(&self, connection_id: &str) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == connection_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Variant names of every message pushed to `connection_id`, in order.
    fn kinds_for(&self, connection_id: &str) -> Vec<String> {
        self.messages_for(connection_id)
            .iter()
            .filter_map(|message| message.as_object()?.keys().next().cloned())
            .collect()
    }

    fn count_for(&self, connection_id: &str, kind: &str) -> usize {
        self.kinds_for(connection_id)
            .iter()
            .filter(|sent| sent.as_str() == kind)
            .count()
    }

    fn last_of(&self, connection_id: &str, kind: &str) -> Option<Value> {
        self.messages_for(connection_id)
            .into_iter()
            .rev()
            .find_map(|message| message.get(kind).cloned())
    }
}

impl PushChannel for RecordingChannel {
    fn send(
        &self,
        connection_id: String,
        payload: Arc<str>,
    ) -> BoxFuture<'static, Result<(), PushError>> {
        let message = serde_json::from_str(&payload).expect("outbound payload is JSON");
        self.sent.lock().unwrap().push((connection_id, message));
        Box::pin(async { Ok(()) })
    }
}

#[derive(Default)]
struct ManualDispatcher {
    scheduled: Mutex<Vec<(Task, Duration)>>,
}

impl ManualDispatcher {
    fn take(&self) -> Vec<(Task, Duration)> {
        std::mem::take(&mut *self.scheduled.lock().unwrap())
    }
}

impl TaskDispatcher for ManualDispatcher {
    fn dispatch(&self, task: Task, delay: Duration) -> Result<(), DispatchError> {
        self.scheduled.lock().unwrap().push((task, delay));
        Ok(())
    }
}

/// Store whose first slot release lets player "b" slip into the lobby being
/// abandoned, optionally letting a fresh lobby take the slot as well.
#[derive(Clone)]
struct RefillOnRelease {
    inner: MemoryGameStore,
    armed: Arc<AtomicBool>,
    steal_slot: bool,
}

impl RefillOnRelease {
    fn new(inner: MemoryGameStore, steal_slot: bool) -> Self {
        Self {
            inner,
            armed: Arc::new(AtomicBool::new(true)),
            steal_slot,
        }
    }
}

impl GameStore for RefillOnRelease {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        self.inner.find_game(id)
    }
    fn insert_game(
        &self,
        game: GameEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>> {
        self.inner.insert_game(game)
    }
    fn update_game(
        &self,
        game: GameEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>> {
        self.inner.update_game(game)
    }
    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.delete_game(id)
    }
    fn find_player(
        &self,
        connection_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        self.inner.find_player(connection_id)
    }
    fn insert_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>> {
        self.inner.insert_player(player)
    }
    fn update_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>> {
        self.inner.update_player(player)
    }
    fn delete_player(&self, connection_id: String) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.delete_player(connection_id)
    }
    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        self.inner.list_players(game_id)
    }
    fn find_pending_slot(&self) -> BoxFuture<'static, StorageResult<Option<PendingSlotEntity>>> {
        self.inner.find_pending_slot()
    }
    fn claim_pending_slot(
        &self,
        slot: PendingSlotEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PendingSlotEntity>>> {
        self.inner.claim_pending_slot(slot)
    }
    fn release_pending_slot(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Conditional<()>>> {
        let inner = self.inner.clone();
        let refill = self.armed.swap(false, Ordering::SeqCst);
        let steal_slot = self.steal_slot;
        Box::pin(async move {
            if refill {
                if let Some(game) = inner.find_game(game_id).await? {
                    let intruder = PlayerEntity::joining(
                        "b".into(),
                        &game,
                        "Bob".into(),
                        "Bob-icon".into(),
                        Duration::from_secs(60),
                    );
                    inner.insert_player(intruder).await?;
                }
            }
            let released = inner.release_pending_slot(game_id).await?;
            if refill && steal_slot {
                let other = GameEntity::new_pending(&AppConfig::default().game);
                inner
                    .claim_pending_slot(PendingSlotEntity {
                        game: other.clone(),
                        claimed_at: SystemTime::now(),
                    })
                    .await?;
                inner.insert_game(other).await?;
            }
            Ok(released)
        })
    }
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

struct Harness {
    service: Arc<GameService>,
    store: MemoryGameStore,
    channel: Arc<RecordingChannel>,
    dispatcher: Arc<ManualDispatcher>,
}

impl Harness {
    fn new(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let store = MemoryGameStore::new();
        Self::over(store.clone(), Arc::new(store), configure)
    }

    /// Build the service over `backend`, inspecting state through `store`.
    fn over(
        store: MemoryGameStore,
        backend: Arc<dyn GameStore>,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let mut config = AppConfig::default();
        configure(&mut config);

        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = Arc::new(ManualDispatcher::default());
        let service = GameService::new(
            backend,
            Notifier::new(channel.clone(), 4),
            dispatcher.clone(),
            Arc::new(WordDictionary::builtin()),
            Arc::new(config),
        );

        Self {
            service: Arc::new(service),
            store,
            channel,
            dispatcher,
        }
    }

    fn with_max_players(max: u32) -> Self {
        Self::new(|config| config.game.max_player_count = max)
    }

    async fn join(&self, connection_id: &str, name: &str) {
        self.service
            .join(
                connection_id,
                NewPlayer {
                    name: name.into(),
                    icon: format!("{name}-icon"),
                },
            )
            .await
            .unwrap();
    }

    async fn player(&self, connection_id: &str) -> Option<PlayerEntity> {
        self.store.find_player(connection_id.into()).await.unwrap()
    }

    async fn game_of(&self, connection_id: &str) -> GameEntity {
        let player = self.player(connection_id).await.expect("player exists");
        self.game(player.game_id).await.expect("game exists")
    }

    async fn game(&self, game_id: Uuid) -> Option<GameEntity> {
        self.store.find_game(game_id).await.unwrap()
    }

    /// Answer the open round `after` its start.
    async fn answer(&self, connection_id: &str, correct: bool, after: Duration) {
        let game = self.game_of(connection_id).await;
        let correct_index = game.correct_answer_index.expect("question asked");
        let response = if correct {
            correct_index
        } else {
            (correct_index + 1) % game.options_per_question
        };
        let received = game.round_start_time.expect("round started") + after;
        self.service
            .record_response(connection_id, response, received)
            .await
            .unwrap();
    }

    async fn run_next(&self, wanted: fn(&Task) -> bool) {
        let task = self
            .dispatcher
            .take()
            .into_iter()
            .map(|(task, _)| task)
            .find(|task| wanted(task))
            .expect("task was scheduled");
        self.service.handle_task(task).await.unwrap();
    }

    async fn run_round(&self) {
        self.run_next(|task| matches!(task, Task::DoRound(_))).await;
    }
}

#[tokio::test]
async fn first_joiner_is_welcomed_and_autostart_is_scheduled() {
    let harness = Harness::with_max_players(5);
    harness.join("a", "Ada").await;

    let game = harness.game_of("a").await;
    assert_eq!(game.state, GameState::Pending);
    assert_eq!(harness.channel.kinds_for("a"), ["Welcome", "RoundSummary"]);

    let welcome = harness.channel.last_of("a", "Welcome").unwrap();
    assert_eq!(welcome["TargetScore"], 500);
    assert!(welcome["SecondsTillStart"].as_u64().unwrap() <= 30);

    let scheduled = harness.dispatcher.take();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].0, Task::StartGame(game.id));
    assert!(scheduled[0].1 <= Duration::from_secs(30));
}

#[tokio::test]
async fn later_joiners_share_the_lobby_and_see_the_roster() {
    let harness = Harness::with_max_players(5);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;

    let first = harness.game_of("a").await;
    let second = harness.game_of("b").await;
    assert_eq!(first.id, second.id);

    let summary = harness.channel.last_of("a", "RoundSummary").unwrap();
    let names: Vec<_> = summary["PlayerStates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|state| state["Name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Ada", "Bob"]);
}

#[tokio::test]
async fn full_roster_starts_once_despite_duplicate_triggers() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;

    let game = harness.game_of("a").await;
    assert_eq!(game.state, GameState::InProgress);
    assert!(game.expires_at.is_some());
    assert!(harness.store.find_pending_slot().await.unwrap().is_none());

    // Redelivered join and the autostart timer firing late are both no-ops.
    harness.join("b", "Bob").await;
    harness
        .service
        .handle_task(Task::StartGame(game.id))
        .await
        .unwrap();

    assert_eq!(harness.channel.count_for("a", "AboutToStart"), 1);
    assert_eq!(harness.channel.count_for("b", "AboutToStart"), 1);
    assert_eq!(harness.channel.count_for("b", "Welcome"), 1);

    let scheduled = harness.dispatcher.take();
    let rounds = scheduled
        .iter()
        .filter(|(task, _)| *task == Task::DoRound(game.id))
        .count();
    assert_eq!(rounds, 1);
}

#[tokio::test]
async fn next_joiner_after_start_opens_a_new_lobby() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.join("c", "Cy").await;

    let running = harness.game_of("a").await;
    let lobby = harness.game_of("c").await;
    assert_ne!(running.id, lobby.id);
    assert_eq!(lobby.state, GameState::Pending);
}

#[tokio::test]
async fn correct_answer_after_two_seconds_scores_140() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.run_round().await;

    let question = harness.channel.last_of("a", "PresentQuestion").unwrap();
    assert_eq!(question["Definitions"].as_array().unwrap().len(), 3);
    assert_eq!(question["SecondsAllowed"], 10);

    harness.answer("a", true, Duration::from_secs(2)).await;

    assert_eq!(harness.player("a").await.unwrap().points, 140);
    let result = harness.channel.last_of("a", "PlayerResult").unwrap();
    assert_eq!(result["Correct"], true);

    // Bob has not answered yet, so the round stays open.
    assert!(harness.game_of("a").await.awaiting_answers);
}

#[tokio::test]
async fn wrong_answer_earns_only_the_time_bonus() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.run_round().await;

    harness.answer("a", false, Duration::from_secs(5)).await;

    assert_eq!(harness.player("a").await.unwrap().points, 25);
    let result = harness.channel.last_of("a", "PlayerResult").unwrap();
    assert_eq!(result["Correct"], false);
}

#[tokio::test]
async fn duplicate_response_is_scored_once() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.run_round().await;

    harness.answer("a", true, Duration::from_secs(2)).await;
    harness.answer("a", true, Duration::from_secs(3)).await;

    assert_eq!(harness.player("a").await.unwrap().points, 140);
    assert_eq!(harness.channel.count_for("a", "PlayerResult"), 1);
}

#[tokio::test]
async fn out_of_range_response_is_rejected() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.run_round().await;

    let game = harness.game_of("a").await;
    let received = game.round_start_time.unwrap();
    let outcome = harness.service.record_response("a", 7, received).await;

    assert!(outcome.is_err());
    assert!(!harness.player("a").await.unwrap().responded);
}

#[tokio::test]
async fn round_waits_for_every_active_player() {
    let harness = Harness::with_max_players(3);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.join("c", "Cy").await;
    harness.run_round().await;

    harness.answer("a", true, Duration::from_secs(1)).await;
    harness.answer("b", false, Duration::from_secs(1)).await;

    let game = harness.game_of("a").await;
    assert!(game.awaiting_answers);
    assert!(harness.dispatcher.take().is_empty());

    harness.answer("c", true, Duration::from_secs(1)).await;

    let game = harness.game_of("a").await;
    assert!(!game.awaiting_answers);
    assert_eq!(
        harness.dispatcher.take(),
        [(Task::DoRound(game.id), Duration::from_secs(2))]
    );
    let summary = harness.channel.last_of("c", "RoundSummary").unwrap();
    assert_eq!(summary["PlayerStates"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn redelivered_round_task_does_not_reopen_the_round() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.run_round().await;
    harness.answer("a", true, Duration::from_secs(1)).await;

    let game = harness.game_of("a").await;
    harness
        .service
        .handle_task(Task::DoRound(game.id))
        .await
        .unwrap();

    let after = harness.game_of("a").await;
    assert_eq!(after.round, game.round);
    assert_eq!(after.correct_answer_index, game.correct_answer_index);
    assert!(harness.player("a").await.unwrap().responded);
    assert_eq!(harness.channel.count_for("a", "PresentQuestion"), 1);
}

#[tokio::test]
async fn lobby_disconnects_remove_players_and_drop_the_empty_game() {
    let harness = Harness::with_max_players(5);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    let lobby = harness.game_of("a").await;

    harness.service.disconnect("a").await.unwrap();
    assert!(harness.player("a").await.is_none());
    assert_eq!(harness.game(lobby.id).await.unwrap().state, GameState::Pending);
    let summary = harness.channel.last_of("b", "RoundSummary").unwrap();
    assert_eq!(summary["PlayerStates"].as_array().unwrap().len(), 1);

    harness.service.disconnect("b").await.unwrap();
    assert!(harness.game(lobby.id).await.is_none());
    assert!(harness.store.find_pending_slot().await.unwrap().is_none());

    harness.join("c", "Cy").await;
    assert_ne!(harness.game_of("c").await.id, lobby.id);
}

#[tokio::test]
async fn in_progress_disconnect_keeps_the_player_inactive() {
    let harness = Harness::with_max_players(2);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.run_round().await;
    harness.answer("b", true, Duration::from_secs(2)).await;
    let game = harness.game_of("a").await;

    harness.service.disconnect("b").await.unwrap();

    let bob = harness.player("b").await.unwrap();
    assert!(!bob.active);
    assert_eq!(bob.points, 140);
    assert_eq!(harness.game(game.id).await.unwrap().state, GameState::InProgress);

    harness.service.disconnect("a").await.unwrap();
    assert_eq!(harness.game(game.id).await.unwrap().state, GameState::Finished);
    assert_eq!(harness.channel.count_for("a", "Summary"), 0);
}

#[tokio::test]
async fn disconnect_of_the_last_unanswered_player_concludes_the_round() {
    let harness = Harness::with_max_players(3);
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.join("c", "Cy").await;
    harness.run_round().await;
    harness.answer("a", true, Duration::from_secs(1)).await;
    harness.answer("b", true, Duration::from_secs(1)).await;

    harness.service.disconnect("c").await.unwrap();

    let game = harness.game_of("a").await;
    assert!(!game.awaiting_answers);
    assert!(
        harness
            .dispatcher
            .take()
            .contains(&(Task::DoRound(game.id), Duration::from_secs(2)))
    );
}

#[tokio::test]
async fn reaching_the_target_score_announces_the_winner() {
    let harness = Harness::new(|config| {
        config.game.max_player_count = 2;
        config.game.target_score = 200;
    });
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;

    harness.run_round().await;
    harness.answer("a", true, Duration::ZERO).await;
    harness.answer("b", false, Duration::from_secs(9)).await;
    assert_eq!(harness.player("a").await.unwrap().points, 150);
    assert_eq!(harness.game_of("a").await.state, GameState::InProgress);

    harness.run_round().await;
    harness.answer("a", true, Duration::ZERO).await;
    harness.answer("b", true, Duration::ZERO).await;

    let game = harness.game_of("a").await;
    assert_eq!(game.state, GameState::Finished);
    for connection_id in ["a", "b"] {
        let summary = harness.channel.last_of(connection_id, "Summary").unwrap();
        assert_eq!(summary["Winner"], "Ada");
        assert_eq!(summary["Icon"], "Ada-icon");
    }
    assert!(harness.dispatcher.take().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_share_a_single_pending_game() {
    let harness = Harness::with_max_players(50);

    let joins = (0..20)
        .map(|index| {
            let service = harness.service.clone();
            tokio::spawn(async move {
                service
                    .join(
                        &format!("conn-{index}"),
                        NewPlayer {
                            name: format!("P{index}"),
                            icon: "horse".into(),
                        },
                    )
                    .await
            })
        })
        .collect::<Vec<_>>();
    for join in joins {
        join.await.unwrap().unwrap();
    }

    assert_eq!(harness.store.count_games_in_state(GameState::Pending), 1);
    let lobby = harness.game_of("conn-0").await;
    let roster = harness.store.list_players(lobby.id).await.unwrap();
    assert_eq!(roster.len(), 20);
}

#[tokio::test]
async fn lobby_refilled_while_abandoning_reclaims_the_pending_slot() {
    let store = MemoryGameStore::new();
    let harness = Harness::over(
        store.clone(),
        Arc::new(RefillOnRelease::new(store, false)),
        |config| config.game.max_player_count = 5,
    );
    harness.join("a", "Ada").await;
    let lobby = harness.game_of("a").await;
    harness.dispatcher.take();

    harness.service.disconnect("a").await.unwrap();
    harness.join("c", "Cy").await;

    assert_eq!(harness.store.count_games_in_state(GameState::Pending), 1);
    assert_eq!(harness.game_of("b").await.id, lobby.id);
    assert_eq!(harness.game_of("c").await.id, lobby.id);
    let slot = harness.store.find_pending_slot().await.unwrap().unwrap();
    assert_eq!(slot.game_id(), lobby.id);
    assert!(
        harness
            .dispatcher
            .take()
            .iter()
            .any(|(task, _)| *task == Task::StartGame(lobby.id))
    );
}

#[tokio::test]
async fn refilled_lobby_starts_when_another_lobby_holds_the_slot() {
    let store = MemoryGameStore::new();
    let harness = Harness::over(
        store.clone(),
        Arc::new(RefillOnRelease::new(store, true)),
        |config| config.game.max_player_count = 5,
    );
    harness.join("a", "Ada").await;
    let lobby = harness.game_of("a").await;

    harness.service.disconnect("a").await.unwrap();

    assert_eq!(harness.game(lobby.id).await.unwrap().state, GameState::InProgress);
    assert_eq!(harness.channel.count_for("b", "AboutToStart"), 1);
    assert_eq!(harness.store.count_games_in_state(GameState::Pending), 1);

    harness.join("c", "Cy").await;
    assert_eq!(harness.store.count_games_in_state(GameState::Pending), 1);
    assert_ne!(harness.game_of("c").await.id, lobby.id);
}

#[tokio::test]
async fn disconnect_after_the_game_finished_changes_nothing() {
    let harness = Harness::new(|config| {
        config.game.max_player_count = 2;
        config.game.target_score = 100;
    });
    harness.join("a", "Ada").await;
    harness.join("b", "Bob").await;
    harness.run_round().await;
    harness.answer("a", true, Duration::from_secs(2)).await;
    harness.answer("b", false, Duration::from_secs(2)).await;
    assert_eq!(harness.game_of("a").await.state, GameState::Finished);

    let before = harness.player("a").await.unwrap();
    let summaries = harness.channel.count_for("b", "RoundSummary");

    harness.service.disconnect("a").await.unwrap();

    assert_eq!(harness.player("a").await.unwrap(), before);
    assert_eq!(harness.channel.count_for("b", "RoundSummary"), summaries);
    assert!(harness.dispatcher.take().is_empty());
}

#[tokio::test]
async fn disconnect_of_an_unknown_connection_is_ignored() {
    let harness = Harness::with_max_players(5);
    harness.join("a", "Ada").await;
    let sent = harness.channel.kinds_for("a").len();
    harness.dispatcher.take();

    harness.service.disconnect("never-joined").await.unwrap();

    assert_eq!(harness.channel.kinds_for("a").len(), sent);
    assert!(harness.player("a").await.unwrap().active);
    assert_eq!(harness.store.count_games_in_state(GameState::Pending), 1);
    assert!(harness.dispatcher.take().is_empty());
}
