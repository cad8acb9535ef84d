#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-room tick orchestration and the multi-room directory.
//!
//! Every room runs as one cooperative tokio task that owns its
//! [`GameState`] outright: commands arrive through a mailbox, snapshots
//! leave through a broadcast channel, and nothing is shared across rooms
//! beyond the directory itself. The combat tick is driven by an explicit
//! two-phase scheduler: a single deadline alternates between the movement
//! phase and the resolve phase half an interval apart, so tearing the room
//! down simply drops the loop and with it whichever phase was pending.

use std::sync::Arc;
use std::time::Duration;

use castle_defence_core::{
    derive_seed, GameOverReport, PlayerName, RoomConfig, RoomId, SimulationError, StateSnapshot,
    UnitId, UnitSnapshot, UpgradeContext,
};
use castle_defence_system_battle as battle;
use castle_defence_system_movement as movement;
use castle_defence_system_wave_generation as waves;
use castle_defence_world::{query, GameState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{info, warn};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

/// Events broadcast to subscribers of one room.
#[derive(Clone, Debug)]
pub enum RoomEvent {
    /// The room left the lobby and its tickers are running.
    Started,
    /// Phase-1 snapshot: units moved and paired, damage not yet applied.
    Contact(StateSnapshot),
    /// Phase-2 snapshot taken after damage landed and the dead were purged.
    Resolved {
        /// Post-damage state of the room.
        snapshot: StateSnapshot,
        /// Units that died and were purged this tick.
        removed: Vec<UnitId>,
    },
    /// Enemies spawned by the wave countdown reaching zero.
    WaveSpawned(Vec<UnitSnapshot>),
    /// Every castle has fallen; the room is tearing down.
    GameOver(GameOverReport),
}

/// Commands accepted by a room's mailbox.
///
/// Commands are processed between tick phases, the only window in which
/// the host may mutate room state.
pub enum RoomCommand {
    /// Moves the room from the lobby into the running state.
    Start,
    /// Stops the room, cancelling every ticker it owns.
    Stop,
    /// Spawns a player unit in the owner's name.
    SpawnPlayerUnit {
        /// Lane row to spawn into.
        row: usize,
        /// Player paying for the unit.
        owner: PlayerName,
        /// Roster label of the unit subtype.
        label: String,
        /// Receives the spawned unit or the host error.
        reply: oneshot::Sender<Result<UnitSnapshot, SimulationError>>,
    },
    /// Late-joins a player into an unused lane.
    AddPlayer {
        /// Name of the joining player.
        name: PlayerName,
        /// Receives the assigned `(row, col)` pair or the host error.
        reply: oneshot::Sender<Result<(usize, usize), SimulationError>>,
    },
    /// Captures the current state snapshot.
    Snapshot {
        /// Receives the snapshot.
        reply: oneshot::Sender<StateSnapshot>,
    },
    /// Hands an externally-owned ticker (economy loops and the like) to the
    /// room; it is aborted when the room stops.
    AdoptTicker(JoinHandle<()>),
}

/// The two sub-steps of one combat tick.
///
/// The scheduler holds exactly one pending deadline at a time, so dropping
/// out of the loop cancels whichever phase was due next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TickPhase {
    /// Movement, castle hits, and battle assignment; pre-damage broadcast.
    Movement,
    /// Damage resolution, dead-unit purge, post-damage broadcast.
    Resolve,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Lobby,
    Running,
    Ended,
}

/// Cloneable handle to a running room task.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    id: RoomId,
    commands: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomHandle {
    /// Identifier of the room this handle points at.
    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Opens a new subscription to the room's event broadcast.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Reports whether the room task has already ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Starts the room; returns `false` if the room already ended.
    pub async fn start(&self) -> bool {
        self.commands.send(RoomCommand::Start).await.is_ok()
    }

    /// Stops the room; returns `false` if the room already ended.
    pub async fn stop(&self) -> bool {
        self.commands.send(RoomCommand::Stop).await.is_ok()
    }

    /// Hands an externally-owned ticker to the room for teardown.
    pub async fn adopt_ticker(&self, ticker: JoinHandle<()>) -> bool {
        self.commands
            .send(RoomCommand::AdoptTicker(ticker))
            .await
            .is_ok()
    }

    /// Spawns a player unit; `None` means the room already ended.
    pub async fn spawn_player_unit(
        &self,
        row: usize,
        owner: PlayerName,
        label: impl Into<String>,
    ) -> Option<Result<UnitSnapshot, SimulationError>> {
        let (reply, answer) = oneshot::channel();
        let command = RoomCommand::SpawnPlayerUnit {
            row,
            owner,
            label: label.into(),
            reply,
        };
        self.commands.send(command).await.ok()?;
        answer.await.ok()
    }

    /// Late-joins a player; `None` means the room already ended.
    pub async fn add_player(
        &self,
        name: PlayerName,
    ) -> Option<Result<(usize, usize), SimulationError>> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(RoomCommand::AddPlayer { name, reply })
            .await
            .ok()?;
        answer.await.ok()
    }

    /// Captures a state snapshot; `None` means the room already ended.
    pub async fn snapshot(&self) -> Option<StateSnapshot> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(RoomCommand::Snapshot { reply })
            .await
            .ok()?;
        answer.await.ok()
    }
}

/// Creates a room in the lobby state and spawns its task onto the current
/// tokio runtime.
///
/// The room starts ticking once [`RoomHandle::start`] is called. `seed`
/// feeds the room's private random stream, so identical seeds replay
/// identical battles and waves.
pub fn launch(
    id: RoomId,
    players: Vec<PlayerName>,
    config: RoomConfig,
    upgrades: Arc<dyn UpgradeContext + Send + Sync>,
    seed: u64,
) -> Result<RoomHandle, SimulationError> {
    let state = GameState::new(&players, None, &config)?;
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
    let handle = RoomHandle {
        id: id.clone(),
        commands: command_tx,
        events: event_tx.clone(),
    };
    let room = Room {
        id,
        state,
        config,
        rng: ChaCha8Rng::seed_from_u64(seed),
        upgrades,
        events: event_tx,
        adopted: Vec::new(),
        combat_ticks: 0,
        lifecycle: Lifecycle::Lobby,
    };
    drop(tokio::spawn(room.run(command_rx)));
    Ok(handle)
}

struct Room {
    id: RoomId,
    state: GameState,
    config: RoomConfig,
    rng: ChaCha8Rng,
    upgrades: Arc<dyn UpgradeContext + Send + Sync>,
    events: broadcast::Sender<RoomEvent>,
    adopted: Vec<JoinHandle<()>>,
    combat_ticks: u64,
    lifecycle: Lifecycle,
}

impl Room {
    async fn run(mut self, mut mailbox: mpsc::Receiver<RoomCommand>) {
        info!(room = %self.id, "room created in lobby");
        loop {
            match mailbox.recv().await {
                Some(RoomCommand::Start) => break,
                Some(RoomCommand::Stop) | None => {
                    self.teardown();
                    return;
                }
                Some(command) => self.handle_command(command),
            }
        }

        self.lifecycle = Lifecycle::Running;
        info!(room = %self.id, "room running");
        let _ = self.events.send(RoomEvent::Started);

        let half_interval = (self.config.combat_interval / 2).max(Duration::from_millis(1));
        let mut phase = TickPhase::Movement;
        let mut deadline = Instant::now() + half_interval;
        let mut countdown = interval_at(
            Instant::now() + self.config.countdown_interval,
            self.config.countdown_interval,
        );
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    let outcome = match phase {
                        TickPhase::Movement => self.phase_movement(),
                        TickPhase::Resolve => self.phase_resolve(),
                    };
                    match outcome {
                        Ok(game_over) if game_over => break,
                        Ok(_) => {}
                        // A bad tick is logged and skipped; the loop goes on.
                        Err(error) => {
                            warn!(room = %self.id, %error, "combat tick failed; skipping");
                        }
                    }
                    phase = match phase {
                        TickPhase::Movement => TickPhase::Resolve,
                        TickPhase::Resolve => TickPhase::Movement,
                    };
                    deadline += half_interval;
                }
                _ = countdown.tick() => self.countdown_tick(),
                command = mailbox.recv() => match command {
                    Some(RoomCommand::Stop) | None => break,
                    Some(RoomCommand::Start) => {}
                    Some(command) => self.handle_command(command),
                },
            }
        }

        self.teardown();
    }

    /// Phase 1: march both populations, apply castle hits, pair battles,
    /// and broadcast the pre-damage snapshot.
    fn phase_movement(&mut self) -> Result<bool, SimulationError> {
        let mut castle_hits: Vec<(usize, u32)> = Vec::new();
        {
            let (grid, units) = self.state.grid_and_units_mut();
            movement::move_enemies(grid, units, |unit, row| {
                castle_hits.push((row, unit.damage()));
            });
            movement::move_players(grid, units, |_unit, _row| {});
        }
        for (row, damage) in castle_hits {
            self.state.apply_castle_damage(row, damage)?;
        }
        {
            let (grid, units) = self.state.grid_and_units_mut();
            battle::assign(&*grid, units, &mut self.rng);
        }
        let _ = self
            .events
            .send(RoomEvent::Contact(query::snapshot(&self.state)));
        Ok(false)
    }

    /// Phase 2: resolve damage, purge the dead, broadcast the post-damage
    /// snapshot, and detect the end of the game.
    fn phase_resolve(&mut self) -> Result<bool, SimulationError> {
        {
            let (grid, units) = self.state.grid_and_units_mut();
            battle::resolve(&*grid, units, self.upgrades.as_ref(), &mut self.rng);
        }
        let removed = self.state.purge_dead();
        self.combat_ticks = self.combat_ticks.saturating_add(1);
        let _ = self.events.send(RoomEvent::Resolved {
            snapshot: query::snapshot(&self.state),
            removed,
        });

        if !self.state.any_alive() {
            let report = GameOverReport {
                wave_reached: self.state.wave(),
                combat_ticks: self.combat_ticks,
                castle_health: self.state.castle_health().clone(),
            };
            info!(room = %self.id, wave = report.wave_reached, "all castles down");
            let _ = self.events.send(RoomEvent::GameOver(report));
            return Ok(true);
        }
        Ok(false)
    }

    /// One second of wave countdown; spawns a wave when it reaches zero.
    ///
    /// Countdown and combat phases share the room task, so a second
    /// countdown tick can never re-enter wave generation mid-spawn.
    fn countdown_tick(&mut self) {
        if self.state.countdown_tick() {
            let spawned = waves::spawn_wave(&mut self.state, &self.config.wave, &mut self.rng);
            if !spawned.is_empty() {
                let _ = self.events.send(RoomEvent::WaveSpawned(spawned));
            }
        }
    }

    fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Start | RoomCommand::Stop => {}
            RoomCommand::SpawnPlayerUnit {
                row,
                owner,
                label,
                reply,
            } => {
                let result = self
                    .state
                    .spawn_player(&self.config.players, row, &owner, &label)
                    .and_then(|id| {
                        query::unit(&self.state, id)
                            .ok_or(SimulationError::UnknownUnitKind(label))
                    });
                let _ = reply.send(result);
            }
            RoomCommand::AddPlayer { name, reply } => {
                let _ = reply.send(self.state.add_player(name));
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(query::snapshot(&self.state));
            }
            RoomCommand::AdoptTicker(ticker) => self.adopted.push(ticker),
        }
    }

    fn teardown(&mut self) {
        for ticker in self.adopted.drain(..) {
            ticker.abort();
        }
        self.lifecycle = Lifecycle::Ended;
        info!(room = %self.id, lifecycle = ?self.lifecycle, "room stopped; tickers cancelled");
    }
}

/// Directory of independent rooms keyed by [`RoomId`].
///
/// Rooms share nothing beyond this map: each owns its state, its random
/// stream, and its timers. Stopping a room cancels everything it owns and
/// drops the directory entry so the room is eligible for reclamation.
#[derive(Debug)]
pub struct RoomDirectory {
    rooms: DashMap<RoomId, RoomHandle>,
    global_seed: u64,
}

impl RoomDirectory {
    /// Creates an empty directory; per-room seeds derive from `global_seed`.
    #[must_use]
    pub fn new(global_seed: u64) -> Self {
        Self {
            rooms: DashMap::new(),
            global_seed,
        }
    }

    /// Creates a room on demand and registers it under its identifier.
    pub fn create(
        &self,
        id: RoomId,
        players: Vec<PlayerName>,
        config: RoomConfig,
        upgrades: Arc<dyn UpgradeContext + Send + Sync>,
    ) -> Result<RoomHandle, SimulationError> {
        match self.rooms.entry(id.clone()) {
            Entry::Occupied(_) => Err(SimulationError::DuplicateRoom(id)),
            Entry::Vacant(slot) => {
                let seed = derive_seed(self.global_seed, id.as_str());
                let handle = launch(id, players, config, upgrades, seed)?;
                let _ = slot.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Looks up a room handle by identifier.
    #[must_use]
    pub fn get(&self, id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(id).map(|entry| entry.value().clone())
    }

    /// Stops a room and removes it; returns whether the room existed.
    pub async fn stop(&self, id: &RoomId) -> bool {
        match self.rooms.remove(id) {
            Some((_, handle)) => {
                let _ = handle.stop().await;
                true
            }
            None => false,
        }
    }

    /// Drops entries whose room task already ended on its own.
    pub fn reap(&self) {
        self.rooms.retain(|_, handle| !handle.is_closed());
    }

    /// Number of registered rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Reports whether the directory holds no rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
