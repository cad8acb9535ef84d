#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Castle Defence simulation engine.
//!
//! This crate defines the vocabulary that connects the authoritative world,
//! the pure combat systems, and the per-room orchestration layer: unit
//! identity and abilities, balance configuration supplied by the host,
//! broadcast snapshots, the upgrade capability consumed during battle
//! resolution, and the error taxonomy for host programming mistakes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Unique identifier assigned to a unit within one room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(u64);

impl UnitId {
    /// Creates a new unit identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Name that identifies a player across castle health, lane ownership, and
/// upgrade lookups.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerName(String);

impl PlayerName {
    /// Creates a new player name from the provided string.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrows the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier that keys a room inside the room directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    /// Creates a new room identifier from the provided string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminant separating the two unit populations marching through a lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// Spawned by waves at the portal side, marching toward the castles.
    Enemy,
    /// Hired by players at the castle side, marching toward the portal.
    Player,
}

impl UnitKind {
    /// Returns the kind this kind fights against.
    #[must_use]
    pub const fn opposing(self) -> Self {
        match self {
            Self::Enemy => Self::Player,
            Self::Player => Self::Enemy,
        }
    }
}

/// Optional ability flags carried by a unit subtype.
///
/// Percentages are integral (0–100) so ability arithmetic stays in integer
/// space alongside health and damage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abilities {
    /// Strikes every living opposing unit in the cell instead of one target.
    pub attacks_all: bool,
    /// Heals self by this percentage of the damage dealt in the same pass.
    pub self_heal_percent: Option<u32>,
    /// Heals every living friendly unit in the cell (self included) by this
    /// amount each resolve pass instead of attacking.
    pub heal_amount: Option<u32>,
}

impl Abilities {
    /// Abilities of an ordinary unit: single-target attacks, no healing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attacks_all: false,
            self_heal_percent: None,
            heal_amount: None,
        }
    }
}

/// Health pool that owns the clamping invariant: the current value never
/// drops below zero nor rises above the maximum, and zero means dead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Health {
    current: u32,
    max: u32,
}

impl Health {
    /// Creates a full health pool with the provided maximum.
    #[must_use]
    pub const fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Current health value.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    /// Maximum health value.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Reports whether the pool is exhausted.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Removes the provided amount, saturating at zero.
    pub fn apply_damage(&mut self, amount: u32) {
        self.current = self.current.saturating_sub(amount);
    }

    /// Restores the provided amount, clamped to the maximum.
    pub fn apply_heal(&mut self, amount: u32) {
        self.current = self.current.saturating_add(amount).min(self.max);
    }
}

/// One configured unit subtype: the balance numbers a spawn copies into a
/// live unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Subtype label referenced by spawn requests and broadcast to clients.
    pub label: String,
    /// Maximum (and starting) health of the unit.
    pub health: u32,
    /// Damage dealt per attack.
    pub damage: u32,
    /// Ability flags copied onto the spawned unit.
    pub abilities: Abilities,
}

impl UnitSpec {
    /// Creates a new subtype description.
    #[must_use]
    pub fn new(label: impl Into<String>, health: u32, damage: u32, abilities: Abilities) -> Self {
        Self {
            label: label.into(),
            health,
            damage,
            abilities,
        }
    }
}

/// Dimensions of the lane grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Fixed column count including both terminal columns; never changes
    /// after construction.
    pub columns: usize,
    /// Lower bound on the row count; the actual count is the larger of this
    /// and the player count.
    pub min_rows: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 8,
            min_rows: 4,
        }
    }
}

/// Tuning knobs for wave sizing, lane distribution, and subtype scaling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaveConfig {
    /// Flat enemy count added to every wave before scaling.
    pub base: u32,
    /// Per-player multiplier inside the wave growth term.
    pub per_player_scaling: f64,
    /// Exponent applied to the alive-lane count inside the growth term.
    pub scaling_curve: f64,
    /// Hard ceiling on enemies per alive lane.
    pub per_lane_cap: u32,
    /// Minimum enemies guaranteed to each alive lane when the total allows.
    pub min_per_lane: u32,
    /// Fraction of the total moved between randomly chosen lanes after the
    /// even split; zero keeps the split perfectly even.
    pub smoothing: f64,
    /// Wave number at which subtype interpolation reaches the hardest entry.
    pub max_scaling_wave: u32,
    /// Seconds between waves; the countdown resets to this after spawning.
    pub interval_secs: u32,
    /// Enemy subtypes ordered easiest to hardest.
    pub roster: Vec<UnitSpec>,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            base: 3,
            per_player_scaling: 1.5,
            scaling_curve: 0.8,
            per_lane_cap: 12,
            min_per_lane: 1,
            smoothing: 0.25,
            max_scaling_wave: 20,
            interval_secs: 30,
            roster: vec![
                UnitSpec::new("rat", 10, 2, Abilities::none()),
                UnitSpec::new("goblin", 18, 4, Abilities::none()),
                UnitSpec::new("orc", 30, 6, Abilities::none()),
                UnitSpec::new(
                    "berserker",
                    40,
                    9,
                    Abilities {
                        self_heal_percent: Some(50),
                        ..Abilities::none()
                    },
                ),
                UnitSpec::new(
                    "demon",
                    55,
                    12,
                    Abilities {
                        attacks_all: true,
                        ..Abilities::none()
                    },
                ),
            ],
        }
    }
}

/// Player unit subtypes available to spawn requests, looked up by label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerRoster {
    /// Configured player unit subtypes.
    pub specs: Vec<UnitSpec>,
}

impl PlayerRoster {
    /// Finds the subtype carrying the provided label.
    #[must_use]
    pub fn find(&self, label: &str) -> Option<&UnitSpec> {
        self.specs.iter().find(|spec| spec.label == label)
    }
}

impl Default for PlayerRoster {
    fn default() -> Self {
        Self {
            specs: vec![
                UnitSpec::new("footman", 25, 6, Abilities::none()),
                UnitSpec::new(
                    "priest",
                    18,
                    4,
                    Abilities {
                        heal_amount: Some(3),
                        ..Abilities::none()
                    },
                ),
                UnitSpec::new(
                    "champion",
                    35,
                    8,
                    Abilities {
                        attacks_all: true,
                        ..Abilities::none()
                    },
                ),
            ],
        }
    }
}

/// Complete balance and pacing configuration for one room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Lane grid dimensions.
    pub grid: GridConfig,
    /// Wave generation tuning.
    pub wave: WaveConfig,
    /// Player unit roster.
    pub players: PlayerRoster,
    /// Starting castle health for every player.
    pub initial_castle_hp: u32,
    /// Full combat tick period; each tick splits into two phases half this
    /// interval apart.
    pub combat_interval: Duration,
    /// Period of the wave countdown ticker.
    pub countdown_interval: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            wave: WaveConfig::default(),
            players: PlayerRoster::default(),
            initial_castle_hp: 100,
            combat_interval: Duration::from_millis(600),
            countdown_interval: Duration::from_secs(1),
        }
    }
}

/// Immutable representation of a single unit used for broadcasts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Unique identifier assigned to the unit.
    pub id: UnitId,
    /// Population the unit belongs to.
    pub kind: UnitKind,
    /// Subtype label the unit was spawned from.
    pub label: String,
    /// Current health value.
    pub health: u32,
    /// Maximum health value.
    pub max_health: u32,
    /// Damage dealt per attack.
    pub damage: u32,
    /// Row the unit currently occupies.
    pub row: usize,
    /// Column the unit currently occupies.
    pub col: usize,
    /// Indicates whether the unit is locked in battle this tick.
    pub in_battle: bool,
    /// Owning player for player-kind units.
    pub owner: Option<PlayerName>,
}

/// Serializable view of one room's authoritative state, emitted at both
/// broadcast points of the combat tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// All living units, ordered by identifier.
    pub units: Vec<UnitSnapshot>,
    /// Remaining castle health per player.
    pub castle_health: BTreeMap<PlayerName, u32>,
    /// Number of the next wave to spawn.
    pub wave: u32,
    /// Seconds remaining until the next wave.
    pub next_wave_in: u32,
}

/// End-of-game statistics emitted alongside the game-over signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverReport {
    /// Wave counter at the moment the last castle fell.
    pub wave_reached: u32,
    /// Number of completed combat ticks.
    pub combat_ticks: u64,
    /// Final castle health per player (all zero by definition).
    pub castle_health: BTreeMap<PlayerName, u32>,
}

/// Capability supplied by the host economy layer to battle resolution.
///
/// The simulation treats this as opaque: it only ever asks for the critical
/// strike chance of an attacking player unit's owner.
pub trait UpgradeContext {
    /// Probability in `[0, 1]` that an attack by one of `owner`'s units
    /// doubles its damage.
    fn critical_chance(&self, owner: &PlayerName) -> f64;
}

/// Upgrade context for hosts without an economy: no player ever crits.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoUpgrades;

impl UpgradeContext for NoUpgrades {
    fn critical_chance(&self, _owner: &PlayerName) -> f64 {
        0.0
    }
}

/// Host programming errors surfaced at the call site.
///
/// Expected empty conditions (no alive lanes, empty cells, out-of-bounds
/// grid reads) are not errors; they produce empty results instead.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// A spawn or damage request referenced a row outside the grid.
    #[error("row {row} is outside the {rows}-row grid")]
    RowOutOfBounds {
        /// Requested row index.
        row: usize,
        /// Current number of rows in the grid.
        rows: usize,
    },
    /// A castle-damage request referenced a row no player owns.
    #[error("row {0} has no castle owner")]
    UnownedLane(usize),
    /// An operation referenced a player that never joined the room.
    #[error("player {0} is not part of this room")]
    UnknownPlayer(PlayerName),
    /// A spawn request referenced a subtype label missing from the roster.
    #[error("unit kind `{0}` is not in the configured roster")]
    UnknownUnitKind(String),
    /// A joining player reused a name already present in the room.
    #[error("player {0} already joined this room")]
    DuplicatePlayer(PlayerName),
    /// A late join could not be assigned an unused row and column.
    #[error("no unused lane remains for a new player")]
    LanesExhausted,
    /// A room was created under an identifier already in the directory.
    #[error("room {0} already exists")]
    DuplicateRoom(RoomId),
}

/// Derives a labelled 64-bit seed from a global seed.
///
/// Hashes the seed and label through SHA-256 and keeps the first eight
/// little-endian bytes, so distinct labels yield independent streams while
/// the same inputs always reproduce the same seed.
#[must_use]
pub fn derive_seed(global_seed: u64, label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_saturates_at_zero_and_clamps_at_max() {
        let mut health = Health::full(10);
        health.apply_damage(4);
        assert_eq!(health.current(), 6);
        health.apply_damage(100);
        assert_eq!(health.current(), 0);
        assert!(health.is_dead());
        health.apply_heal(3);
        health.apply_heal(1_000);
        assert_eq!(health.current(), 10);
    }

    #[test]
    fn opposing_kind_flips() {
        assert_eq!(UnitKind::Enemy.opposing(), UnitKind::Player);
        assert_eq!(UnitKind::Player.opposing(), UnitKind::Enemy);
    }

    #[test]
    fn derived_seeds_are_stable_and_label_sensitive() {
        let first = derive_seed(42, "room-1");
        assert_eq!(first, derive_seed(42, "room-1"));
        assert_ne!(first, derive_seed(42, "room-2"));
        assert_ne!(first, derive_seed(43, "room-1"));
    }

    #[test]
    fn default_rosters_resolve_labels() {
        let roster = PlayerRoster::default();
        assert!(roster.find("priest").is_some());
        assert!(roster.find("dragon").is_none());
        let wave = WaveConfig::default();
        assert!(wave.roster.len() >= 2, "interpolation needs two endpoints");
    }

    #[test]
    fn state_snapshot_round_trips_through_bincode() {
        let mut castle_health = BTreeMap::new();
        let _ = castle_health.insert(PlayerName::new("Alice"), 93);
        let snapshot = StateSnapshot {
            units: vec![UnitSnapshot {
                id: UnitId::new(7),
                kind: UnitKind::Enemy,
                label: "goblin".to_string(),
                health: 12,
                max_health: 18,
                damage: 4,
                row: 0,
                col: 3,
                in_battle: true,
                owner: None,
            }],
            castle_health,
            wave: 4,
            next_wave_in: 12,
        };
        let bytes = bincode::serialize(&snapshot).expect("serialize");
        let restored: StateSnapshot = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored, snapshot);
    }
}
