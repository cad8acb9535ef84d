#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative per-room world state for Castle Defence.
//!
//! One [`GameState`] exists per room and owns the lane grid, the unit
//! registry, the castle-health ledger, and the lane-ownership bijections.
//! The pure systems (movement, battle, wave generation) mutate it through
//! explicit borrows; nothing in this crate is shared across rooms.

mod grid;
mod units;

pub use grid::{Cell, Grid, Terminal};
pub use units::{Unit, UnitRegistry};

use std::collections::BTreeMap;

use castle_defence_core::{
    PlayerName, PlayerRoster, RoomConfig, SimulationError, UnitId, UnitKind, UnitSpec,
};

/// Authoritative aggregate for one room.
#[derive(Debug)]
pub struct GameState {
    grid: Grid,
    units: UnitRegistry,
    castle_health: BTreeMap<PlayerName, u32>,
    owner_by_row: BTreeMap<usize, PlayerName>,
    row_by_owner: BTreeMap<PlayerName, usize>,
    owner_by_col: BTreeMap<usize, PlayerName>,
    col_by_owner: BTreeMap<PlayerName, usize>,
    initial_castle_hp: u32,
    wave: u32,
    next_wave_in: u32,
    wave_interval_secs: u32,
}

impl GameState {
    /// Builds the state for a fresh room.
    ///
    /// Lane ownership is assigned in list order: the i-th player owns row i
    /// and column i, and those mappings never change afterwards. The row
    /// count defaults to the configured minimum and is never less than the
    /// player count.
    pub fn new(
        players: &[PlayerName],
        rows: Option<usize>,
        config: &RoomConfig,
    ) -> Result<Self, SimulationError> {
        if players.len() > config.grid.columns {
            return Err(SimulationError::LanesExhausted);
        }
        let rows = rows.unwrap_or(config.grid.min_rows).max(players.len());

        let mut state = Self {
            grid: Grid::new(rows, config.grid.columns),
            units: UnitRegistry::new(),
            castle_health: BTreeMap::new(),
            owner_by_row: BTreeMap::new(),
            row_by_owner: BTreeMap::new(),
            owner_by_col: BTreeMap::new(),
            col_by_owner: BTreeMap::new(),
            initial_castle_hp: config.initial_castle_hp,
            wave: 1,
            next_wave_in: config.wave.interval_secs,
            wave_interval_secs: config.wave.interval_secs,
        };

        for (lane, name) in players.iter().enumerate() {
            if state.castle_health.contains_key(name) {
                return Err(SimulationError::DuplicatePlayer(name.clone()));
            }
            state.assign_lane(name.clone(), lane, lane);
        }

        Ok(state)
    }

    fn assign_lane(&mut self, name: PlayerName, row: usize, col: usize) {
        let _ = self.owner_by_row.insert(row, name.clone());
        let _ = self.row_by_owner.insert(name.clone(), row);
        let _ = self.owner_by_col.insert(col, name.clone());
        let _ = self.col_by_owner.insert(name.clone(), col);
        let _ = self.castle_health.insert(name, self.initial_castle_hp);
    }

    /// Borrows the lane grid.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Borrows the unit registry.
    #[must_use]
    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// Splits mutable access to the grid and the registry, the borrow shape
    /// every per-tick system works with.
    #[must_use]
    pub fn grid_and_units_mut(&mut self) -> (&mut Grid, &mut UnitRegistry) {
        (&mut self.grid, &mut self.units)
    }

    /// Remaining castle health per player.
    #[must_use]
    pub fn castle_health(&self) -> &BTreeMap<PlayerName, u32> {
        &self.castle_health
    }

    /// Owner of the provided row, if any.
    #[must_use]
    pub fn row_owner(&self, row: usize) -> Option<&PlayerName> {
        self.owner_by_row.get(&row)
    }

    /// Row owned by the provided player, if known.
    #[must_use]
    pub fn owner_row(&self, name: &PlayerName) -> Option<usize> {
        self.row_by_owner.get(name).copied()
    }

    /// Owner of the provided column, if any.
    #[must_use]
    pub fn column_owner(&self, col: usize) -> Option<&PlayerName> {
        self.owner_by_col.get(&col)
    }

    /// Column owned by the provided player, if known.
    #[must_use]
    pub fn owner_column(&self, name: &PlayerName) -> Option<usize> {
        self.col_by_owner.get(name).copied()
    }

    /// Number of the next wave to spawn.
    #[must_use]
    pub fn wave(&self) -> u32 {
        self.wave
    }

    /// Advances the wave counter after a spawn event.
    pub fn advance_wave(&mut self) {
        self.wave = self.wave.saturating_add(1);
    }

    /// Seconds remaining until the next wave.
    #[must_use]
    pub fn next_wave_in(&self) -> u32 {
        self.next_wave_in
    }

    /// Decrements the wave countdown by one second.
    ///
    /// Returns `true` when the countdown reached zero; the countdown resets
    /// to the configured interval in the same step.
    pub fn countdown_tick(&mut self) -> bool {
        self.next_wave_in = self.next_wave_in.saturating_sub(1);
        if self.next_wave_in == 0 {
            self.next_wave_in = self.wave_interval_secs.max(1);
            true
        } else {
            false
        }
    }

    /// Inserts a unit into the registry and its grid cell.
    pub fn add_unit(&mut self, unit: Unit) {
        let (id, row, col) = (unit.id(), unit.row(), unit.col());
        self.units.insert(unit);
        self.grid.add_unit(row, col, id);
    }

    /// Removes a unit from the registry and its grid cell.
    pub fn remove_unit(&mut self, id: UnitId) -> Option<Unit> {
        let unit = self.units.remove(id)?;
        self.grid.remove_unit(unit.row(), unit.col(), id);
        Some(unit)
    }

    /// Removes every dead unit from the registry and the grid, returning
    /// the purged identifiers.
    pub fn purge_dead(&mut self) -> Vec<UnitId> {
        let dead: Vec<(UnitId, usize, usize)> = self
            .units
            .iter()
            .filter(|unit| unit.is_dead())
            .map(|unit| (unit.id(), unit.row(), unit.col()))
            .collect();
        let mut removed = Vec::with_capacity(dead.len());
        for (id, row, col) in dead {
            let _ = self.units.remove(id);
            self.grid.remove_unit(row, col, id);
            removed.push(id);
        }
        removed
    }

    /// Spawns one enemy of the provided subtype at the portal-adjacent
    /// column of the lane.
    ///
    /// The enemy carries a one-tick spawn delay before its first step.
    pub fn spawn_enemy(&mut self, spec: &UnitSpec, row: usize) -> Result<UnitId, SimulationError> {
        if row >= self.grid.rows() {
            return Err(SimulationError::RowOutOfBounds {
                row,
                rows: self.grid.rows(),
            });
        }
        let id = self.units.allocate();
        let col = self.grid.portal_adjacent_col();
        self.add_unit(Unit::from_spec(id, UnitKind::Enemy, spec, row, col, None));
        Ok(id)
    }

    /// Spawns one player unit at the castle-adjacent column of the lane.
    ///
    /// An invalid row, an unknown owner, or an unknown subtype label is a
    /// host bug and fails loudly.
    pub fn spawn_player(
        &mut self,
        roster: &PlayerRoster,
        row: usize,
        owner: &PlayerName,
        label: &str,
    ) -> Result<UnitId, SimulationError> {
        if row >= self.grid.rows() {
            return Err(SimulationError::RowOutOfBounds {
                row,
                rows: self.grid.rows(),
            });
        }
        if !self.castle_health.contains_key(owner) {
            return Err(SimulationError::UnknownPlayer(owner.clone()));
        }
        let spec = roster
            .find(label)
            .ok_or_else(|| SimulationError::UnknownUnitKind(label.to_string()))?;
        let id = self.units.allocate();
        let col = self.grid.castle_adjacent_col();
        self.add_unit(Unit::from_spec(
            id,
            UnitKind::Player,
            spec,
            row,
            col,
            Some(owner.clone()),
        ));
        Ok(id)
    }

    /// Applies castle damage to the owner of the provided row, saturating
    /// at zero.
    pub fn apply_castle_damage(&mut self, row: usize, amount: u32) -> Result<(), SimulationError> {
        if row >= self.grid.rows() {
            return Err(SimulationError::RowOutOfBounds {
                row,
                rows: self.grid.rows(),
            });
        }
        let owner = self
            .owner_by_row
            .get(&row)
            .ok_or(SimulationError::UnownedLane(row))?;
        let health = self
            .castle_health
            .get_mut(owner)
            .ok_or_else(|| SimulationError::UnknownPlayer(owner.clone()))?;
        *health = health.saturating_sub(amount);
        Ok(())
    }

    /// Reports whether the player's castle still stands.
    #[must_use]
    pub fn is_alive(&self, name: &PlayerName) -> bool {
        self.castle_health.get(name).is_some_and(|hp| *hp > 0)
    }

    /// Reports whether any castle still stands.
    #[must_use]
    pub fn any_alive(&self) -> bool {
        self.castle_health.values().any(|hp| *hp > 0)
    }

    /// Rows whose owner is still alive, in ascending order.
    #[must_use]
    pub fn alive_lanes(&self) -> Vec<usize> {
        self.owner_by_row
            .iter()
            .filter(|(_, name)| self.is_alive(name))
            .map(|(row, _)| *row)
            .collect()
    }

    /// Adds a player mid-game, allocating the first unused row and column
    /// and growing the grid if every row is taken.
    ///
    /// Existing units and ownership mappings are untouched. Returns the
    /// assigned `(row, col)` pair.
    pub fn add_player(&mut self, name: PlayerName) -> Result<(usize, usize), SimulationError> {
        if self.castle_health.contains_key(&name) {
            return Err(SimulationError::DuplicatePlayer(name));
        }
        let col = (0..self.grid.columns())
            .find(|col| !self.owner_by_col.contains_key(col))
            .ok_or(SimulationError::LanesExhausted)?;
        let row = match (0..self.grid.rows()).find(|row| !self.owner_by_row.contains_key(row)) {
            Some(row) => row,
            None => {
                let row = self.grid.rows();
                self.grid.resize_rows(row + 1);
                row
            }
        };
        self.assign_lane(name, row, col);
        Ok((row, col))
    }
}

/// Query functions that provide read-only access to a room's state.
pub mod query {
    use castle_defence_core::{StateSnapshot, UnitId, UnitSnapshot};

    use super::GameState;

    /// Captures the serializable snapshot broadcast at both tick phases.
    #[must_use]
    pub fn snapshot(state: &GameState) -> StateSnapshot {
        StateSnapshot {
            units: state.units().iter().map(super::Unit::snapshot).collect(),
            castle_health: state.castle_health().clone(),
            wave: state.wave(),
            next_wave_in: state.next_wave_in(),
        }
    }

    /// Captures a snapshot of a single unit, if it is still registered.
    #[must_use]
    pub fn unit(state: &GameState, id: UnitId) -> Option<UnitSnapshot> {
        state.units().get(id).map(super::Unit::snapshot)
    }
}
