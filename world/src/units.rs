//! Unit entities and the per-room registry that owns them.

use std::collections::BTreeMap;

use castle_defence_core::{
    Abilities, Health, PlayerName, UnitId, UnitKind, UnitSnapshot, UnitSpec,
};

/// One live unit on the grid.
///
/// A unit is either marching or battling, never both: movement skips units
/// tagged `in_battle`, and battle never changes a unit's position.
#[derive(Clone, Debug)]
pub struct Unit {
    id: UnitId,
    kind: UnitKind,
    label: String,
    health: Health,
    damage: u32,
    row: usize,
    col: usize,
    in_battle: bool,
    target: Option<UnitId>,
    just_spawned: bool,
    abilities: Abilities,
    owner: Option<PlayerName>,
}

impl Unit {
    pub(crate) fn from_spec(
        id: UnitId,
        kind: UnitKind,
        spec: &UnitSpec,
        row: usize,
        col: usize,
        owner: Option<PlayerName>,
    ) -> Self {
        Self {
            id,
            kind,
            label: spec.label.clone(),
            health: Health::full(spec.health),
            damage: spec.damage,
            row,
            col,
            in_battle: false,
            target: None,
            just_spawned: true,
            abilities: spec.abilities,
            owner,
        }
    }

    /// Unique identifier of the unit.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Population the unit belongs to.
    #[must_use]
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Subtype label the unit was spawned from.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Health pool of the unit.
    #[must_use]
    pub fn health(&self) -> Health {
        self.health
    }

    /// Damage dealt per attack.
    #[must_use]
    pub fn damage(&self) -> u32 {
        self.damage
    }

    /// Row the unit currently occupies.
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Column the unit currently occupies.
    #[must_use]
    pub fn col(&self) -> usize {
        self.col
    }

    /// Indicates whether the unit is locked in battle.
    #[must_use]
    pub fn in_battle(&self) -> bool {
        self.in_battle
    }

    /// Current battle target, if any.
    #[must_use]
    pub fn target(&self) -> Option<UnitId> {
        self.target
    }

    /// Indicates whether the unit still owes its one-tick spawn delay.
    #[must_use]
    pub fn just_spawned(&self) -> bool {
        self.just_spawned
    }

    /// Ability flags of the unit.
    #[must_use]
    pub fn abilities(&self) -> Abilities {
        self.abilities
    }

    /// Owning player for player-kind units.
    #[must_use]
    pub fn owner(&self) -> Option<&PlayerName> {
        self.owner.as_ref()
    }

    /// Reports whether the unit's health pool is exhausted.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health.is_dead()
    }

    /// Relocates the unit to the provided coordinates.
    pub fn set_position(&mut self, row: usize, col: usize) {
        self.row = row;
        self.col = col;
    }

    /// Consumes the one-tick spawn delay.
    pub fn clear_spawn_delay(&mut self) {
        self.just_spawned = false;
    }

    /// Locks the unit into battle against the provided target.
    pub fn enter_battle(&mut self, target: UnitId) {
        self.in_battle = true;
        self.target = Some(target);
    }

    /// Switches the battle target while staying locked in battle.
    pub fn retarget(&mut self, target: UnitId) {
        self.target = Some(target);
    }

    /// Releases the unit from battle, clearing its target.
    pub fn leave_battle(&mut self) {
        self.in_battle = false;
        self.target = None;
    }

    /// Removes health, saturating at zero.
    pub fn apply_damage(&mut self, amount: u32) {
        self.health.apply_damage(amount);
    }

    /// Restores health, clamped to the maximum.
    pub fn apply_heal(&mut self, amount: u32) {
        self.health.apply_heal(amount);
    }

    /// Captures an immutable snapshot of the unit for broadcasts.
    #[must_use]
    pub fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            kind: self.kind,
            label: self.label.clone(),
            health: self.health.current(),
            max_health: self.health.max(),
            damage: self.damage,
            row: self.row,
            col: self.col,
            in_battle: self.in_battle,
            owner: self.owner.clone(),
        }
    }
}

/// Registry that owns every live unit of a room and allocates identifiers.
///
/// Backed by an ordered map so every sweep over units is deterministic.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    entries: BTreeMap<UnitId, Unit>,
    next_id: u64,
}

impl UnitRegistry {
    /// Creates an empty registry with a reset identifier counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate(&mut self) -> UnitId {
        let id = UnitId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, unit: Unit) {
        let _ = self.entries.insert(unit.id(), unit);
    }

    /// Removes and returns a unit from the registry.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        self.entries.remove(&id)
    }

    /// Borrows a unit by identifier.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.entries.get(&id)
    }

    /// Mutably borrows a unit by identifier.
    #[must_use]
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.entries.get_mut(&id)
    }

    /// Iterates over all units in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.entries.values()
    }

    /// Number of units currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the registry holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castle_defence_core::UnitSpec;

    fn sample_spec() -> UnitSpec {
        UnitSpec::new("goblin", 18, 4, Abilities::none())
    }

    #[test]
    fn identifiers_increase_monotonically() {
        let mut registry = UnitRegistry::new();
        let first = registry.allocate();
        let second = registry.allocate();
        assert!(second > first);
    }

    #[test]
    fn battle_flags_are_mutually_exclusive_with_targets_cleared() {
        let mut registry = UnitRegistry::new();
        let id = registry.allocate();
        let mut unit = Unit::from_spec(id, UnitKind::Enemy, &sample_spec(), 0, 3, None);
        assert!(unit.just_spawned());
        assert!(!unit.in_battle());

        unit.enter_battle(UnitId::new(99));
        assert!(unit.in_battle());
        assert_eq!(unit.target(), Some(UnitId::new(99)));

        unit.leave_battle();
        assert!(!unit.in_battle());
        assert_eq!(unit.target(), None);
    }

    #[test]
    fn snapshots_mirror_unit_state() {
        let mut registry = UnitRegistry::new();
        let id = registry.allocate();
        let mut unit = Unit::from_spec(
            id,
            UnitKind::Player,
            &sample_spec(),
            2,
            1,
            Some(PlayerName::new("Alice")),
        );
        unit.apply_damage(5);
        let snapshot = unit.snapshot();
        assert_eq!(snapshot.health, 13);
        assert_eq!(snapshot.max_health, 18);
        assert_eq!(snapshot.owner, Some(PlayerName::new("Alice")));
        assert_eq!(snapshot.row, 2);
        assert_eq!(snapshot.col, 1);
    }
}
