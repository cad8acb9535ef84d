#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Cell-local battle pairing and simultaneous damage resolution.
//!
//! [`assign`] pairs opposing units that share a cell and only marks state;
//! [`resolve`] reads a pre-resolve snapshot of every battling cell, collects
//! all attacks and heals, and applies them in one step so unit order within
//! a cell can never bias the outcome. Dead units stay in place afterwards;
//! the caller purges them before the next tick reads the grid.

use std::collections::BTreeMap;

use castle_defence_core::{PlayerName, UnitId, UnitKind, UpgradeContext};
use castle_defence_world::{Grid, UnitRegistry};
use rand::Rng;

const CRITICAL_MULTIPLIER: u32 = 2;

/// Pairs opposing units sharing an interior cell.
///
/// Every unit in a contested cell that is not yet battling receives a
/// uniformly random living opposing target and is marked `in_battle`. No
/// damage is applied here; cells holding only one side are untouched.
pub fn assign<R: Rng>(grid: &Grid, units: &mut UnitRegistry, rng: &mut R) {
    for row in 0..grid.rows() {
        for col in 1..grid.columns().saturating_sub(1) {
            assign_cell(grid, units, row, col, rng);
        }
    }
}

fn assign_cell<R: Rng>(grid: &Grid, units: &mut UnitRegistry, row: usize, col: usize, rng: &mut R) {
    let (living_enemies, living_players) = living_by_kind(grid, units, row, col);
    if living_enemies.is_empty() || living_players.is_empty() {
        return;
    }

    let occupants = grid.units_in(row, col).to_vec();
    for id in occupants {
        let (eligible, kind) = match units.get(id) {
            Some(unit) => (!unit.is_dead() && !unit.in_battle(), unit.kind()),
            None => continue,
        };
        if !eligible {
            continue;
        }
        let pool = match kind {
            UnitKind::Enemy => &living_players,
            UnitKind::Player => &living_enemies,
        };
        let target = pool[rng.gen_range(0..pool.len())];
        if let Some(unit) = units.get_mut(id) {
            unit.enter_battle(target);
        }
    }
}

/// Resolves one damage pass over every battling cell.
///
/// Attack and heal lists are built from the pre-resolve snapshot, honouring
/// the ability flags: `attacks_all` units strike every living opponent in
/// the cell, `heal_amount` units heal every living friendly unit (self
/// included) instead of attacking, and everyone else strikes their current
/// target if it is still alive. Player attacks roll an independent critical
/// per attack with the chance reported by the host's [`UpgradeContext`],
/// doubling that attack's damage. Damage lands simultaneously, then heals
/// reach units still standing, then `self_heal_percent` units recover a
/// share of the damage they dealt. Survivors finally re-target: a cell with
/// no living opponents releases its units from battle, and a survivor whose
/// target died picks a new random living opponent.
pub fn resolve<R, U>(grid: &Grid, units: &mut UnitRegistry, upgrades: &U, rng: &mut R)
where
    R: Rng,
    U: UpgradeContext + ?Sized,
{
    for row in 0..grid.rows() {
        for col in 1..grid.columns().saturating_sub(1) {
            resolve_cell(grid, units, upgrades, row, col, rng);
        }
    }
}

fn resolve_cell<R, U>(
    grid: &Grid,
    units: &mut UnitRegistry,
    upgrades: &U,
    row: usize,
    col: usize,
    rng: &mut R,
) where
    R: Rng,
    U: UpgradeContext + ?Sized,
{
    let occupants = grid.units_in(row, col).to_vec();
    let battlers: Vec<UnitId> = occupants
        .iter()
        .copied()
        .filter(|id| {
            units
                .get(*id)
                .is_some_and(|unit| unit.in_battle() && !unit.is_dead())
        })
        .collect();
    if battlers.is_empty() {
        return;
    }

    let (living_enemies, living_players) = living_by_kind(grid, units, row, col);

    let mut attacks: Vec<(UnitId, UnitId, u32)> = Vec::new();
    let mut heals: Vec<(UnitId, u32)> = Vec::new();

    for &id in &battlers {
        let Some(unit) = units.get(id) else { continue };
        let abilities = unit.abilities();

        if let Some(amount) = abilities.heal_amount {
            let friendly = match unit.kind() {
                UnitKind::Enemy => &living_enemies,
                UnitKind::Player => &living_players,
            };
            for &target in friendly {
                heals.push((target, amount));
            }
            continue;
        }

        let opposing = match unit.kind() {
            UnitKind::Enemy => &living_players,
            UnitKind::Player => &living_enemies,
        };
        if abilities.attacks_all {
            for &target in opposing {
                let amount = rolled_damage(unit.damage(), unit.kind(), unit.owner(), upgrades, rng);
                attacks.push((id, target, amount));
            }
        } else if let Some(target) = unit.target() {
            let target_alive = units.get(target).is_some_and(|t| !t.is_dead());
            if target_alive {
                let amount = rolled_damage(unit.damage(), unit.kind(), unit.owner(), upgrades, rng);
                attacks.push((id, target, amount));
            }
        }
    }

    let mut dealt: BTreeMap<UnitId, u32> = BTreeMap::new();
    for (attacker, target, amount) in attacks {
        if let Some(unit) = units.get_mut(target) {
            unit.apply_damage(amount);
        }
        *dealt.entry(attacker).or_insert(0) += amount;
    }

    for (target, amount) in heals {
        if let Some(unit) = units.get_mut(target) {
            if !unit.is_dead() {
                unit.apply_heal(amount);
            }
        }
    }

    for (attacker, total) in dealt {
        let percent = match units.get(attacker) {
            Some(unit) if !unit.is_dead() => unit.abilities().self_heal_percent,
            _ => None,
        };
        if let Some(percent) = percent {
            let heal = total.saturating_mul(percent) / 100;
            if heal > 0 {
                if let Some(unit) = units.get_mut(attacker) {
                    unit.apply_heal(heal);
                }
            }
        }
    }

    retarget_survivors(grid, units, row, col, rng);
}

fn retarget_survivors<R: Rng>(
    grid: &Grid,
    units: &mut UnitRegistry,
    row: usize,
    col: usize,
    rng: &mut R,
) {
    let (living_enemies, living_players) = living_by_kind(grid, units, row, col);

    let occupants = grid.units_in(row, col).to_vec();
    for id in occupants {
        let (battling, kind, target) = match units.get(id) {
            Some(unit) if !unit.is_dead() => (unit.in_battle(), unit.kind(), unit.target()),
            _ => continue,
        };
        if !battling {
            continue;
        }
        let opposing = match kind {
            UnitKind::Enemy => &living_players,
            UnitKind::Player => &living_enemies,
        };
        if opposing.is_empty() {
            if let Some(unit) = units.get_mut(id) {
                unit.leave_battle();
            }
        } else if !target.is_some_and(|t| opposing.contains(&t)) {
            let next = opposing[rng.gen_range(0..opposing.len())];
            if let Some(unit) = units.get_mut(id) {
                unit.retarget(next);
            }
        }
    }
}

fn living_by_kind(
    grid: &Grid,
    units: &UnitRegistry,
    row: usize,
    col: usize,
) -> (Vec<UnitId>, Vec<UnitId>) {
    let mut enemies = Vec::new();
    let mut players = Vec::new();
    for &id in grid.units_in(row, col) {
        let Some(unit) = units.get(id) else { continue };
        if unit.is_dead() {
            continue;
        }
        match unit.kind() {
            UnitKind::Enemy => enemies.push(id),
            UnitKind::Player => players.push(id),
        }
    }
    (enemies, players)
}

fn rolled_damage<R, U>(
    damage: u32,
    kind: UnitKind,
    owner: Option<&PlayerName>,
    upgrades: &U,
    rng: &mut R,
) -> u32
where
    R: Rng,
    U: UpgradeContext + ?Sized,
{
    if kind == UnitKind::Player {
        if let Some(owner) = owner {
            let chance = upgrades.critical_chance(owner).clamp(0.0, 1.0);
            if chance > 0.0 && rng.gen_bool(chance) {
                return damage.saturating_mul(CRITICAL_MULTIPLIER);
            }
        }
    }
    damage
}
