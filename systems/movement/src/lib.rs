#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-tick lane movement for both unit populations.
//!
//! Enemies march toward the castle column, players toward the portal
//! column. Each sweep processes the marching front first, so a unit moved
//! this tick lands only in columns the sweep has already passed and never
//! steps twice in one tick. Units locked in battle never move, and a
//! freshly spawned unit spends its first tick clearing the spawn delay
//! instead of stepping.

use castle_defence_core::UnitKind;
use castle_defence_world::{Grid, Unit, UnitRegistry};

/// Marches every eligible enemy one column toward the castle.
///
/// An enemy whose destination holds a player unit stays put; the player
/// side closes the remaining distance and battle assignment pairs them this
/// tick. An enemy stepping onto the castle column is consumed: it is
/// removed from the grid and the registry and handed to `on_reach_castle`
/// together with its lane row, so the caller can apply castle damage.
pub fn move_enemies<F>(grid: &mut Grid, units: &mut UnitRegistry, on_reach_castle: F)
where
    F: FnMut(Unit, usize),
{
    march(grid, units, UnitKind::Enemy, on_reach_castle);
}

/// Marches every eligible player unit one column toward the portal.
///
/// Players advance into enemy-held cells; that contact is what creates
/// battles. A player stepping onto the portal column is consumed and handed
/// to `on_reach_portal` with its lane row; no damage is involved.
pub fn move_players<F>(grid: &mut Grid, units: &mut UnitRegistry, on_reach_portal: F)
where
    F: FnMut(Unit, usize),
{
    march(grid, units, UnitKind::Player, on_reach_portal);
}

fn march<F>(grid: &mut Grid, units: &mut UnitRegistry, kind: UnitKind, mut on_terminal: F)
where
    F: FnMut(Unit, usize),
{
    let columns = grid.columns();
    if columns < 2 {
        return;
    }

    let sweep: Vec<usize> = match kind {
        UnitKind::Enemy => (1..columns).collect(),
        UnitKind::Player => (0..columns - 1).rev().collect(),
    };

    for col in sweep {
        for row in 0..grid.rows() {
            step_cell(grid, units, kind, row, col, &mut on_terminal);
        }
    }
}

fn step_cell<F>(
    grid: &mut Grid,
    units: &mut UnitRegistry,
    kind: UnitKind,
    row: usize,
    col: usize,
    on_terminal: &mut F,
) where
    F: FnMut(Unit, usize),
{
    let occupants = grid.units_in(row, col).to_vec();
    for id in occupants {
        let (matches_kind, in_battle, just_spawned) = match units.get(id) {
            Some(unit) => (unit.kind() == kind, unit.in_battle(), unit.just_spawned()),
            None => continue,
        };
        if !matches_kind || in_battle {
            continue;
        }
        if just_spawned {
            if let Some(unit) = units.get_mut(id) {
                unit.clear_spawn_delay();
            }
            continue;
        }

        let next_col = match kind {
            UnitKind::Enemy => col - 1,
            UnitKind::Player => col + 1,
        };

        if kind == UnitKind::Enemy {
            let blocked = grid
                .units_in(row, next_col)
                .iter()
                .any(|other| units.get(*other).is_some_and(|u| u.kind() == UnitKind::Player));
            if blocked {
                continue;
            }
        }

        grid.remove_unit(row, col, id);
        let reached_terminal = match kind {
            UnitKind::Enemy => grid.is_castle_col(next_col),
            UnitKind::Player => grid.is_portal_col(next_col),
        };
        if reached_terminal {
            if let Some(unit) = units.remove(id) {
                on_terminal(unit, row);
            }
        } else {
            grid.add_unit(row, next_col, id);
            if let Some(unit) = units.get_mut(id) {
                unit.set_position(row, next_col);
            }
        }
    }
}
