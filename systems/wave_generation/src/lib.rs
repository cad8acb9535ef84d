#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Wave generation: sizes a batch of enemies, distributes it across the
//! currently alive lanes, and scales the subtype mix with the wave number.

use castle_defence_core::{UnitSnapshot, WaveConfig};
use castle_defence_world::{query, GameState};
use rand::Rng;

/// Spawns the next enemy wave into the provided room state.
///
/// The batch is sized by the wave growth formula and capped per alive lane,
/// split evenly across alive lanes with remainder and a bounded random
/// perturbation, then floored to the configured per-lane minimum by
/// draining surplus lanes. Each enemy picks its subtype by interpolating
/// across the roster with the wave number and spawns at the portal-side
/// interior column of its lane with one tick of spawn delay. Returns
/// snapshots of the newly spawned units for the host's broadcast; a room
/// with no alive lanes produces an empty wave.
pub fn spawn_wave<R: Rng>(
    state: &mut GameState,
    config: &WaveConfig,
    rng: &mut R,
) -> Vec<UnitSnapshot> {
    let wave = state.wave();
    state.advance_wave();

    let lanes = state.alive_lanes();
    if lanes.is_empty() || config.roster.is_empty() {
        return Vec::new();
    }

    let total = wave_size(config, wave, lanes.len() as u32);
    if total == 0 {
        return Vec::new();
    }

    let mut counts = distribute(total, lanes.len(), config, rng);
    enforce_minimum(&mut counts, config.min_per_lane);

    let mut spawned = Vec::with_capacity(total as usize);
    for (lane, &row) in lanes.iter().enumerate() {
        for _ in 0..counts[lane] {
            let spec = &config.roster[select_subtype(config, wave, rng)];
            let Ok(id) = state.spawn_enemy(spec, row) else {
                continue;
            };
            if let Some(snapshot) = query::unit(state, id) {
                spawned.push(snapshot);
            }
        }
    }
    spawned
}

/// Total enemy count for the provided wave number and alive-lane count:
/// `base + floor(wave × lanes^curve × per_player_scaling)`, capped at
/// `lanes × per_lane_cap`.
#[must_use]
pub fn wave_size(config: &WaveConfig, wave: u32, alive_lanes: u32) -> u32 {
    if alive_lanes == 0 {
        return 0;
    }
    let growth = f64::from(wave)
        * f64::from(alive_lanes).powf(config.scaling_curve)
        * config.per_player_scaling;
    let total = config.base.saturating_add(growth.floor() as u32);
    total.min(alive_lanes.saturating_mul(config.per_lane_cap))
}

fn distribute<R: Rng>(total: u32, lanes: usize, config: &WaveConfig, rng: &mut R) -> Vec<u32> {
    let lane_count = lanes as u32;
    let base = total / lane_count;
    let remainder = (total % lane_count) as usize;
    let mut counts = vec![base; lanes];
    for slot in counts.iter_mut().take(remainder) {
        *slot += 1;
    }

    if lanes > 1 {
        let transfers = (f64::from(total) * config.smoothing.clamp(0.0, 1.0)).floor() as u32;
        for _ in 0..transfers {
            let from = rng.gen_range(0..lanes);
            let to = rng.gen_range(0..lanes);
            if from != to && counts[from] > 0 {
                counts[from] -= 1;
                counts[to] += 1;
            }
        }
    }
    counts
}

fn enforce_minimum(counts: &mut [u32], minimum: u32) {
    if minimum == 0 {
        return;
    }
    for index in 0..counts.len() {
        while counts[index] < minimum {
            let Some(donor) = (0..counts.len()).find(|&d| d != index && counts[d] > minimum)
            else {
                break;
            };
            counts[donor] -= 1;
            counts[index] += 1;
        }
    }
}

/// Interpolates a roster index from the wave number, choosing between the
/// two neighbouring subtypes by weighted random so the mix never locks into
/// a single entry mid-ramp.
fn select_subtype<R: Rng>(config: &WaveConfig, wave: u32, rng: &mut R) -> usize {
    let last = config.roster.len() - 1;
    if last == 0 {
        return 0;
    }
    let max_wave = config.max_scaling_wave.max(1);
    let progress = f64::from(wave.min(max_wave)) / f64::from(max_wave);
    let position = progress * last as f64;
    let lower = (position.floor() as usize).min(last);
    let upper = (position.ceil() as usize).min(last);
    if lower == upper {
        return lower;
    }
    let fraction = (position - lower as f64).clamp(0.0, 1.0);
    if rng.gen_bool(fraction) {
        upper
    } else {
        lower
    }
}
