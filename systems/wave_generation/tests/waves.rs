use castle_defence_core::{Abilities, GridConfig, PlayerName, RoomConfig, UnitSpec, WaveConfig};
use castle_defence_system_wave_generation as waves;
use castle_defence_world::GameState;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn players(list: &[&str]) -> Vec<PlayerName> {
    list.iter().map(|name| PlayerName::new(*name)).collect()
}

fn two_step_roster() -> Vec<UnitSpec> {
    vec![
        UnitSpec::new("rat", 10, 2, Abilities::none()),
        UnitSpec::new("demon", 55, 12, Abilities::none()),
    ]
}

fn config(wave: WaveConfig) -> RoomConfig {
    RoomConfig {
        grid: GridConfig {
            columns: 6,
            min_rows: 2,
        },
        wave,
        ..RoomConfig::default()
    }
}

#[test]
fn spawned_count_matches_the_sizing_formula() {
    let wave_config = WaveConfig {
        roster: two_step_roster(),
        ..WaveConfig::default()
    };
    let config = config(wave_config.clone());
    let names = players(&["Alice", "Bob"]);
    let mut state = GameState::new(&names, None, &config).expect("state");
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    let expected = waves::wave_size(&wave_config, state.wave(), 2);
    let spawned = waves::spawn_wave(&mut state, &wave_config, &mut rng);

    assert_eq!(spawned.len() as u32, expected);
    assert_eq!(state.wave(), 2, "wave counter advances per spawn event");
    let spawn_col = state.grid().portal_adjacent_col();
    for unit in &spawned {
        assert_eq!(unit.col, spawn_col);
        assert!(
            state
                .units()
                .get(unit.id)
                .expect("registered unit")
                .just_spawned(),
            "fresh enemies owe one tick of spawn delay"
        );
    }
}

#[test]
fn dead_lanes_receive_no_enemies() {
    let wave_config = WaveConfig {
        roster: two_step_roster(),
        min_per_lane: 1,
        ..WaveConfig::default()
    };
    let config = config(wave_config.clone());
    let names = players(&["Alice", "Bob"]);
    let mut state = GameState::new(&names, None, &config).expect("state");
    state.apply_castle_damage(0, 1_000).expect("fell Alice");
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    let spawned = waves::spawn_wave(&mut state, &wave_config, &mut rng);

    assert!(!spawned.is_empty());
    assert!(spawned.iter().all(|unit| unit.row == 1));
}

#[test]
fn no_alive_lanes_produce_an_empty_wave() {
    let wave_config = WaveConfig {
        roster: two_step_roster(),
        ..WaveConfig::default()
    };
    let config = config(wave_config.clone());
    let names = players(&["Alice"]);
    let mut state = GameState::new(&names, None, &config).expect("state");
    state.apply_castle_damage(0, 1_000).expect("fell Alice");
    let mut rng = ChaCha8Rng::seed_from_u64(11);

    let spawned = waves::spawn_wave(&mut state, &wave_config, &mut rng);

    assert!(spawned.is_empty());
    assert_eq!(state.wave(), 2, "the spawn event still counts");
}

#[test]
fn every_alive_lane_receives_the_configured_minimum() {
    let wave_config = WaveConfig {
        roster: two_step_roster(),
        min_per_lane: 2,
        smoothing: 1.0,
        base: 12,
        ..WaveConfig::default()
    };
    let config = config(wave_config.clone());
    let names = players(&["Alice", "Bob", "Carol"]);
    let mut state = GameState::new(&names, None, &config).expect("state");
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    let spawned = waves::spawn_wave(&mut state, &wave_config, &mut rng);

    for lane in 0..3 {
        let in_lane = spawned.iter().filter(|unit| unit.row == lane).count();
        assert!(
            in_lane >= 2,
            "lane {lane} received {in_lane} enemies, below the minimum"
        );
    }
}

#[test]
fn subtype_mix_reaches_the_hardest_entry_at_the_scaling_cap() {
    let wave_config = WaveConfig {
        roster: two_step_roster(),
        max_scaling_wave: 3,
        ..WaveConfig::default()
    };
    let config = config(wave_config.clone());
    let names = players(&["Alice"]);
    let mut state = GameState::new(&names, None, &config).expect("state");
    state.advance_wave();
    state.advance_wave();
    assert_eq!(state.wave(), 3);
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    let spawned = waves::spawn_wave(&mut state, &wave_config, &mut rng);

    assert!(!spawned.is_empty());
    assert!(spawned.iter().all(|unit| unit.label == "demon"));
}

#[test]
fn generation_is_deterministic_under_a_fixed_seed() {
    let wave_config = WaveConfig {
        roster: two_step_roster(),
        ..WaveConfig::default()
    };
    let config = config(wave_config.clone());
    let names = players(&["Alice", "Bob"]);

    let mut first_state = GameState::new(&names, None, &config).expect("state");
    let mut second_state = GameState::new(&names, None, &config).expect("state");
    let mut first_rng = ChaCha8Rng::seed_from_u64(21);
    let mut second_rng = ChaCha8Rng::seed_from_u64(21);

    let first = waves::spawn_wave(&mut first_state, &wave_config, &mut first_rng);
    let second = waves::spawn_wave(&mut second_state, &wave_config, &mut second_rng);

    assert_eq!(first, second);
}
