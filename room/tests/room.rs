use std::sync::Arc;
use std::time::Duration;

use castle_defence_core::{
    Abilities, GridConfig, NoUpgrades, PlayerName, RoomConfig, RoomId, SimulationError, UnitSpec,
    WaveConfig,
};
use castle_defence_room::{launch, RoomDirectory, RoomEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::time::timeout;

fn alice() -> PlayerName {
    PlayerName::new("Alice")
}

/// Config tuned so an undefended castle falls within a fraction of a second.
fn fast_config() -> RoomConfig {
    RoomConfig {
        grid: GridConfig {
            columns: 3,
            min_rows: 1,
        },
        wave: WaveConfig {
            base: 3,
            interval_secs: 1,
            roster: vec![UnitSpec::new("rat", 10, 2, Abilities::none())],
            ..WaveConfig::default()
        },
        initial_castle_hp: 4,
        combat_interval: Duration::from_millis(30),
        countdown_interval: Duration::from_millis(10),
        ..RoomConfig::default()
    }
}

#[tokio::test]
async fn lobby_accepts_setup_commands_before_start() {
    let handle = launch(
        RoomId::new("lobby"),
        vec![alice()],
        RoomConfig::default(),
        Arc::new(NoUpgrades),
        1,
    )
    .expect("launch");

    let snapshot = handle.snapshot().await.expect("room alive");
    assert_eq!(snapshot.castle_health[&alice()], 100);
    assert_eq!(snapshot.wave, 1);
    assert!(snapshot.units.is_empty());

    let spawned = handle
        .spawn_player_unit(0, alice(), "footman")
        .await
        .expect("room alive")
        .expect("valid spawn");
    assert_eq!(spawned.col, 1);
    assert_eq!(spawned.owner, Some(alice()));

    assert!(matches!(
        handle
            .spawn_player_unit(0, alice(), "dragon")
            .await
            .expect("room alive"),
        Err(SimulationError::UnknownUnitKind(_))
    ));

    assert!(handle.stop().await);
}

#[tokio::test]
async fn overrun_room_broadcasts_game_over_and_cancels_tickers() {
    let handle = launch(
        RoomId::new("doomed"),
        vec![alice()],
        fast_config(),
        Arc::new(NoUpgrades),
        7,
    )
    .expect("launch");
    let mut events = handle.subscribe();

    // Stand-in for an externally-owned economy ticker: aborting it drops
    // the probe sender.
    let (probe_tx, probe_rx) = oneshot::channel::<()>();
    let ticker = tokio::spawn(async move {
        let _probe = probe_tx;
        std::future::pending::<()>().await
    });
    assert!(handle.adopt_ticker(ticker).await);
    assert!(handle.start().await);

    let mut saw_contact = false;
    let report = timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(RoomEvent::Contact(_)) => saw_contact = true,
                Ok(RoomEvent::Resolved { .. }) => {
                    assert!(saw_contact, "resolve broadcast cannot precede contact");
                }
                Ok(RoomEvent::GameOver(report)) => break report,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event stream closed before game over"),
            }
        }
    })
    .await
    .expect("game over within timeout");

    assert_eq!(report.castle_health[&alice()], 0);
    assert!(report.combat_ticks > 0);
    assert!(report.wave_reached > 1, "at least one wave spawned");

    let aborted = timeout(Duration::from_secs(5), probe_rx)
        .await
        .expect("adopted ticker cancelled at teardown");
    assert!(aborted.is_err(), "abort drops the ticker's probe sender");

    timeout(Duration::from_secs(5), async {
        while !handle.is_closed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("room task ends after game over");
}

#[tokio::test]
async fn stopping_in_the_phase_gap_cancels_the_pending_resolve() {
    let config = RoomConfig {
        grid: GridConfig {
            columns: 4,
            min_rows: 1,
        },
        combat_interval: Duration::from_millis(200),
        countdown_interval: Duration::from_secs(3600),
        ..RoomConfig::default()
    };
    let handle = launch(
        RoomId::new("gap"),
        vec![alice()],
        config,
        Arc::new(NoUpgrades),
        3,
    )
    .expect("launch");
    let mut events = handle.subscribe();
    assert!(handle.start().await);

    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(RoomEvent::Contact(_)) => break,
                Ok(_) => {}
                Err(error) => panic!("event stream ended early: {error}"),
            }
        }
    })
    .await
    .expect("phase-1 broadcast");

    // The room is now inside the half-interval gap with phase 2 pending.
    assert!(handle.stop().await);

    let leaked = timeout(Duration::from_millis(500), async {
        loop {
            match events.recv().await {
                Ok(RoomEvent::Resolved { .. }) => break true,
                Ok(_) => {}
                Err(_) => break false,
            }
        }
    })
    .await;
    assert!(
        matches!(leaked, Ok(false) | Err(_)),
        "phase 2 must not land on a torn-down room"
    );
}

#[tokio::test]
async fn directory_rooms_are_fully_independent() {
    let directory = RoomDirectory::new(42);
    let config = RoomConfig::default();
    let bob = PlayerName::new("Bob");

    let room_a = directory
        .create(
            RoomId::new("a"),
            vec![alice()],
            config.clone(),
            Arc::new(NoUpgrades),
        )
        .expect("room a");
    let room_b = directory
        .create(
            RoomId::new("b"),
            vec![bob.clone()],
            config.clone(),
            Arc::new(NoUpgrades),
        )
        .expect("room b");
    assert_eq!(directory.len(), 2);

    assert!(matches!(
        directory.create(
            RoomId::new("a"),
            vec![alice()],
            config,
            Arc::new(NoUpgrades)
        ),
        Err(SimulationError::DuplicateRoom(_))
    ));

    let snapshot_a = room_a.snapshot().await.expect("room a alive");
    let snapshot_b = room_b.snapshot().await.expect("room b alive");
    assert!(snapshot_a.castle_health.contains_key(&alice()));
    assert!(!snapshot_a.castle_health.contains_key(&bob));
    assert!(snapshot_b.castle_health.contains_key(&bob));

    assert!(directory.stop(&RoomId::new("a")).await);
    assert!(!directory.stop(&RoomId::new("a")).await, "already removed");
    assert_eq!(directory.len(), 1);
    assert!(directory.get(&RoomId::new("b")).is_some());
    assert!(directory.stop(&RoomId::new("b")).await);
    assert!(directory.is_empty());
}
