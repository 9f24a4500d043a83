//! Whole games driven in one process.
//!
//! The coordinator loop runs on the test thread against real shared segments.
//! Players and the observer run on their own threads with their own
//! attachments, and each player's move channel is one end of a `UnixStream`
//! pair, exactly as a child's stdout pipe would be.

use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use shm_arena::arena::Arena;
use shm_arena::config::SegmentNames;
use shm_arena::coordinator::{Coordinator, EndReason, GameSummary, LoopSettings};
use shm_arena::input::{PlayerInput, spawn_channel_reader};
use shm_arena::observer::ObserverClient;
use shm_arena::player::{PlayerClient, PlayerExit, StrategyKind};
use shm_arena::setup::{GameSetup, Placement, initialize};
use shm_arena::state::{GameSnapshot, Position};

struct Seat {
    strategy: StrategyKind,
    max_moves: Option<u32>,
}

impl Seat {
    fn playing(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            max_moves: None,
        }
    }

    fn silent() -> Self {
        Self {
            strategy: StrategyKind::Random,
            max_moves: Some(0),
        }
    }
}

struct Outcome {
    summary: GameSummary,
    players: Vec<(PlayerExit, u32)>,
    frames: Vec<GameSnapshot>,
}

struct Table {
    names: SegmentNames,
    arena: Arena,
}

impl Table {
    fn new(tag: &str, width: u16, height: u16, seed: u64, starts: Vec<Position>) -> Self {
        let names = SegmentNames::unique(tag);
        let arena = Arena::create(&names, width, height).expect("create arena");
        let roster = (0..starts.len()).map(|i| format!("seat-{i}")).collect();
        let setup = GameSetup::new(seed, roster).with_placement(Placement::Fixed(starts));
        initialize(&mut *arena.write().unwrap(), &setup).expect("initialize");
        Self { names, arena }
    }

    fn snapshot(&self) -> GameSnapshot {
        self.arena.read().unwrap().snapshot()
    }

    fn play(&self, seats: Vec<Seat>, settings: LoopSettings, observe: bool) -> Outcome {
        thread::scope(|s| {
            let mut channels = Vec::new();
            let mut players = Vec::new();
            for (index, seat) in seats.into_iter().enumerate() {
                let (player_end, coordinator_end) = UnixStream::pair().expect("socket pair");
                channels.push(spawn_channel_reader(index, coordinator_end).expect("reader"));
                let names = &self.names;
                players.push(s.spawn(move || {
                    let guest = Arena::attach(names).expect("player attach");
                    let strategy = seat.strategy.build(index as u64 + 17);
                    PlayerClient::new(&guest, index, player_end, strategy)
                        .with_max_moves(seat.max_moves)
                        .run()
                        .expect("player loop")
                }));
            }

            let observer = observe.then(|| {
                let names = &self.names;
                s.spawn(move || {
                    let guest = Arena::attach(names).expect("observer attach");
                    let mut frames = Vec::new();
                    ObserverClient::new(&guest)
                        .run(|snapshot| frames.push(snapshot.clone()))
                        .expect("observer loop");
                    frames
                })
            });

            let summary = Coordinator::new(&self.arena, channels, settings)
                .with_observer(observe)
                .run()
                .expect("main loop");

            Outcome {
                summary,
                players: players.into_iter().map(|h| h.join().unwrap()).collect(),
                frames: observer.map(|h| h.join().unwrap()).unwrap_or_default(),
            }
        })
    }
}

fn settings(stall: Duration) -> LoopSettings {
    LoopSettings {
        move_delay: Duration::ZERO,
        stall_timeout: stall,
        render_timeout: Duration::from_secs(5),
    }
}

fn assert_consumed_matches_counters(outcome: &Outcome) {
    for (index, player) in outcome.summary.final_state.players.iter().enumerate() {
        assert_eq!(
            outcome.summary.consumed[index],
            player.valid_moves + player.invalid_moves,
            "player {index} counters disagree with bytes read"
        );
    }
}

#[test]
fn single_player_runs_east_until_blocked() {
    let table = Table::new("scenario-a", 10, 1, 21, vec![Position::new(0, 0)]);
    let before = table.snapshot();
    let expected: u32 = (1..10)
        .map(|x| before.cell(Position::new(x, 0)).points().unwrap())
        .sum();

    let outcome = table.play(
        vec![Seat::playing(StrategyKind::Fixed(2))],
        settings(Duration::from_secs(5)),
        false,
    );

    let me = &outcome.summary.final_state.players[0];
    assert_eq!(me.valid_moves, 9);
    assert_eq!(me.invalid_moves, 0);
    assert_eq!(me.score, expected);
    assert!(me.blocked);
    assert_eq!(outcome.summary.reason, EndReason::AllBlocked);
    assert!(outcome.summary.final_state.game_over);
    assert_eq!(outcome.players[0], (PlayerExit::GameOver, 9));
    assert_consumed_matches_counters(&outcome);
}

#[test]
fn single_player_on_square_board_stalls_at_the_edge() {
    let table = Table::new("scenario-a-square", 10, 10, 22, vec![Position::new(0, 0)]);
    let before = table.snapshot();
    let expected: u32 = (1..10)
        .map(|x| before.cell(Position::new(x, 0)).points().unwrap())
        .sum();

    let outcome = table.play(
        vec![Seat::playing(StrategyKind::Fixed(2))],
        settings(Duration::from_millis(300)),
        false,
    );

    let me = &outcome.summary.final_state.players[0];
    assert_eq!(me.valid_moves, 9);
    assert_eq!(me.score, expected);
    assert_eq!(me.position, Position::new(9, 0));
    assert!(me.invalid_moves > 0);
    assert_eq!(outcome.summary.reason, EndReason::StallTimeout);
    assert_consumed_matches_counters(&outcome);
}

#[test]
fn out_of_range_bytes_only_count_as_invalid_until_the_stall() {
    let table = Table::new(
        "scenario-b",
        10,
        10,
        5,
        vec![Position::new(0, 0), Position::new(9, 9)],
    );
    let before = table.snapshot();

    let outcome = table.play(
        vec![
            Seat::playing(StrategyKind::Fixed(250)),
            Seat::playing(StrategyKind::Fixed(250)),
        ],
        settings(Duration::from_millis(300)),
        false,
    );

    assert_eq!(outcome.summary.reason, EndReason::StallTimeout);
    for player in &outcome.summary.final_state.players {
        assert!(player.invalid_moves > 0);
        assert_eq!(player.valid_moves, 0);
        assert_eq!(player.score, 0);
    }
    assert_eq!(outcome.summary.final_state.board, before.board);
    assert!(outcome
        .players
        .iter()
        .all(|(exit, _)| *exit == PlayerExit::GameOver));
    assert_consumed_matches_counters(&outcome);
}

#[test]
fn closed_channel_blocks_only_that_player() {
    let table = Table::new(
        "scenario-c",
        10,
        10,
        8,
        vec![Position::new(2, 2), Position::new(7, 7)],
    );

    let outcome = table.play(
        vec![Seat::silent(), Seat::playing(StrategyKind::Greedy)],
        settings(Duration::from_secs(2)),
        false,
    );

    let quitter = &outcome.summary.final_state.players[0];
    assert!(quitter.blocked);
    assert_eq!(quitter.valid_moves, 0);
    assert_eq!(quitter.invalid_moves, 0);
    assert_eq!(outcome.summary.consumed[0], 0);
    assert_eq!(outcome.players[0], (PlayerExit::MoveLimit, 0));

    let stayer = &outcome.summary.final_state.players[1];
    assert!(stayer.valid_moves > 0);
    assert!(stayer.score > 0);
    assert_consumed_matches_counters(&outcome);
}

#[test]
fn mutual_block_ends_with_one_final_frame_and_released_players() {
    let table = Table::new(
        "scenario-d",
        10,
        1,
        13,
        vec![Position::new(0, 0), Position::new(9, 0)],
    );

    let outcome = table.play(
        vec![
            Seat::playing(StrategyKind::Greedy),
            Seat::playing(StrategyKind::Greedy),
        ],
        settings(Duration::from_secs(5)),
        true,
    );

    assert_eq!(outcome.summary.reason, EndReason::AllBlocked);
    let state = &outcome.summary.final_state;
    assert!(state.game_over);
    assert!(state.players.iter().all(|p| p.blocked));
    assert_eq!(
        state.players.iter().map(|p| p.valid_moves).sum::<u32>(),
        8,
        "every free cell between the two starts is claimed"
    );
    assert!(state.board.iter().all(|cell| !cell.is_free()));

    // Exactly one frame carries the flag, and it is the last one.
    let flagged = outcome.frames.iter().filter(|f| f.game_over).count();
    assert_eq!(flagged, 1);
    assert!(outcome.frames.last().is_some_and(|f| f.game_over));
    assert_eq!(outcome.summary.frames as usize, outcome.frames.len());
    assert!(!outcome.summary.observer_detached);

    // Flags and counters never regress from one frame to the next.
    for pair in outcome.frames.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        assert!(!earlier.game_over || later.game_over);
        for (a, b) in earlier.players.iter().zip(&later.players) {
            assert!(!a.blocked || b.blocked);
            assert!(b.score >= a.score);
            assert!(b.valid_moves >= a.valid_moves);
            assert!(b.invalid_moves >= a.invalid_moves);
        }
    }

    // Both players returned, so every gate they waited on was opened.
    assert_eq!(outcome.players.len(), 2);
    assert_consumed_matches_counters(&outcome);
}

#[test]
fn game_over_reopens_only_the_gates_of_open_channels() {
    let table = Table::new(
        "gates",
        10,
        10,
        4,
        vec![Position::new(1, 1), Position::new(8, 8)],
    );
    let (quitter_tx, quitter_rx) = crossbeam_channel::bounded::<PlayerInput>(1);
    let (_idle_tx, idle_rx) = crossbeam_channel::bounded::<PlayerInput>(1);
    drop(quitter_tx);

    let summary = Coordinator::new(
        &table.arena,
        vec![quitter_rx, idle_rx],
        settings(Duration::from_millis(100)),
    )
    .run()
    .expect("main loop");

    assert_eq!(summary.reason, EndReason::StallTimeout);
    assert!(summary.final_state.players[0].blocked);
    assert!(!summary.final_state.players[1].blocked);
    assert_eq!(summary.moves_processed, 0);

    // Nobody waits on the gates here, so every opening is still pending:
    // one from the start of the game, plus one at game over for the seat
    // whose channel is still open.
    let turns = table.arena.turns().unwrap();
    assert_eq!(turns.pending(0).unwrap(), 1);
    assert_eq!(turns.pending(1).unwrap(), 2);
}
