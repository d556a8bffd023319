//! Performance benchmarks for the synchronization hot paths

use client::Synchronizer;
use server::action_log::ActionLog;
use server::store::MemoryStore;
use shared::{Action, GridState, Identity, ListKind, MarchingBands, SegmentSet, DEFAULT_GRID_SIZE};
use std::time::Instant;

/// Channel that accepts every frame and forgets it
struct NullChannel;

impl client::Channel for NullChannel {
    fn send(&mut self, _message: &str) -> bool {
        true
    }
}

fn edits(count: usize) -> Vec<Action> {
    (0..count)
        .map(|i| {
            let row = i % DEFAULT_GRID_SIZE;
            let col = (i / DEFAULT_GRID_SIZE) % DEFAULT_GRID_SIZE;
            if i % 5 == 0 {
                Action::clear_cell(row, col)
            } else {
                Action::set_cell(row, col, ((b'A' + (i % 26) as u8) as char).to_string())
            }
        })
        .collect()
}

/// Benchmarks decoding of confirmed frames as they arrive from the server
#[test]
fn benchmark_frame_decoding() {
    let frames: Vec<String> = edits(10_000)
        .into_iter()
        .enumerate()
        .map(|(seq, action)| {
            action
                .with_actor("0123456789abcdef")
                .with_sequence(seq as i64)
                .encode()
        })
        .collect();

    let start = Instant::now();
    for frame in &frames {
        let action = Action::decode(frame).unwrap();
        assert!(action.is_confirmed());
    }
    let duration = start.elapsed();
    println!(
        "Frame decoding: {} frames in {:?} ({:.2} μs/frame)",
        frames.len(),
        duration,
        duration.as_micros() as f64 / frames.len() as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks applying edits to a full-size grid
#[test]
fn benchmark_grid_apply() {
    let mut grid = GridState::new("bench", &MarchingBands::new(DEFAULT_GRID_SIZE));
    let actions = edits(10_000);

    let start = Instant::now();
    for action in &actions {
        grid.check_bounds(action).unwrap();
        grid.apply(action);
    }
    let duration = start.elapsed();
    println!(
        "Grid apply: {} actions in {:?} ({:.2} μs/action)",
        actions.len(),
        duration,
        duration.as_micros() as f64 / actions.len() as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks marking and clearing answer segments on one list
#[test]
fn benchmark_segment_marking() {
    let mut segments = SegmentSet::new();
    let iterations = 10_000;

    let start = Instant::now();
    for i in 0..iterations {
        let begin = i % DEFAULT_GRID_SIZE;
        let end = (begin + i % 4).min(DEFAULT_GRID_SIZE - 1);
        if i % 3 == 0 {
            segments.clear_at(begin);
        } else {
            segments.mark(begin, end);
        }
    }
    let duration = start.elapsed();
    println!(
        "Segment marking: {} operations in {:?}, {} segments left",
        iterations,
        duration,
        segments.len()
    );

    // Marked segments never overlap, so a list can never hold more than its length
    assert!(segments.len() <= DEFAULT_GRID_SIZE);
    assert!(duration.as_millis() < 1000);
}

/// Stress tests reconciliation with a long queue of unconfirmed edits
#[test]
fn stress_test_pending_reapply() {
    let geometry = MarchingBands::new(DEFAULT_GRID_SIZE);
    let mut sync = Synchronizer::new("bench", &geometry, Identity::generate(), NullChannel);
    for row in 0..DEFAULT_GRID_SIZE {
        sync.apply_from_ui(Action::mark_segment(ListKind::Row, row, 0, 2))
            .unwrap();
    }

    let remote = edits(1_000);
    let start = Instant::now();
    for (seq, action) in remote.into_iter().enumerate() {
        let frame = action
            .with_actor("fedcba9876543210")
            .with_sequence(seq as i64)
            .encode();
        sync.on_message(&frame).unwrap();
    }
    let duration = start.elapsed();
    println!(
        "Pending reapply: {} remote actions over {} pending in {:?}",
        1_000,
        sync.pending().len(),
        duration
    );

    assert_eq!(sync.last_confirmed_seq(), 999);
    assert_eq!(sync.pending().len(), DEFAULT_GRID_SIZE);
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks appending to and replaying a room's action log
#[test]
fn benchmark_action_log_replay() {
    let log = ActionLog::new(MemoryStore::new());
    let actions = edits(5_000);

    let start = Instant::now();
    tokio_test::block_on(async {
        for action in &actions {
            log.add_action("bench", action).await.unwrap();
        }
    });
    let appended = start.elapsed();

    let start = Instant::now();
    let replayed = tokio_test::block_on(log.get_actions("bench", 0)).unwrap();
    let read = start.elapsed();
    println!(
        "Action log: {} appends in {:?}, replay in {:?}",
        actions.len(),
        appended,
        read
    );

    assert_eq!(replayed.len(), actions.len());
    assert_eq!(replayed.last().unwrap().sequence_number, 4_999);
    assert!((appended + read).as_millis() < 5000);
}
