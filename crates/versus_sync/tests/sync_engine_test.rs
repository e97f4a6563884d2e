//! End-to-end engine behavior over the in-process hub.

mod common;

use std::time::Duration;

use common::{
    CountingStore, GatedStore, Hold, RacingJoin, engine, engine_via, hub, joined_pair, settle,
    wait_for, wait_for_version,
};
use versus_sync::{ConditionalStore, ConnectionStatus, SyncErrorKind, SyncOptions};
use versus_tictactoe::{Cell, Mark, MatchId, MatchStatus};

#[tokio::test]
async fn test_create_match_binds_waiting_state() {
    let hub = hub();
    let alice = engine(&hub);

    let created = alice.create_match("Alice").await.expect("create");

    assert_eq!(created.status, MatchStatus::Waiting);
    assert_eq!(created.player_x.as_deref(), Some("Alice"));
    assert_eq!(created.player_o, None);
    assert_eq!(created.turn, Mark::X);
    assert_eq!(created.version, 0);
    assert!(created.board.is_clear());

    let view = alice.view();
    assert_eq!(view.match_id, Some(created.id.clone()));
    assert_eq!(view.state, Some(created));
    assert_eq!(view.connection, ConnectionStatus::Online);
}

#[tokio::test]
async fn test_join_claims_second_slot_and_notifies_creator() {
    let hub = hub();
    let alice = engine(&hub);
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");

    let joined = bob
        .join_match(created.id.clone(), "Bob")
        .await
        .expect("join");

    assert_eq!(joined.status, MatchStatus::InProgress);
    assert_eq!(joined.player_o.as_deref(), Some("Bob"));
    assert_eq!(joined.version, created.version + 1);

    let seen = wait_for_version(&alice, joined.version).await;
    assert_eq!(seen.state, Some(joined));
}

#[tokio::test]
async fn test_join_rejects_taken_slot() {
    let hub = hub();
    let (alice, _bob, joined) = joined_pair(&hub).await;
    let carol = engine(&hub);

    let err = carol
        .join_match(joined.id.clone(), "Carol")
        .await
        .expect_err("slot taken");
    assert_eq!(err.kind(), SyncErrorKind::AlreadyJoined);

    let stored = alice.resync().await.expect("resync");
    assert_eq!(stored.player_o.as_deref(), Some("Bob"));
    assert_eq!(stored.version, joined.version);
}

#[tokio::test]
async fn test_join_missing_match_is_not_found() {
    let hub = hub();
    let bob = engine(&hub);

    let err = bob
        .join_match(MatchId::from("no-such-match"), "Bob")
        .await
        .expect_err("missing");
    assert_eq!(err.kind(), SyncErrorKind::NotFound);
    assert_eq!(bob.match_id(), None);
}

#[tokio::test]
async fn test_join_catches_up_on_write_before_subscribe() {
    let hub = hub();
    let alice = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let racing = RacingJoin::new(&hub, 4);
    let bob = engine_via(racing, &hub, SyncOptions::default());

    let current = bob
        .join_match(created.id.clone(), "Bob")
        .await
        .expect("join");

    assert_eq!(current.version, created.version + 2);
    assert_eq!(current.board.get(4), Some(Cell::Taken(Mark::X)));
    assert_eq!(bob.authoritative(), Some(current.clone()));
    assert_eq!(bob.view().version(), Some(current.version));

    let err = bob.submit_move(4, Mark::O).await.expect_err("occupied");
    assert_eq!(err.kind(), SyncErrorKind::CellOccupied);
}

#[tokio::test]
async fn test_full_game_to_a_row_win() {
    let hub = hub();
    let (alice, bob, joined) = joined_pair(&hub).await;

    let moves = [(0, Mark::X), (3, Mark::O), (1, Mark::X), (4, Mark::O), (2, Mark::X)];
    let mut last = joined.clone();
    for (index, mark) in moves {
        let (mover, watcher) = match mark {
            Mark::X => (&alice, &bob),
            Mark::O => (&bob, &alice),
        };
        last = mover.submit_move(index, mark).await.expect("legal move");
        wait_for_version(watcher, last.version).await;
    }

    assert_eq!(last.status, MatchStatus::Finished);
    assert_eq!(last.score_x, 1);
    assert_eq!(last.score_o, 0);
    assert_eq!(last.turn, Mark::X, "winner keeps the turn");
    assert_eq!(last.last_move_by, Some(Mark::X));
    assert_eq!(last.version, joined.version + 5);
    for index in [0, 1, 2] {
        assert_eq!(last.board.get(index), Some(Cell::Taken(Mark::X)));
    }

    assert_eq!(bob.authoritative(), Some(last.clone()));
    assert_eq!(alice.authoritative(), Some(last));
}

#[tokio::test]
async fn test_move_after_win_is_finished_without_store_call() {
    let hub = hub();
    let counting = CountingStore::new(&hub);
    let alice = engine_via(counting.clone(), &hub, SyncOptions::default());
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id, "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;

    let moves = [(0, Mark::X), (3, Mark::O), (1, Mark::X), (4, Mark::O), (2, Mark::X)];
    for (index, mark) in moves {
        let (mover, watcher) = match mark {
            Mark::X => (&alice, &bob),
            Mark::O => (&bob, &alice),
        };
        let state = mover.submit_move(index, mark).await.expect("legal move");
        wait_for_version(watcher, state.version).await;
    }
    let finished = alice.authoritative().expect("held");
    assert_eq!(finished.status, MatchStatus::Finished);
    let updates = counting.update_count();

    let err = alice.submit_move(5, Mark::X).await.expect_err("finished");
    assert_eq!(err.kind(), SyncErrorKind::GameFinished);
    assert_eq!(counting.update_count(), updates);
    assert_eq!(alice.authoritative(), Some(finished.clone()));
    assert_eq!(alice.view().pending_cell, None);

    let stored = hub
        .store()
        .fetch(&finished.id)
        .await
        .expect("fetch")
        .expect("row");
    assert_eq!(stored, finished);
}

#[tokio::test]
async fn test_full_game_to_a_draw() {
    let hub = hub();
    let (alice, bob, joined) = joined_pair(&hub).await;

    let moves = [
        (0, Mark::X),
        (1, Mark::O),
        (2, Mark::X),
        (4, Mark::O),
        (3, Mark::X),
        (5, Mark::O),
        (7, Mark::X),
        (6, Mark::O),
        (8, Mark::X),
    ];
    let mut last = joined.clone();
    for (index, mark) in moves {
        let (mover, watcher) = match mark {
            Mark::X => (&alice, &bob),
            Mark::O => (&bob, &alice),
        };
        last = mover.submit_move(index, mark).await.expect("legal move");
        wait_for_version(watcher, last.version).await;
    }

    assert_eq!(last.status, MatchStatus::Finished);
    assert!(last.board.is_full());
    assert_eq!((last.score_x, last.score_o), (0, 0));
    assert_eq!(last.turn, Mark::O, "turn flips after a draw");

    let err = bob.submit_move(0, Mark::O).await.expect_err("board full");
    assert_eq!(err.kind(), SyncErrorKind::CellOccupied);
    assert_eq!(bob.authoritative(), Some(last));
}

#[tokio::test]
async fn test_reset_board_after_win_keeps_scores() {
    let hub = hub();
    let (alice, bob, _) = joined_pair(&hub).await;
    for (index, mark) in [(0, Mark::X), (3, Mark::O), (1, Mark::X), (4, Mark::O), (2, Mark::X)] {
        let (mover, watcher) = match mark {
            Mark::X => (&alice, &bob),
            Mark::O => (&bob, &alice),
        };
        let state = mover.submit_move(index, mark).await.expect("legal move");
        wait_for_version(watcher, state.version).await;
    }
    let finished = bob.authoritative().expect("held");

    let reset = bob.reset_board().await.expect("reset");

    assert!(reset.board.is_clear());
    assert_eq!(reset.status, MatchStatus::InProgress);
    assert_eq!(reset.turn, Mark::O, "loser of the last game starts");
    assert_eq!(reset.score_x, finished.score_x);
    assert_eq!(reset.score_o, finished.score_o);
    assert_eq!(reset.version, finished.version + 1);

    let seen = wait_for_version(&alice, reset.version).await;
    assert_eq!(seen.state, Some(reset));
}

#[tokio::test]
async fn test_reset_scores_returns_to_waiting() {
    let hub = hub();
    let (alice, bob, _) = joined_pair(&hub).await;
    let moved = alice.submit_move(4, Mark::X).await.expect("move");
    wait_for_version(&bob, moved.version).await;

    let reset = bob.reset_scores().await.expect("reset");

    assert!(reset.board.is_clear());
    assert_eq!(reset.status, MatchStatus::Waiting);
    assert_eq!(reset.turn, Mark::X);
    assert_eq!((reset.score_x, reset.score_o), (0, 0));
    assert_eq!(reset.last_move_by, None);
    assert_eq!(reset.player_x.as_deref(), Some("Alice"));
    assert_eq!(reset.player_o.as_deref(), Some("Bob"));
    assert_eq!(reset.version, moved.version + 1);
}

#[tokio::test]
async fn test_concurrent_moves_on_same_version_conflict() {
    let hub = hub();
    let (alice, _bob, joined) = joined_pair(&hub).await;
    let alice_tab = engine(&hub);
    alice_tab.bind(joined.id.clone()).await.expect("bind");

    let (first, second) = tokio::join!(
        alice.submit_move(4, Mark::X),
        alice_tab.submit_move(4, Mark::X)
    );

    let (winner, loser_err, loser) = match (first, second) {
        (Ok(state), Err(err)) => (state, err, &alice_tab),
        (Err(err), Ok(state)) => (state, err, &alice),
        other => panic!("expected exactly one winner, got {:?}", other),
    };
    assert_eq!(loser_err.kind(), SyncErrorKind::Conflict);
    assert_eq!(winner.version, joined.version + 1);
    assert_eq!(loser.authoritative(), Some(winner.clone()));

    let view = loser.view();
    assert_eq!(view.pending_cell, None);
    assert_eq!(view.state, Some(winner));
}

#[tokio::test]
async fn test_push_newer_than_write_response_wins() {
    let hub = hub();
    let gate = GatedStore::new(&hub, Hold::AfterWrite);
    let alice = engine_via(gate.clone(), &hub, SyncOptions::default());
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id, "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;

    let submitting = alice.clone();
    let write = tokio::spawn(async move { submitting.submit_move(0, Mark::X).await });
    gate.entered().await;

    // Alice's write has landed; Bob answers before her response arrives.
    wait_for_version(&bob, joined.version + 1).await;
    let answer = bob.submit_move(4, Mark::O).await.expect("answer");
    assert_eq!(answer.version, joined.version + 2);
    let seen = wait_for_version(&alice, answer.version).await;
    assert_eq!(seen.pending_cell, None);

    gate.release();
    let written = write.await.expect("task").expect("applied");
    assert_eq!(written.version, joined.version + 1);

    assert_eq!(alice.authoritative(), Some(answer.clone()));
    assert_eq!(alice.view().state, Some(answer));
}

#[tokio::test]
async fn test_push_during_slow_write_turns_into_conflict() {
    let hub = hub();
    let gate = GatedStore::new(&hub, Hold::BeforeWrite);
    let alice = engine_via(gate.clone(), &hub, SyncOptions::default());
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id.clone(), "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;
    let alice_tab = engine(&hub);
    alice_tab.bind(created.id).await.expect("bind");

    let submitting = alice.clone();
    let write = tokio::spawn(async move { submitting.submit_move(0, Mark::X).await });
    gate.entered().await;
    let pending = alice.view();
    assert_eq!(pending.pending_cell, Some(0));
    assert_eq!(pending.version(), Some(joined.version + 1));

    let rival = alice_tab.submit_move(1, Mark::X).await.expect("rival move");
    let seen = wait_for(&alice, |view| {
        view.pending_cell.is_none() && view.version() == Some(rival.version)
    })
    .await;
    assert_eq!(seen.state, Some(rival.clone()));

    gate.release();
    let err = write.await.expect("task").expect_err("stale write");
    assert_eq!(err.kind(), SyncErrorKind::Conflict);

    let held = alice.authoritative().expect("held");
    assert_eq!(held, rival);
    assert_eq!(held.board.get(0), Some(Cell::Empty));
    assert_eq!(held.board.get(1), Some(Cell::Taken(Mark::X)));
}

#[tokio::test]
async fn test_transport_failure_rolls_back_without_refetch() {
    let hub = hub();
    let failing = CountingStore::failing(&hub);
    let alice = engine_via(failing.clone(), &hub, SyncOptions::default());
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id, "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;
    let fetches = failing.fetch_count();

    let err = alice.submit_move(4, Mark::X).await.expect_err("transport");

    assert_eq!(err.kind(), SyncErrorKind::TransportError);
    assert_eq!(failing.update_count(), 1);
    assert_eq!(failing.fetch_count(), fetches, "no re-fetch after transport failure");
    let view = alice.view();
    assert_eq!(view.state, Some(joined));
    assert_eq!(view.pending_cell, None);
    assert!(view.last_error.is_some());
}

#[tokio::test]
async fn test_slow_store_times_out_as_transport_error() {
    let hub = hub();
    let gate = GatedStore::new(&hub, Hold::BeforeWrite);
    let options = SyncOptions::default().with_submit_timeout(Some(Duration::from_millis(50)));
    let alice = engine_via(gate.clone(), &hub, options);
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id, "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;

    let err = alice.submit_move(4, Mark::X).await.expect_err("timeout");

    assert_eq!(err.kind(), SyncErrorKind::TransportError);
    let view = alice.view();
    assert_eq!(view.state, Some(joined));
    assert_eq!(view.pending_cell, None);

    // Rolled back and idle again; the next move goes through.
    let moved = alice.submit_move(4, Mark::X).await.expect("retry");
    assert_eq!(moved.board.get(4), Some(Cell::Taken(Mark::X)));
}

#[tokio::test]
async fn test_local_rejections_never_reach_the_store() {
    let hub = hub();
    let counting = CountingStore::new(&hub);
    let alice = engine_via(counting.clone(), &hub, SyncOptions::default());
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id, "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;

    let cases = [
        (9, Mark::X, SyncErrorKind::InvalidIndex),
        (4, Mark::O, SyncErrorKind::OutOfTurn),
    ];
    for (index, mark, kind) in cases {
        let err = alice.submit_move(index, mark).await.expect_err("rejected");
        assert_eq!(err.kind(), kind);
    }
    assert_eq!(counting.update_count(), 0);

    let moved = alice.submit_move(4, Mark::X).await.expect("move");
    assert_eq!(counting.update_count(), 1);
    wait_for_version(&bob, moved.version).await;

    for _ in 0..2 {
        let err = bob.submit_move(4, Mark::O).await.expect_err("occupied");
        assert_eq!(err.kind(), SyncErrorKind::CellOccupied);
    }
    assert_eq!(bob.authoritative(), Some(moved.clone()));
    assert_eq!(alice.authoritative(), Some(moved));
    assert_eq!(counting.update_count(), 1);
}

#[tokio::test]
async fn test_second_submission_while_pending_is_rejected() {
    let hub = hub();
    let gate = GatedStore::new(&hub, Hold::BeforeWrite);
    let alice = engine_via(gate.clone(), &hub, SyncOptions::default());
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id, "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;

    let submitting = alice.clone();
    let write = tokio::spawn(async move { submitting.submit_move(0, Mark::X).await });
    gate.entered().await;

    let err = alice.submit_move(8, Mark::X).await.expect_err("pending");
    assert_eq!(err.kind(), SyncErrorKind::CellOccupied);
    let err = alice.reset_board().await.expect_err("pending");
    assert_eq!(err.kind(), SyncErrorKind::CellOccupied);
    assert_eq!(alice.view().pending_cell, Some(0));

    gate.release();
    let written = write.await.expect("task").expect("applied");
    assert_eq!(written.board.get(0), Some(Cell::Taken(Mark::X)));
    assert_eq!(written.board.get(8), Some(Cell::Empty));
}

#[tokio::test]
async fn test_reconnect_refetches_missed_changes() {
    let hub = hub();
    let (alice, _bob, joined) = joined_pair(&hub).await;

    hub.disconnect(&joined.id);
    let offline = wait_for(&alice, |view| view.connection == ConnectionStatus::Error).await;
    assert!(offline.is_reconnecting());

    let alice_tab = engine(&hub);
    alice_tab.bind(joined.id.clone()).await.expect("bind");
    let moved = alice_tab.submit_move(4, Mark::X).await.expect("move");
    settle().await;
    assert_eq!(alice.view().version(), Some(joined.version), "push was not delivered");

    hub.reconnect(&joined.id);
    let caught_up = wait_for(&alice, |view| {
        view.connection == ConnectionStatus::Online && view.version() == Some(moved.version)
    })
    .await;
    assert_eq!(caught_up.state, Some(moved));
}

#[tokio::test]
async fn test_channel_failure_reports_and_recovers() {
    let hub = hub();
    let (alice, bob, joined) = joined_pair(&hub).await;

    hub.fail(&joined.id, "socket reset");
    let failed = wait_for(&alice, |view| view.connection == ConnectionStatus::Error).await;
    assert_eq!(failed.last_error.as_deref(), Some("socket reset"));

    let moved = alice.submit_move(0, Mark::X).await.expect("move");
    assert_eq!(moved.version, joined.version + 1);

    hub.reconnect(&joined.id);
    let caught_up = wait_for(&bob, |view| {
        view.connection == ConnectionStatus::Online && view.version() == Some(moved.version)
    })
    .await;
    assert_eq!(caught_up.state, Some(moved));
}

#[tokio::test]
async fn test_unbind_stops_events_and_subscription() {
    let hub = hub();
    let (alice, bob, joined) = joined_pair(&hub).await;
    assert_eq!(hub.subscriber_count(&joined.id), 2);

    alice.unbind();
    let view = alice.view();
    assert_eq!(view.connection, ConnectionStatus::Idle);
    assert_eq!(view.state, None);
    assert_eq!(view.match_id, None);
    assert_eq!(hub.subscriber_count(&joined.id), 1);

    let moved = bob.reset_board().await.expect("reset");
    settle().await;
    assert_eq!(alice.view().state, None);
    assert_eq!(bob.authoritative(), Some(moved));

    let err = alice.submit_move(0, Mark::X).await.expect_err("unbound");
    assert_eq!(err.kind(), SyncErrorKind::NotFound);
}

#[tokio::test]
async fn test_rebind_discards_stale_fetch() {
    let hub = hub();
    let seed = engine(&hub);
    let first = seed.create_match("Alice").await.expect("first");
    let second = seed.create_match("Carol").await.expect("second");

    let gate = GatedStore::new(&hub, Hold::Fetch);
    let viewer = engine_via(gate.clone(), &hub, SyncOptions::default());

    let binding = viewer.clone();
    let first_id = first.id.clone();
    let stale = tokio::spawn(async move { binding.bind(first_id).await });
    gate.entered().await;

    let current = viewer.bind(second.id.clone()).await.expect("rebind");
    assert_eq!(current, second);
    assert_eq!(hub.subscriber_count(&first.id), 0);

    gate.release();
    let err = stale.await.expect("task").expect_err("superseded");
    assert_eq!(err.kind(), SyncErrorKind::Superseded);

    let view = viewer.view();
    assert_eq!(view.match_id, Some(second.id.clone()));
    assert_eq!(view.state, Some(second));
    assert_eq!(hub.subscriber_count(&first.id), 0);
}

#[tokio::test]
async fn test_bind_missing_match_is_terminal() {
    let hub = hub();
    let viewer = engine(&hub);
    let missing = MatchId::from("gone");

    let err = viewer.bind(missing.clone()).await.expect_err("missing");
    assert_eq!(err.kind(), SyncErrorKind::NotFound);

    let view = viewer.view();
    assert_eq!(view.connection, ConnectionStatus::Error);
    assert_eq!(view.state, None);
    assert!(view.last_error.is_some());

    let err = viewer.submit_move(0, Mark::X).await.expect_err("unavailable");
    assert_eq!(err.kind(), SyncErrorKind::NotFound);

    hub.reconnect(&missing);
    settle().await;
    assert_eq!(viewer.view().connection, ConnectionStatus::Error);
}

#[tokio::test]
async fn test_reset_on_stale_version_conflicts() {
    let hub = hub();
    let gate = GatedStore::new(&hub, Hold::BeforeWrite);
    let alice = engine_via(gate.clone(), &hub, SyncOptions::default());
    let bob = engine(&hub);
    let created = alice.create_match("Alice").await.expect("create");
    let joined = bob.join_match(created.id, "Bob").await.expect("join");
    wait_for_version(&alice, joined.version).await;

    let resetting = alice.clone();
    let reset = tokio::spawn(async move { resetting.reset_scores().await });
    gate.entered().await;
    let rival = bob.reset_board().await.expect("bob resets first");

    gate.release();
    let err = reset.await.expect("task").expect_err("stale");
    assert_eq!(err.kind(), SyncErrorKind::Conflict);
    assert_eq!(alice.authoritative(), Some(rival));
}
