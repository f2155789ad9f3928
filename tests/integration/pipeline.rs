//! End-to-end pipeline runs against mock bookies on a paused clock.

use rust_decimal_macros::dec;
use std::time::Duration;
use tokio_test::assert_ok;

use surebet::engine::executor::{ExecState, ExecutionOutcome};
use surebet::engine::PipelineEvent;
use surebet::types::LegId;

use crate::mock_bookie::{arb_legs, make_bookies, make_config, start, wait_for, MockBookie};

fn executed(event: PipelineEvent) -> surebet::engine::executor::ExecutionReport {
    match event {
        PipelineEvent::Executed(report) => report,
        other => panic!("expected Executed, got {other:?}"),
    }
}

fn is_executed(event: &PipelineEvent) -> bool {
    matches!(event, PipelineEvent::Executed(_))
}

fn is_verifying(event: &PipelineEvent) -> bool {
    matches!(event, PipelineEvent::VerifyingStarted { .. })
}

#[tokio::test(start_paused = true)]
async fn test_stable_arbitrage_commits() {
    let bookies = make_bookies();
    for b in &bookies {
        b.configure(|x| x.postulate_delay = Some(Duration::from_millis(2100)));
    }
    let mut h = start(&bookies, make_config(), Vec::new());

    let event = wait_for(&mut h.events, is_verifying).await;
    let PipelineEvent::VerifyingStarted { bookies: involved, candidate } = event else {
        unreachable!()
    };
    assert_eq!(involved, vec!["alpha", "beta", "gamma"]);
    assert_eq!(candidate.signature().0, arb_legs());
    assert_eq!(candidate.profit, dec!(4));
    assert!(bookies.iter().all(|b| b.ledger().fetches() == 5));

    let report = executed(wait_for(&mut h.events, is_executed).await);
    assert_eq!(report.outcome, ExecutionOutcome::Committed);
    assert_eq!(report.placed_count(), 3);

    // Eight ticks elapsed while verifying; none of them fetched.
    assert!(bookies.iter().all(|b| b.ledger().fetches() == 5));

    let stakes: Vec<_> = report.placements.iter().map(|p| p.stake).collect();
    assert_eq!(stakes, vec![dec!(80), dec!(60), dec!(60)]);
    for (bookie, label) in bookies.iter().zip(["1", "X", "2"]) {
        assert_eq!(bookie.ledger().postulated(), vec![label]);
        assert_eq!(bookie.ledger().placed(), vec![label]);
        assert!(bookie.ledger().cleaned().is_empty());
    }

    let status = h.handle.status();
    assert_eq!(status.state, ExecState::Idle);
    assert!(!status.blocked);
    assert_eq!(status.accumulated, 0);

    h.handle.close();
    assert!(assert_ok!(h.task.await).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_states_follow_commit_path() {
    let bookies = make_bookies();
    let mut h = start(&bookies, make_config(), Vec::new());

    let mut states = Vec::new();
    wait_for(&mut h.events, |e| {
        if let PipelineEvent::StateChanged(s) = e {
            states.push(*s);
        }
        is_executed(e)
    })
    .await;

    assert_eq!(
        states,
        vec![
            ExecState::Selected,
            ExecState::Verifying,
            ExecState::Committing,
            ExecState::Idle,
        ]
    );
    h.handle.close();
    assert_ok!(h.task.await);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_leg_aborts_and_cleans_every_leg() {
    let bookies = make_bookies();
    bookies[2].configure(|x| x.invalid = true);
    let mut h = start(&bookies, make_config(), Vec::new());

    let report = executed(wait_for(&mut h.events, is_executed).await);
    assert_eq!(report.outcome, ExecutionOutcome::Aborted);
    assert_eq!(report.invalid_legs(), vec![LegId::new("gamma", "2")]);
    assert!(report.placements.is_empty());

    for (bookie, label) in bookies.iter().zip(["1", "X", "2"]) {
        assert!(bookie.ledger().placed().is_empty());
        assert_eq!(bookie.ledger().cleaned(), vec![label]);
    }

    let status = h.handle.status();
    assert!(!status.blocked);
    assert_eq!(status.accumulated, 0);
    assert_eq!(status.banned, 1);

    // Polling resumes on the next tick.
    let fetched = bookies[0].ledger().fetches();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(bookies[0].ledger().fetches() > fetched);

    h.handle.close();
    assert_eq!(assert_ok!(h.task.await), vec![LegId::new("gamma", "2")]);
}

#[tokio::test(start_paused = true)]
async fn test_abort_without_ban_reaccumulates_from_scratch() {
    let bookies = make_bookies();
    bookies[1].configure(|x| x.invalid = true);
    let mut config = make_config();
    config.ban_on_abort = false;
    let mut h = start(&bookies, config, Vec::new());

    let first = executed(wait_for(&mut h.events, is_executed).await);
    assert_eq!(first.outcome, ExecutionOutcome::Aborted);
    assert_eq!(bookies[0].ledger().fetches(), 5);

    // The window was reset, so a full streak is needed again.
    wait_for(&mut h.events, is_verifying).await;
    assert_eq!(bookies[0].ledger().fetches(), 10);

    h.handle.close();
    assert!(assert_ok!(h.task.await).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_placement_is_partial_and_not_retried() {
    let bookies = make_bookies();
    bookies[1].configure(|x| x.refuse_place = true);
    let mut h = start(&bookies, make_config(), Vec::new());

    let report = executed(wait_for(&mut h.events, is_executed).await);
    assert_eq!(report.outcome, ExecutionOutcome::PartiallyCommitted);
    assert_eq!(report.placed_count(), 2);
    assert!(!report.placements[1].placed);
    assert!(report.placements[1].error.is_some());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(bookies[1].ledger().placed(), vec!["X"]);
    assert!(bookies.iter().all(|b| b.ledger().cleaned().is_empty()));

    h.handle.close();
    assert_ok!(h.task.await);
}

#[tokio::test(start_paused = true)]
async fn test_banned_leg_is_never_selected() {
    let bookies = make_bookies();
    let mut h = start(&bookies, make_config(), vec![LegId::new("beta", "X")]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(bookies[0].ledger().fetches() >= 20);
    assert!(bookies.iter().all(|b| b.ledger().postulated().is_empty()));
    assert!(h.events.try_recv().is_err());

    h.handle.close();
    assert_eq!(assert_ok!(h.task.await), vec![LegId::new("beta", "X")]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_bookie_does_not_stop_others() {
    let bookies = make_bookies();
    bookies[1].configure(|x| x.fail_fetch = true);
    let mut h = start(&bookies, make_config(), Vec::new());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(bookies[0].ledger().fetches() >= 8);
    assert!(bookies[2].ledger().fetches() >= 8);
    assert!(h.events.try_recv().is_err());

    // Once the bookie recovers, a full streak leads to selection.
    bookies[1].configure(|x| x.fail_fetch = false);
    let before = bookies[1].ledger().fetches();
    wait_for(&mut h.events, is_verifying).await;
    assert_eq!(bookies[1].ledger().fetches() - before, 5);

    h.handle.close();
    assert_ok!(h.task.await);
}

#[tokio::test(start_paused = true)]
async fn test_slow_bookie_times_out() {
    let bookies = make_bookies();
    bookies[2].configure(|x| x.fetch_delay = Some(Duration::from_secs(30)));
    let mut h = start(&bookies, make_config(), Vec::new());

    // Each cycle waits out the 1s fetch timeout, then polling goes on.
    // Ticks that land inside a cycle are dropped, not queued.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let fetches = bookies[0].ledger().fetches();
    assert!((4..=7).contains(&fetches), "fetches = {fetches}");
    assert!(h.events.try_recv().is_err());
    let cycles = h.handle.status().cycles;
    assert!((4..=7).contains(&cycles), "cycles = {cycles}");
    assert!(bookies.iter().all(|b| b.ledger().max_in_flight() == 1));

    h.handle.close();
    assert_ok!(h.task.await);
}

#[tokio::test(start_paused = true)]
async fn test_close_mid_cycle_stops_polling() {
    let bookies = make_bookies();
    bookies[0].configure(|x| x.fetch_delay = Some(Duration::from_millis(800)));
    let seeded = vec![LegId::new("alpha", "X")];
    let mut h = start(&bookies, make_config(), seeded.clone());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_ok!(h.handle.ban(vec![LegId::new("gamma", "1")]));
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.handle.close();
    let banned = assert_ok!(h.task.await);
    assert_eq!(banned, vec![LegId::new("alpha", "X"), LegId::new("gamma", "1")]);

    let fetched: Vec<usize> = bookies.iter().map(|b| b.ledger().fetches()).collect();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let after: Vec<usize> = bookies.iter().map(|b| b.ledger().fetches()).collect();
    assert_eq!(fetched, after);

    let closed = wait_for(&mut h.events, |e| matches!(e, PipelineEvent::Closed { .. })).await;
    let PipelineEvent::Closed { banned } = closed else { unreachable!() };
    assert_eq!(banned.len(), 2);
    assert!(h.handle.status().closed);
    assert!(h.handle.ban(vec![LegId::new("beta", "1")]).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_ban_right_before_close_is_reported() {
    let bookies = make_bookies();
    let mut h = start(&bookies, make_config(), Vec::new());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_ok!(h.handle.ban(vec![LegId::new("gamma", "1")]));
    h.handle.close();

    assert_eq!(assert_ok!(h.task.await), vec![LegId::new("gamma", "1")]);
    let closed = wait_for(&mut h.events, |e| matches!(e, PipelineEvent::Closed { .. })).await;
    let PipelineEvent::Closed { banned } = closed else { unreachable!() };
    assert_eq!(banned, vec![LegId::new("gamma", "1")]);
    assert_eq!(h.handle.status().banned, 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_waits_for_execution_without_new_bans() {
    let bookies = make_bookies();
    for b in &bookies {
        b.configure(|x| x.postulate_delay = Some(Duration::from_secs(3)));
    }
    bookies[0].configure(|x| x.invalid = true);
    let mut h = start(&bookies, make_config(), Vec::new());

    wait_for(&mut h.events, is_verifying).await;
    h.handle.close();

    let report = executed(wait_for(&mut h.events, is_executed).await);
    assert_eq!(report.outcome, ExecutionOutcome::Aborted);
    assert!(bookies.iter().all(|b| b.ledger().cleaned().len() == 1));

    // The abort happened after close: the reported list is the one at the signal.
    assert!(assert_ok!(h.task.await).is_empty());
    assert!(!h.handle.status().blocked);
}

#[tokio::test(start_paused = true)]
async fn test_watch_only_never_executes() {
    let [_, beta, gamma] = make_bookies();
    let alpha = std::sync::Arc::new(
        MockBookie::new("alpha", [dec!(2.6), dec!(3.0), dec!(2.8)]).unauthenticated(),
    );
    let bookies = [alpha, beta, gamma];
    let mut h = start(&bookies, make_config(), Vec::new());
    assert!(h.handle.status().watch_only);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(bookies[0].ledger().fetches() >= 20);
    for b in &bookies {
        assert!(b.ledger().postulated().is_empty());
        assert!(b.ledger().placed().is_empty());
        assert!(b.ledger().cleaned().is_empty());
    }
    let status = h.handle.status();
    assert_eq!(status.state, ExecState::Idle);
    assert!(!status.blocked);
    assert!(h.events.try_recv().is_err());

    h.handle.close();
    assert_ok!(h.task.await);
}
