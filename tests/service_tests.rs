//! # Print Service Tests
//!
//! Scheduling behaviour of the background worker against the in-memory
//! printer, on real (short) timers.

use std::time::{Duration, Instant};

use peripage::printer::ProfileId;
use peripage::protocol::Command;
use peripage::service::{PrintService, PrintTask, ServiceConfig, ServiceEvent, ServiceState, TaskId};
use peripage::transport::MockPrinter;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

fn start(printer: &MockPrinter, config: ServiceConfig) -> PrintService {
    PrintService::start(printer.connector(), "mock", ProfileId::A6, config)
}

/// Wait for the first event matching `pred`, skipping everything else.
async fn next_matching<F>(events: &mut broadcast::Receiver<ServiceEvent>, mut pred: F) -> ServiceEvent
where
    F: FnMut(&ServiceEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for service event")
}

async fn completed(events: &mut broadcast::Receiver<ServiceEvent>, id: TaskId) {
    next_matching(events, |e| *e == ServiceEvent::TaskCompleted { id }).await;
}

/// ASCII lines that reached the printer, in order.
fn printed_lines(printer: &MockPrinter) -> Vec<String> {
    printer
        .frames()
        .into_iter()
        .filter(|f| f.last() == Some(&b'\n') && f.iter().all(|b| b.is_ascii_graphic() || *b == b' ' || *b == b'\n'))
        .map(|f| String::from_utf8_lossy(&f).into_owned())
        .collect()
}

// ============================================================================
// ORDERING AND PACING
// ============================================================================

#[tokio::test]
async fn test_tasks_run_in_enqueue_order() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(0.02, 0.01, 0.01, 0.0));
    let mut events = service.subscribe();

    let ids: Vec<TaskId> = ["one", "two", "three", "four"]
        .into_iter()
        .map(|text| service.enqueue(PrintTask::ascii(text), true))
        .collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    for id in &ids {
        completed(&mut events, *id).await;
    }

    assert_eq!(printed_lines(&printer), vec!["one\n", "two\n", "three\n", "four\n"]);
    let status = service.status();
    assert_eq!(status.completed, 4);
    assert_eq!(status.queued, 0);

    service.stop().await;
}

#[tokio::test]
async fn test_raster_task_keeps_unflushed_text() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(60.0, 0.0, 0.01, 0.0));
    let mut events = service.subscribe();

    service.enqueue(PrintTask::ascii("hello"), false);
    let raster = service.enqueue(PrintTask::raw(vec![vec![0u8; 48]]), true);
    completed(&mut events, raster).await;

    assert_eq!(printed_lines(&printer), vec!["hello\n"]);
    assert_eq!(printer.frames().last(), Some(&b"hello\n".to_vec()));

    service.stop().await;
}

#[tokio::test]
async fn test_tasks_are_paced() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(60.0, 0.2, 0.01, 0.0));
    let mut events = service.subscribe();

    let first = service.enqueue(PrintTask::feed(10), false);
    let second = service.enqueue(PrintTask::feed(20), false);

    completed(&mut events, first).await;
    let started = Instant::now();
    completed(&mut events, second).await;

    assert!(started.elapsed() >= Duration::from_millis(150));
    service.stop().await;
}

#[tokio::test]
async fn test_pings_report_battery() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(0.05, 0.0, 0.01, 0.0));
    let mut events = service.subscribe();

    let event = next_matching(&mut events, |e| matches!(e, ServiceEvent::Pinged { .. })).await;
    assert_eq!(event, ServiceEvent::Pinged { battery: 84 });

    printer.set_battery(40);
    next_matching(&mut events, |e| *e == ServiceEvent::Pinged { battery: 40 }).await;

    assert_eq!(service.status().battery, Some(40));
    assert!(printer.frames().contains(&Command::QueryBattery.encode()));

    service.stop().await;
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_link_failure_reconnects_without_resending() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(60.0, 0.0, 0.2, 0.2));
    let mut events = service.subscribe();
    let mut status = service.watch_status();

    tokio::time::timeout(WAIT, status.wait_for(|s| s.state == ServiceState::Idle))
        .await
        .unwrap()
        .unwrap();

    printer.fail_next_writes(1);
    let lost = service.enqueue(PrintTask::ascii("lost"), true);
    next_matching(&mut events, |e| matches!(e, ServiceEvent::TaskFailed { id, .. } if *id == lost)).await;
    let failed_at = Instant::now();
    next_matching(&mut events, |e| {
        *e == ServiceEvent::StateChanged {
            state: ServiceState::Reconnecting,
        }
    })
    .await;

    let kept = service.enqueue(PrintTask::ascii("kept"), true);
    completed(&mut events, kept).await;

    // reconnect_wait + post_connect_wait before anything is sent again
    assert!(failed_at.elapsed() >= Duration::from_millis(350));
    assert_eq!(printer.connects(), 2);
    assert_eq!(
        printer.frames(),
        vec![Command::Reset.encode(), Command::Reset.encode(), b"kept\n".to_vec()]
    );

    let snapshot = service.status();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.completed, 1);
    assert!(snapshot.connected);

    service.stop().await;
}

#[tokio::test]
async fn test_initial_connect_retries() {
    let printer = MockPrinter::new();
    printer.refuse_connects(3);
    let service = start(&printer, ServiceConfig::from_secs(60.0, 0.0, 0.01, 0.0));
    let mut events = service.subscribe();

    let id = service.enqueue(PrintTask::ascii("hello"), true);
    completed(&mut events, id).await;

    assert_eq!(printer.connects(), 1);
    assert_eq!(
        printer.frames(),
        vec![Command::Reset.encode(), b"hello\n".to_vec()]
    );
    assert!(service.status().last_error.is_some());

    service.stop().await;
}

#[tokio::test]
async fn test_initial_connect_reports_reconnecting() {
    let printer = MockPrinter::new();
    printer.refuse_connects(1);
    let service = start(&printer, ServiceConfig::from_secs(60.0, 0.0, 0.2, 0.0));
    let mut status = service.watch_status();

    assert_eq!(service.status().state, ServiceState::Reconnecting);
    assert!(!service.status().connected);

    let mut seen = vec![status.borrow_and_update().state];
    tokio::time::timeout(WAIT, async {
        while seen.last() != Some(&ServiceState::Idle) {
            status.changed().await.unwrap();
            let state = status.borrow_and_update().state;
            if seen.last() != Some(&state) {
                seen.push(state);
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(seen, vec![ServiceState::Reconnecting, ServiceState::Idle]);
    assert_eq!(printer.connects(), 1);
    service.stop().await;
}

#[tokio::test]
async fn test_validation_failure_keeps_the_link() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(60.0, 0.0, 0.01, 0.0));
    let mut events = service.subscribe();

    let bad = service.enqueue(PrintTask::raw(vec![vec![0u8; 5]]), false);
    let good = service.enqueue(PrintTask::ascii("fine"), true);

    let event =
        next_matching(&mut events, |e| matches!(e, ServiceEvent::TaskFailed { id, .. } if *id == bad)).await;
    match event {
        ServiceEvent::TaskFailed { error, .. } => assert!(error.starts_with("Validation error")),
        other => panic!("unexpected event {:?}", other),
    }
    completed(&mut events, good).await;

    assert_eq!(printer.connects(), 1);
    service.stop().await;
}

// ============================================================================
// SHUTDOWN
// ============================================================================

#[tokio::test]
async fn test_stop_discards_queued_tasks() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(60.0, 10.0, 0.01, 0.0));
    let mut events = service.subscribe();

    let first = service.enqueue(PrintTask::ascii("one"), true);
    let second = service.enqueue(PrintTask::ascii("two"), true);
    let third = service.enqueue(PrintTask::ascii("three"), true);
    completed(&mut events, first).await;

    service.stop().await;

    let mut discarded = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ServiceEvent::TaskDiscarded { id } = event {
            discarded.push(id);
        }
    }
    assert_eq!(discarded, vec![second, third]);

    let status = service.status();
    assert_eq!(status.state, ServiceState::Stopped);
    assert_eq!(status.discarded, 2);
    assert_eq!(status.queued, 0);
    assert!(!status.connected);
    assert_eq!(printed_lines(&printer), vec!["one\n"]);
}

#[tokio::test]
async fn test_enqueue_after_stop_is_discarded() {
    let printer = MockPrinter::new();
    let service = start(&printer, ServiceConfig::from_secs(60.0, 0.0, 0.01, 0.0));
    service.stop().await;
    assert!(service.is_stopped());

    let mut events = service.subscribe();
    let late = service.enqueue(PrintTask::ascii("late"), true);

    assert_eq!(events.try_recv().unwrap(), ServiceEvent::TaskDiscarded { id: late });
    assert_eq!(service.status().discarded, 1);
    assert!(printed_lines(&printer).is_empty());
}
