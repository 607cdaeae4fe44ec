mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{config, notification, CollectingReporter};
use pushrelay::push::{
    Dispatcher, DispatcherConfig, IngressResult, MockClient, OutcomeKind, Platform,
    PlatformClient, SendError,
};
use pushrelay::ServerError;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_batch_backpressure_and_mixed_outcomes() {
    // 偶数 token 第一次临时失败、第二次成功；奇数 token 永久失败
    let client = Arc::new(MockClient::new(Platform::Ios).with_handler(|n| {
        let index: usize = n.token.trim_start_matches('t').parse().unwrap();
        if index % 2 == 1 {
            Err(SendError::Permanent("BadDeviceToken".to_string()))
        } else if n.attempt() == 0 {
            Err(SendError::Transient("503".to_string()))
        } else {
            Ok(())
        }
    }));
    let reporter = CollectingReporter::new();
    let dispatcher = Dispatcher::start(config(10, 2), vec![client.clone()], reporter.clone());

    let batch = (0..12)
        .map(|i| notification(Platform::Ios, &format!("t{}", i), 1))
        .collect();
    let results = dispatcher.push_batch(batch);

    let accepted = results.iter().filter(|r| r.is_accepted()).count();
    let queue_full = results
        .iter()
        .filter(|r| **r == IngressResult::RejectedQueueFull)
        .count();
    assert_eq!(accepted, 10);
    assert_eq!(queue_full, 2);
    // 队列按提交顺序接收，放不下的是末尾两个
    assert!(results[..10].iter().all(|r| r.is_accepted()));

    reporter.wait_for(10, WAIT).await;

    for i in 0..10 {
        let token = format!("t{}", i);
        let outcomes = reporter.for_token(&token);
        assert_eq!(outcomes.len(), 1, "token {} must finish exactly once", token);
        if i % 2 == 0 {
            assert_eq!(outcomes[0].kind, OutcomeKind::SucceededPush);
            assert_eq!(client.calls_for(&token), 2);
        } else {
            assert_eq!(outcomes[0].kind, OutcomeKind::FailedPush);
            assert!(matches!(
                outcomes[0].error,
                Some(ServerError::PermanentProvider(_))
            ));
            assert_eq!(outcomes[0].notification.attempt(), 0);
            assert_eq!(client.calls_for(&token), 1);
        }
    }

    let snapshot = dispatcher.read_snapshot();
    assert_eq!(snapshot.total_success, 5);
    assert_eq!(snapshot.total_fail, 5);
    assert_eq!(snapshot.rejected_queue_full, 2);
    assert_eq!(snapshot.ios.push_success, 5);
    assert_eq!(snapshot.android.push_success, 0);

    dispatcher.stop(Duration::from_secs(1)).await;
    assert_eq!(reporter.len(), 10);
}

#[tokio::test]
async fn test_transient_failure_attempts_max_retry_plus_one() {
    let client = Arc::new(
        MockClient::new(Platform::Android)
            .with_handler(|_| Err(SendError::Transient("Unavailable".to_string()))),
    );
    let reporter = CollectingReporter::new();
    let dispatcher = Dispatcher::start(config(16, 2), vec![client.clone()], reporter.clone());

    let results = dispatcher.push_batch(vec![
        notification(Platform::Android, "three", 3),
        notification(Platform::Android, "zero", 0),
    ]);
    assert!(results.iter().all(|r| r.is_accepted()));

    reporter.wait_for(2, WAIT).await;
    assert_eq!(client.calls_for("three"), 4);
    assert_eq!(client.calls_for("zero"), 1);
    assert_eq!(reporter.count(OutcomeKind::RetryExhausted), 2);

    let three = reporter.for_token("three");
    assert_eq!(three[0].notification.attempt(), 3);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_max_retry_clamped_by_ceiling() {
    let client = Arc::new(
        MockClient::new(Platform::Ios)
            .with_handler(|_| Err(SendError::Transient("429".to_string()))),
    );
    let reporter = CollectingReporter::new();
    let dispatcher = Dispatcher::start(
        DispatcherConfig {
            max_retry_ceiling: 2,
            ..config(16, 1)
        },
        vec![client.clone()],
        reporter.clone(),
    );

    dispatcher.push_batch(vec![notification(Platform::Ios, "greedy", 1_000)]);
    reporter.wait_for(1, WAIT).await;
    assert_eq!(client.calls_for("greedy"), 3);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_concurrent_submitters_each_get_one_outcome() {
    let client = Arc::new(MockClient::new(Platform::Android).with_delay(Duration::from_millis(1)));
    let reporter = CollectingReporter::new();
    let dispatcher = Arc::new(Dispatcher::start(
        config(4, 4),
        vec![client.clone()],
        reporter.clone(),
    ));

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .push_blocking(notification(Platform::Android, &format!("c{}", i), 0))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_accepted());
    }

    reporter.wait_for(64, WAIT).await;
    assert_eq!(reporter.count(OutcomeKind::SucceededPush), 64);
    assert_eq!(client.calls(), 64);

    dispatcher.stop(Duration::from_secs(1)).await;
    assert_eq!(reporter.len(), 64);
}

#[tokio::test]
async fn test_stop_accounts_for_every_accepted_notification() {
    let client = Arc::new(MockClient::new(Platform::Ios).with_delay(Duration::from_secs(10)));
    let reporter = CollectingReporter::new();
    let dispatcher = Dispatcher::start(config(100, 2), vec![client.clone()], reporter.clone());

    let batch = (0..20)
        .map(|i| notification(Platform::Ios, &format!("s{}", i), 0))
        .collect();
    let accepted = dispatcher
        .push_batch(batch)
        .iter()
        .filter(|r| r.is_accepted())
        .count();
    assert_eq!(accepted, 20);

    // 让 worker 取到在途条目
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let report = dispatcher.stop(Duration::from_millis(100)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.grace_period_elapsed);
    assert_eq!(report.drained_from_queue, 18);

    assert_eq!(reporter.len(), accepted);
    assert_eq!(reporter.count(OutcomeKind::ShutdownDropped), accepted);
    let snapshot = dispatcher.read_snapshot();
    assert_eq!(snapshot.total_count, accepted as u64);
    assert_eq!(snapshot.shutdown_dropped, accepted as u64);
    assert_eq!(snapshot.ios.shutdown_dropped, accepted as u64);
}

#[tokio::test]
async fn test_stop_drops_pending_retries() {
    let client = Arc::new(
        MockClient::new(Platform::Android)
            .with_handler(|_| Err(SendError::Transient("timeout".to_string()))),
    );
    let reporter = CollectingReporter::new();
    let mut dispatcher_config = config(16, 2);
    dispatcher_config.backoff.base_ms = 60_000;
    dispatcher_config.backoff.max_ms = 60_000;
    let dispatcher = Dispatcher::start(dispatcher_config, vec![client.clone()], reporter.clone());

    dispatcher.push_batch(vec![
        notification(Platform::Android, "r1", 5),
        notification(Platform::Android, "r2", 5),
        notification(Platform::Android, "r3", 5),
    ]);

    // 三条都已发送过一次，正在等待退避
    let deadline = Instant::now() + WAIT;
    while client.calls() < 3 {
        assert!(Instant::now() < deadline, "sends did not start");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let report = tokio::time::timeout(WAIT, dispatcher.stop(Duration::from_secs(1)))
        .await
        .expect("stop must not wait for the backoff delay");
    assert!(!report.grace_period_elapsed);

    assert_eq!(reporter.len(), 3);
    assert_eq!(reporter.count(OutcomeKind::ShutdownDropped), 3);
    for outcome in reporter.outcomes() {
        assert_eq!(outcome.error, Some(ServerError::ShutdownDropped));
    }
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn test_retries_in_backoff_stay_within_queue_capacity() {
    let client = Arc::new(
        MockClient::new(Platform::Ios)
            .with_handler(|_| Err(SendError::Transient("ServiceUnavailable".to_string()))),
    );
    let reporter = CollectingReporter::new();
    let mut dispatcher_config = config(2, 4);
    dispatcher_config.backoff.base_ms = 2_000;
    dispatcher_config.backoff.max_ms = 2_000;
    let dispatcher = Dispatcher::start(dispatcher_config, vec![client.clone()], reporter.clone());

    let mut accepted = 0;
    for i in 0..100 {
        let results = dispatcher.push_batch(vec![notification(Platform::Ios, &format!("o{}", i), 5)]);
        accepted += results.iter().filter(|r| r.is_accepted()).count();
        assert!(dispatcher.queue_usage() <= 2);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // 预留空位挡住新请求，其余只能在 worker 内原地退避
    assert!(dispatcher.pending_retries() <= 2);
    assert!(accepted >= 2);
    assert!(accepted <= 2 + 4, "accepted {} notifications during outage", accepted);
    assert!(dispatcher.read_snapshot().rejected_queue_full >= (100 - accepted) as u64);
    assert_eq!(reporter.len(), 0);

    let report = dispatcher.stop(Duration::from_secs(1)).await;
    assert!(!report.grace_period_elapsed);
    assert_eq!(reporter.len(), accepted);
    assert_eq!(reporter.count(OutcomeKind::ShutdownDropped), accepted);
}

#[tokio::test]
async fn test_degraded_client_fails_fast_without_retry() {
    let client = Arc::new(
        MockClient::new(Platform::Ios)
            .with_handler(|_| Err(SendError::Configuration("InvalidProviderToken".to_string()))),
    );
    let reporter = CollectingReporter::new();
    let dispatcher = Dispatcher::start(config(16, 1), vec![client.clone()], reporter.clone());

    let batch = (0..5)
        .map(|i| notification(Platform::Ios, &format!("d{}", i), 3))
        .collect();
    dispatcher.push_batch(batch);

    reporter.wait_for(5, WAIT).await;
    assert!(client.is_degraded());
    assert_eq!(client.calls(), 1);
    assert_eq!(reporter.count(OutcomeKind::FailedPush), 5);
    assert!(reporter
        .outcomes()
        .iter()
        .all(|o| matches!(o.error, Some(ServerError::Configuration(_)))));

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_send_timeout_is_transient() {
    let client = Arc::new(MockClient::new(Platform::Android).with_delay(Duration::from_secs(5)));
    let reporter = CollectingReporter::new();
    let dispatcher = Dispatcher::start(
        DispatcherConfig {
            send_timeout: Duration::from_millis(50),
            ..config(16, 1)
        },
        vec![client.clone()],
        reporter.clone(),
    );

    dispatcher.push_batch(vec![notification(Platform::Android, "slow", 1)]);

    reporter.wait_for(1, WAIT).await;
    let outcomes = reporter.outcomes();
    let outcome = &outcomes[0];
    assert_eq!(outcome.kind, OutcomeKind::RetryExhausted);
    assert!(outcome.error_text().contains("timed out"));
    assert_eq!(client.calls_for("slow"), 2);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_reset_snapshot_keeps_dispatching() {
    let client = Arc::new(MockClient::new(Platform::Android));
    let reporter = CollectingReporter::new();
    let dispatcher = Dispatcher::start(config(8, 1), vec![client], reporter.clone());

    dispatcher.push_batch(vec![notification(Platform::Android, "a", 0)]);
    reporter.wait_for(1, WAIT).await;
    assert_eq!(dispatcher.read_snapshot().total_success, 1);

    dispatcher.reset_snapshot();
    assert_eq!(dispatcher.read_snapshot().total_count, 0);

    dispatcher.push_batch(vec![notification(Platform::Android, "b", 0)]);
    reporter.wait_for(2, WAIT).await;
    assert_eq!(dispatcher.read_snapshot().total_success, 1);

    dispatcher.stop(Duration::from_secs(1)).await;
}
