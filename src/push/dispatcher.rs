use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::push::provider::{PlatformClient, SendError};
use crate::push::queue::{NotificationQueue, QueueError};
use crate::push::retry::{BackoffConfig, DropReason, RetryDecision, RetryPolicy};
use crate::push::stats::{StatsCollector, StatsSnapshot};
use crate::push::status::{OutcomeKind, PushOutcome, StatusReporter};
use crate::push::types::{Notification, Platform, PushRequest, QueueEntry};

/// 调度器启动参数（启动后不可变）
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub worker_num: usize,
    /// max_retry 上限，会再被 `HARD_RETRY_CEILING` 截断
    pub max_retry_ceiling: u32,
    /// 单次发送超时
    pub send_timeout: Duration,
    pub backoff: BackoffConfig,
    /// 请求未指定 max_retry 时各平台的默认值
    pub default_max_retry: HashMap<Platform, u32>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8192,
            worker_num: 4,
            max_retry_ceiling: 10,
            send_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            default_max_retry: HashMap::new(),
        }
    }
}

/// 单个成员的入口结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum IngressResult {
    Accepted(String),
    RejectedQueueFull,
    RejectedInvalid(String),
    RejectedShuttingDown,
}

impl IngressResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngressResult::Accepted(_))
    }
}

/// 关闭结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    /// 队列中未处理、直接丢弃的数量
    pub drained_from_queue: usize,
    /// 宽限期到期仍未结束，强制放弃了在途发送
    pub grace_period_elapsed: bool,
    /// panic 退出的 worker 数
    pub failed_workers: usize,
}

struct Inner {
    queue: NotificationQueue,
    clients: HashMap<Platform, Arc<dyn PlatformClient>>,
    policy: RetryPolicy,
    stats: Arc<StatsCollector>,
    reporter: Arc<dyn StatusReporter>,
    send_timeout: Duration,
    default_max_retry: HashMap<Platform, u32>,
    /// 停止出队
    stop_tx: watch::Sender<bool>,
    /// 宽限期结束，放弃在途发送
    abort_tx: watch::Sender<bool>,
    pending_retries: AtomicUsize,
    retries_idle: Notify,
}

/// 推送调度器
///
/// 启动时构造一次，持有队列、worker、平台客户端和统计；
/// 入口层（HTTP）和 worker 共享同一个实例。
pub struct Dispatcher {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopping: AtomicBool,
}

impl Dispatcher {
    /// 启动 worker 池，必须在 tokio runtime 内调用
    pub fn start(
        config: DispatcherConfig,
        clients: Vec<Arc<dyn PlatformClient>>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let clients: HashMap<Platform, Arc<dyn PlatformClient>> = clients
            .into_iter()
            .map(|client| (client.platform(), client))
            .collect();

        let (stop_tx, _) = watch::channel(false);
        let (abort_tx, _) = watch::channel(false);
        let policy = RetryPolicy::new(config.backoff.clone(), config.max_retry_ceiling);

        let inner = Arc::new(Inner {
            queue: NotificationQueue::new(config.queue_capacity),
            clients,
            policy,
            stats: Arc::new(StatsCollector::new()),
            reporter,
            send_timeout: config.send_timeout,
            default_max_retry: config.default_max_retry,
            stop_tx,
            abort_tx,
            pending_retries: AtomicUsize::new(0),
            retries_idle: Notify::new(),
        });

        let worker_num = config.worker_num.max(1);
        let workers = (0..worker_num)
            .map(|id| tokio::spawn(worker_loop(inner.clone(), id)))
            .collect();

        info!(
            "[DISPATCHER] Started: workers={}, queue_capacity={}, retry_ceiling={}, platforms={:?}",
            worker_num,
            inner.queue.capacity(),
            inner.policy.ceiling(),
            inner.clients.keys().collect::<Vec<_>>()
        );

        Self {
            inner,
            workers: Mutex::new(workers),
            stopping: AtomicBool::new(false),
        }
    }

    /// 校验并非阻塞入队一批推送，同步返回每个成员的结果
    pub fn push_batch(&self, batch: Vec<Notification>) -> Vec<IngressResult> {
        if self.is_stopping() {
            return batch.iter().map(|_| IngressResult::RejectedShuttingDown).collect();
        }

        let mut results: Vec<Option<IngressResult>> = vec![None; batch.len()];
        let mut valid = Vec::with_capacity(batch.len());
        let mut valid_index = Vec::with_capacity(batch.len());

        for (index, notification) in batch.into_iter().enumerate() {
            match self.inner.admit(notification) {
                Ok(notification) => {
                    results[index] = Some(IngressResult::Accepted(notification.id.clone()));
                    valid_index.push(index);
                    valid.push(notification);
                }
                Err(reason) => results[index] = Some(self.inner.reject_invalid(reason)),
            }
        }

        let enqueued = self.inner.queue.try_enqueue_batch(valid);
        for (index, result) in valid_index.into_iter().zip(enqueued) {
            match result {
                Ok(()) => {}
                Err(QueueError::Full) => {
                    self.inner.stats.increment_rejected_queue_full();
                    metrics::record_rejected("queue_full");
                    results[index] = Some(IngressResult::RejectedQueueFull);
                }
                Err(QueueError::Closed) => {
                    results[index] = Some(IngressResult::RejectedShuttingDown);
                }
            }
        }
        metrics::record_queue_depth(self.inner.queue.len());

        results
            .into_iter()
            .map(|r| r.unwrap_or(IngressResult::RejectedShuttingDown))
            .collect()
    }

    /// 展开 HTTP 请求后入队
    ///
    /// 结果按展开后的顺序排列；没有 token 的请求占一个 `RejectedInvalid`。
    pub fn push_requests(&self, requests: Vec<PushRequest>) -> Vec<IngressResult> {
        if self.is_stopping() {
            let members: usize = requests.iter().map(|r| r.tokens.len().max(1)).sum();
            return vec![IngressResult::RejectedShuttingDown; members];
        }

        // true: 该位置是 batch 中的一条；false: 缺少 token 的请求
        let mut layout = Vec::with_capacity(requests.len());
        let mut batch = Vec::with_capacity(requests.len());
        for request in requests {
            if request.tokens.is_empty() {
                layout.push(false);
                continue;
            }
            let default_max_retry = self.inner.default_max_retry(request.platform);
            let notifications = request.into_notifications(default_max_retry);
            layout.extend(std::iter::repeat(true).take(notifications.len()));
            batch.extend(notifications);
        }

        let mut enqueued = self.push_batch(batch).into_iter();
        layout
            .into_iter()
            .map(|expanded| match expanded {
                true => enqueued.next().unwrap_or(IngressResult::RejectedShuttingDown),
                false => self.inner.reject_invalid("tokens is required".to_string()),
            })
            .collect()
    }

    /// 阻塞模式入队：队列满时等待空位，关闭时拒绝
    pub async fn push_blocking(&self, notification: Notification) -> IngressResult {
        if self.is_stopping() {
            return IngressResult::RejectedShuttingDown;
        }
        let notification = match self.inner.admit(notification) {
            Ok(notification) => notification,
            Err(reason) => return self.inner.reject_invalid(reason),
        };

        let id = notification.id.clone();
        match self.inner.queue.enqueue(notification).await {
            Ok(()) => {
                metrics::record_queue_depth(self.inner.queue.len());
                IngressResult::Accepted(id)
            }
            Err(_) => IngressResult::RejectedShuttingDown,
        }
    }

    pub fn read_snapshot(&self) -> StatsSnapshot {
        self.inner.stats.read_snapshot()
    }

    pub fn reset_snapshot(&self) {
        info!("[DISPATCHER] Stats reset");
        self.inner.stats.reset();
    }

    pub fn stats(&self) -> Arc<StatsCollector> {
        self.inner.stats.clone()
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// 队列条目加上退避中重试预留的空位，不超过容量
    pub fn queue_usage(&self) -> usize {
        self.inner.queue.used_slots()
    }

    /// 退避中、持有队列预留空位的重试数
    pub fn pending_retries(&self) -> usize {
        self.inner.queue.reserved()
    }

    pub fn is_platform_enabled(&self, platform: Platform) -> bool {
        self.inner.clients.contains_key(&platform)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// 停止调度器：停止出队，丢弃队列剩余条目，在途发送最多再等 `grace`。
    ///
    /// 返回前保证每个已接收的推送都产生了终态结果。重复调用直接返回。
    pub async fn stop(&self, grace: Duration) -> StopReport {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return StopReport::default();
        }

        info!("[DISPATCHER] Stopping, grace period {:?}", grace);
        self.inner.stop_tx.send_replace(true);

        let drained = self.inner.queue.close_and_drain();
        let drained_from_queue = drained.len();
        for entry in drained {
            self.inner.finish(PushOutcome::shutdown_dropped(entry.notification));
        }
        metrics::record_queue_depth(0);

        let handles = std::mem::take(&mut *self.workers.lock());
        let all = futures::future::join_all(handles);
        tokio::pin!(all);

        let (joined, grace_period_elapsed) = match tokio::time::timeout(grace, all.as_mut()).await {
            Ok(joined) => (joined, false),
            Err(_) => {
                warn!("[DISPATCHER] Grace period elapsed, abandoning in-flight sends");
                self.inner.abort_tx.send_replace(true);
                (all.await, true)
            }
        };
        let mut failed_workers = 0;
        for result in joined {
            if let Err(e) = result {
                failed_workers += 1;
                error!("[DISPATCHER] Worker task failed: {}", e);
            }
        }

        self.inner.wait_retries_idle().await;

        let snapshot = self.inner.stats.read_snapshot();
        info!(
            "[DISPATCHER] Stopped: drained={}, success={}, fail={}, shutdown_dropped={}",
            drained_from_queue, snapshot.total_success, snapshot.total_fail, snapshot.shutdown_dropped
        );

        StopReport {
            drained_from_queue,
            grace_period_elapsed,
            failed_workers,
        }
    }
}

impl Inner {
    fn default_max_retry(&self, platform: Platform) -> u32 {
        self.default_max_retry.get(&platform).copied().unwrap_or(0)
    }

    fn reject_invalid(&self, reason: String) -> IngressResult {
        self.stats.increment_rejected_invalid();
        metrics::record_rejected("invalid");
        debug!("[DISPATCHER] Rejected invalid notification: {}", reason);
        IngressResult::RejectedInvalid(reason)
    }

    /// 入口校验；通过后把 max_retry 截断到上限
    fn admit(&self, mut notification: Notification) -> Result<Notification, String> {
        notification.validate().map_err(|e| e.to_string())?;
        if !self.clients.contains_key(&notification.platform) {
            return Err(format!("platform {} is not enabled", notification.platform));
        }
        notification.max_retry = self.policy.effective_max_retry(notification.max_retry);
        Ok(notification)
    }

    async fn process(self: &Arc<Self>, entry: QueueEntry) {
        metrics::record_queue_wait(entry.enqueued_at.elapsed().as_secs_f64());
        let mut notification = entry.notification;

        let Some(client) = self.clients.get(&notification.platform).cloned() else {
            let error = SendError::Configuration(format!(
                "no client for platform {}",
                notification.platform
            ));
            self.finish(PushOutcome::failed(notification, error.into()));
            return;
        };

        loop {
            let Some(result) = self.send_once(client.as_ref(), &notification).await else {
                self.finish(PushOutcome::shutdown_dropped(notification));
                return;
            };

            let err = match result {
                Ok(()) => {
                    self.finish(PushOutcome::succeeded(notification));
                    return;
                }
                Err(err) => err,
            };

            let delay = match self
                .policy
                .decide(notification.attempt(), notification.max_retry, err.kind())
            {
                RetryDecision::Retry(delay) => delay,
                RetryDecision::Drop(DropReason::RetryExhausted) => {
                    self.finish(PushOutcome::retry_exhausted(notification, err.into()));
                    return;
                }
                RetryDecision::Drop(_) => {
                    self.finish(PushOutcome::failed(notification, err.into()));
                    return;
                }
            };

            notification.bump_attempt();
            metrics::record_retry(notification.platform);
            debug!(
                "[WORKER] Retrying id={} after {:?} (attempt {}): {}",
                notification.id,
                delay,
                notification.attempt(),
                err
            );

            if self.queue.try_reserve() {
                self.schedule_retry(notification, delay);
                return;
            }

            // 队列没有空位可预留，在 worker 内退避后原地重发
            debug!("[WORKER] No free slot for retry id={}, retrying in place", notification.id);
            if self.sleep_unless_stopped(delay).await {
                self.finish(PushOutcome::shutdown_dropped(notification));
                return;
            }
        }
    }

    /// 发送一次；宽限期结束被放弃时返回 None
    async fn send_once(
        &self,
        client: &dyn PlatformClient,
        notification: &Notification,
    ) -> Option<Result<(), SendError>> {
        let mut abort_rx = self.abort_tx.subscribe();
        let send = tokio::time::timeout(self.send_timeout, client.send(notification));
        tokio::select! {
            biased;
            _ = abort_rx.wait_for(|aborted| *aborted) => None,
            result = send => Some(match result {
                Ok(result) => result,
                Err(_) => Err(SendError::Transient(format!(
                    "send timed out after {:?}",
                    self.send_timeout
                ))),
            }),
        }
    }

    /// 等待 `delay`；期间收到停止信号返回 true
    async fn sleep_unless_stopped(&self, delay: Duration) -> bool {
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stopped| *stopped) => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    /// 持有已预留的队列空位，延迟后入队，不占用 worker
    fn schedule_retry(self: &Arc<Self>, notification: Notification, delay: Duration) {
        self.pending_retries.fetch_add(1, Ordering::AcqRel);

        let inner = self.clone();
        tokio::spawn(async move {
            if inner.sleep_unless_stopped(delay).await {
                inner.queue.release_reservation();
                inner.finish(PushOutcome::shutdown_dropped(notification));
            } else if let Err(rejected) = inner.queue.enqueue_reserved(notification) {
                inner.finish(PushOutcome::shutdown_dropped(rejected.notification));
            } else {
                metrics::record_queue_depth(inner.queue.len());
            }

            if inner.pending_retries.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.retries_idle.notify_waiters();
            }
        });
    }

    async fn wait_retries_idle(&self) {
        loop {
            let notified = self.retries_idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending_retries.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// 记录终态：统计 + 状态上报
    fn finish(&self, outcome: PushOutcome) {
        let platform = outcome.platform();
        match outcome.kind {
            OutcomeKind::SucceededPush => self.stats.increment_success(platform),
            OutcomeKind::FailedPush | OutcomeKind::RetryExhausted => {
                self.stats.increment_fail(platform)
            }
            OutcomeKind::ShutdownDropped => self.stats.increment_shutdown_dropped(platform),
        }
        metrics::record_outcome(platform, outcome.kind);
        self.reporter.emit(&outcome);
    }
}

async fn worker_loop(inner: Arc<Inner>, id: usize) {
    debug!("[WORKER] Worker {} started", id);
    let mut stop_rx = inner.stop_tx.subscribe();

    loop {
        let entry = tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            entry = inner.queue.dequeue() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };
        metrics::record_queue_depth(inner.queue.len());
        inner.process(entry).await;
    }

    debug!("[WORKER] Worker {} exited", id);
}
