//! 有界推送队列
//!
//! - `try_enqueue` / `try_enqueue_batch`：非阻塞，满了立即返回 `QueueError::Full`
//! - `enqueue`：阻塞直到有空位或队列关闭
//! - `dequeue`：阻塞直到有数据；关闭且取空后返回 `None`
//!
//! - `try_reserve` / `enqueue_reserved`：退避中的重试先占一个空位，到期后转为条目
//!
//! 条目数加预留数不超过容量。同一个队列实例内严格 FIFO。

use std::collections::VecDeque;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use crate::push::types::{Notification, QueueEntry};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is closed")]
    Closed,
}

/// 入队失败时把 Notification 交还给调用方
#[derive(Debug)]
pub struct Rejected {
    pub error: QueueError,
    pub notification: Notification,
}

#[derive(Debug)]
struct State {
    items: VecDeque<QueueEntry>,
    /// 已预留、尚未入队的空位
    reserved: usize,
    closed: bool,
}

impl State {
    fn used(&self) -> usize {
        self.items.len() + self.reserved
    }
}

#[derive(Debug)]
pub struct NotificationQueue {
    capacity: usize,
    state: Mutex<State>,
    not_empty: Notify,
    not_full: Notify,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                reserved: 0,
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reserved(&self) -> usize {
        self.state.lock().reserved
    }

    /// 条目数加预留数
    pub fn used_slots(&self) -> usize {
        self.state.lock().used()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity - self.used_slots()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// 非阻塞入队
    pub fn try_enqueue(&self, notification: Notification) -> Result<(), Rejected> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Rejected {
                    error: QueueError::Closed,
                    notification,
                });
            }
            if state.used() >= self.capacity {
                return Err(Rejected {
                    error: QueueError::Full,
                    notification,
                });
            }
            state.items.push_back(QueueEntry::new(notification));
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// 非阻塞批量入队，在同一把锁内完成：前 free_slots 个成功，其余返回 Full
    pub fn try_enqueue_batch(&self, batch: Vec<Notification>) -> Vec<Result<(), QueueError>> {
        let mut results = Vec::with_capacity(batch.len());
        let mut accepted = 0;
        {
            let mut state = self.state.lock();
            for notification in batch {
                if state.closed {
                    results.push(Err(QueueError::Closed));
                } else if state.used() >= self.capacity {
                    results.push(Err(QueueError::Full));
                } else {
                    state.items.push_back(QueueEntry::new(notification));
                    accepted += 1;
                    results.push(Ok(()));
                }
            }
        }
        for _ in 0..accepted {
            self.not_empty.notify_one();
        }
        results
    }

    /// 阻塞入队：等待空位；队列关闭时返回 `QueueError::Closed`
    pub async fn enqueue(&self, notification: Notification) -> Result<(), Rejected> {
        let mut pending = Some(notification);
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    if let Some(notification) = pending.take() {
                        return Err(Rejected {
                            error: QueueError::Closed,
                            notification,
                        });
                    }
                }
                if state.used() < self.capacity {
                    if let Some(notification) = pending.take() {
                        state.items.push_back(QueueEntry::new(notification));
                    }
                }
            }

            if pending.is_none() {
                self.not_empty.notify_one();
                return Ok(());
            }

            notified.await;
        }
    }

    /// 预留一个空位；队列已满或已关闭时返回 false
    pub fn try_reserve(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.used() >= self.capacity {
            return false;
        }
        state.reserved += 1;
        true
    }

    /// 用之前预留的空位入队，不会因为满而失败；队列关闭时释放预留并交还条目
    pub fn enqueue_reserved(&self, notification: Notification) -> Result<(), Rejected> {
        {
            let mut state = self.state.lock();
            state.reserved = state.reserved.saturating_sub(1);
            if state.closed {
                drop(state);
                self.not_full.notify_one();
                return Err(Rejected {
                    error: QueueError::Closed,
                    notification,
                });
            }
            state.items.push_back(QueueEntry::new(notification));
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// 放弃预留
    pub fn release_reservation(&self) {
        {
            let mut state = self.state.lock();
            state.reserved = state.reserved.saturating_sub(1);
        }
        self.not_full.notify_one();
    }

    /// 阻塞出队；关闭且队列为空时返回 `None`
    pub async fn dequeue(&self) -> Option<QueueEntry> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (entry, remaining) = {
                let mut state = self.state.lock();
                match state.items.pop_front() {
                    Some(entry) => (Some(entry), !state.items.is_empty()),
                    None if state.closed => return None,
                    None => (None, false),
                }
            };

            if let Some(entry) = entry {
                self.not_full.notify_one();
                // 唤醒链：还有数据就叫醒下一个消费者
                if remaining {
                    self.not_empty.notify_one();
                }
                return Some(entry);
            }

            notified.await;
        }
    }

    /// 关闭队列，唤醒所有等待者
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// 关闭并原子地取出剩余条目
    pub fn close_and_drain(&self) -> Vec<QueueEntry> {
        let drained: Vec<QueueEntry> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
        drained
    }
}
