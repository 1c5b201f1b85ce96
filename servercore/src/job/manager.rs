//! 잡 큐 매니저
//!
//! 잡이 쌓인(hot) 큐를 채널로 넘겨받아 워커 스레드가 flush 합니다.
//! 시간 조각 안에 다 비우지 못한 큐는 채널 뒤로 다시 들어가므로
//! 하나의 큐가 워커를 독점하지 않습니다.

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::JobConfig;
use crate::job::queue::JobQueue;
use crate::job::timer::JobTimer;

/// 잡 시스템 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub pushed: u64,
    pub executed: u64,
    /// 시간 조각 초과로 다시 등록된 횟수
    pub requeued: u64,
    /// 현재 hot 큐 수
    pub active_queues: usize,
}

#[derive(Default)]
struct JobCounters {
    pushed: AtomicU64,
    executed: AtomicU64,
    requeued: AtomicU64,
}

pub struct JobQueueManager {
    hot_tx: Sender<Arc<JobQueue>>,
    hot_rx: Receiver<Arc<JobQueue>>,
    active_queues: AtomicUsize,
    flush_time_slice: Duration,
    worker_wait: Duration,
    running: AtomicBool,
    counters: JobCounters,
    timer: Arc<JobTimer>,
}

impl JobQueueManager {
    pub fn new(config: &JobConfig, timer: Arc<JobTimer>) -> Arc<Self> {
        let (hot_tx, hot_rx) = unbounded();
        Arc::new(Self {
            hot_tx,
            hot_rx,
            active_queues: AtomicUsize::new(0),
            flush_time_slice: config.flush_time_slice,
            worker_wait: config.worker_wait,
            running: AtomicBool::new(true),
            counters: JobCounters::default(),
            timer,
        })
    }

    pub fn timer(&self) -> &Arc<JobTimer> {
        &self.timer
    }

    /// 큐가 hot 상태가 되었을 때 호출 (0→1)
    pub(crate) fn register(&self, queue: Arc<JobQueue>) {
        self.active_queues.fetch_add(1, Ordering::AcqRel);
        // 수신자를 같이 들고 있으므로 실패하지 않음
        let _ = self.hot_tx.send(queue);
    }

    pub(crate) fn record_push(&self) {
        self.counters.pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_execute(&self) {
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// hot 큐 하나를 `wait` 동안 기다려 flush 합니다. 처리한 큐가 있으면 `true`.
    pub fn do_worker_job(&self, wait: Duration) -> bool {
        let queue = match self.hot_rx.recv_timeout(wait) {
            Ok(queue) => queue,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return false,
        };

        if queue.try_flush(self.flush_time_slice) {
            self.active_queues.fetch_sub(1, Ordering::AcqRel);
        } else {
            self.counters.requeued.fetch_add(1, Ordering::Relaxed);
            debug!("잡 큐 {} 시간 조각 초과, 재등록 (남은 잡 {})", queue.id(), queue.pending());
            let _ = self.hot_tx.send(queue);
        }
        true
    }

    /// 잡 워커 스레드 루프
    pub fn run_worker(&self) {
        debug!("잡 워커 시작");
        while self.running.load(Ordering::Acquire) {
            self.do_worker_job(self.worker_wait);
        }
        debug!("잡 워커 종료");
    }

    /// hot 큐가 없어질 때까지 현재 스레드에서 처리합니다. 제한 시간 안에 비우면 `true`.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_queue_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            self.do_worker_job(Duration::from_millis(1));
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 워커 루프 중단 요청
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("잡 큐 매니저 종료 요청");
        }
    }

    /// 워커 종료 후 남은 hot 큐를 버립니다. 버린 큐 수를 반환합니다.
    pub fn clear_pending(&self) -> usize {
        let mut dropped = 0;
        while self.hot_rx.try_recv().is_ok() {
            self.active_queues.fetch_sub(1, Ordering::AcqRel);
            dropped += 1;
        }
        if dropped > 0 {
            info!("처리되지 않은 잡 큐 {}개 폐기", dropped);
        }
        dropped
    }

    pub fn active_queue_count(&self) -> usize {
        self.active_queues.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> JobStats {
        JobStats {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            requeued: self.counters.requeued.load(Ordering::Relaxed),
            active_queues: self.active_queue_count(),
        }
    }
}
