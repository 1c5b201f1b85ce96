//! 엔티티별 잡 큐
//!
//! 여러 스레드가 동시에 `push` 할 수 있지만, 큐를 비우는(flush) 스레드는 항상 하나입니다.
//! 대기 카운트가 0→1 로 바뀐 순간 push 한 스레드가 큐를 매니저에 등록하고,
//! 그 뒤로는 flush 를 맡은 워커가 카운트가 0 이 될 때까지 소유권을 가집니다.

use crossbeam_queue::SegQueue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::error;

use crate::job::job::Job;
use crate::job::manager::JobQueueManager;
use crate::thread::manager::panic_message;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

pub struct JobQueue {
    id: u64,
    jobs: SegQueue<Job>,
    job_count: AtomicUsize,
    manager: Arc<JobQueueManager>,
}

impl JobQueue {
    pub fn new(manager: &Arc<JobQueueManager>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            jobs: SegQueue::new(),
            job_count: AtomicUsize::new(0),
            manager: manager.clone(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn manager(&self) -> &Arc<JobQueueManager> {
        &self.manager
    }

    /// 대기 중인 잡 수
    pub fn pending(&self) -> usize {
        self.job_count.load(Ordering::Acquire)
    }

    /// 잡 추가. 큐가 비어 있었다면 매니저에 등록합니다.
    pub fn push(self: &Arc<Self>, job: Job) {
        // 카운트보다 잡이 먼저 보여야 flush 쪽 pop 이 실패하지 않음
        self.jobs.push(job);
        self.manager.record_push();
        let previous = self.job_count.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            self.manager.register(self.clone());
        }
    }

    /// 클로저를 잡으로 감싸 추가
    pub fn push_fn<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Job::new(callback));
    }

    /// `delay` 뒤에 이 큐로 들어갈 잡을 예약합니다.
    pub fn schedule(self: &Arc<Self>, delay: Duration, job: Job) {
        self.manager.timer().schedule(delay, job, Arc::downgrade(self));
    }

    pub fn downgrade(self: &Arc<Self>) -> Weak<Self> {
        Arc::downgrade(self)
    }

    /// 잡을 하나씩 실행합니다.
    ///
    /// 카운트가 0 이 되면 `true`, `time_slice` 를 넘겨 잡이 남았으면 `false` 를 반환합니다.
    /// 소유권을 가진 워커만 호출해야 합니다.
    pub(crate) fn try_flush(&self, time_slice: Duration) -> bool {
        let started = Instant::now();
        loop {
            let Some(job) = self.jobs.pop() else {
                // push 와 카운트 증가 사이의 짧은 구간
                std::hint::spin_loop();
                continue;
            };

            // 잡 하나의 panic 으로 큐 소유권이 워커와 함께 사라지지 않도록 여기서 잡음
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.execute())) {
                error!(
                    "잡 큐 {} 의 잡 실행 중 panic: {}",
                    self.id,
                    panic_message(payload.as_ref())
                );
            }
            self.manager.record_execute();

            let previous = self.job_count.fetch_sub(1, Ordering::AcqRel);
            if previous == 1 {
                return true;
            }
            if started.elapsed() >= time_slice {
                return false;
            }
        }
    }
}
