//! 예약 잡 타이머
//!
//! 실행 시각 순 최소 힙에 (시각, 잡, 큐 약한 참조) 를 보관하고, 시각이 된 항목을
//! 해당 큐로 옮깁니다. 큐의 주인이 이미 사라졌다면 잡은 조용히 버려집니다.

use parking_lot::{Condvar, Mutex};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::JobConfig;
use crate::job::job::Job;
use crate::job::queue::JobQueue;

struct TimerItem {
    exec_at: Instant,
    /// 같은 시각끼리는 예약 순서대로
    seq: u64,
    job: Job,
    owner: Weak<JobQueue>,
}

impl PartialEq for TimerItem {
    fn eq(&self, other: &Self) -> bool {
        self.exec_at == other.exec_at && self.seq == other.seq
    }
}

impl Eq for TimerItem {}

impl PartialOrd for TimerItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.exec_at
            .cmp(&other.exec_at)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct TimerState {
    items: BinaryHeap<Reverse<TimerItem>>,
    next_seq: u64,
}

pub struct JobTimer {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    max_wait: Duration,
    running: AtomicBool,
}

impl JobTimer {
    pub fn new(config: &JobConfig) -> Self {
        Self {
            state: Mutex::new(TimerState::default()),
            wakeup: Condvar::new(),
            max_wait: config.timer_max_wait,
            running: AtomicBool::new(true),
        }
    }

    /// `delay` 뒤에 `owner` 큐로 들어갈 잡을 예약합니다.
    pub fn schedule(&self, delay: Duration, job: Job, owner: Weak<JobQueue>) {
        self.schedule_at(Instant::now() + delay, job, owner);
    }

    pub fn schedule_at(&self, exec_at: Instant, job: Job, owner: Weak<JobQueue>) {
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.items.push(Reverse(TimerItem {
                exec_at,
                seq,
                job,
                owner,
            }));
        }
        self.wakeup.notify_one();
    }

    /// 시각이 된 항목을 큐로 옮기고, 다음 항목까지 기다릴 시간을 반환합니다.
    pub fn distribute(&self) -> Duration {
        self.distribute_at(Instant::now())
    }

    /// `now` 기준으로 분배 (테스트에서 가상 시각 사용)
    pub fn distribute_at(&self, now: Instant) -> Duration {
        let (due, wait) = {
            let mut state = self.state.lock();
            let mut due = Vec::new();
            loop {
                match state.items.peek() {
                    Some(Reverse(item)) if item.exec_at <= now => {}
                    _ => break,
                }
                if let Some(Reverse(item)) = state.items.pop() {
                    due.push(item);
                }
            }
            let wait = match state.items.peek() {
                Some(Reverse(next)) => (next.exec_at - now).min(self.max_wait),
                None => self.max_wait,
            };
            (due, wait)
        };

        // 큐 push 는 락 밖에서 (hot 큐 등록 경로로 재진입)
        for item in due {
            match item.owner.upgrade() {
                Some(queue) => queue.push(item.job),
                None => trace!("주인이 사라진 예약 잡 폐기"),
            }
        }
        wait
    }

    /// 타이머 스레드 루프
    pub fn run(&self) {
        debug!("잡 타이머 시작");
        while self.running.load(Ordering::Acquire) {
            let wait = self.distribute();

            let mut state = self.state.lock();
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            // distribute 이후 더 이른 예약이 들어왔을 수 있음
            let wait = match state.items.peek() {
                Some(Reverse(next)) => next
                    .exec_at
                    .saturating_duration_since(Instant::now())
                    .min(wait),
                None => wait,
            };
            if !wait.is_zero() {
                self.wakeup.wait_for(&mut state, wait);
            }
        }
        debug!("잡 타이머 종료");
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let _state = self.state.lock();
        self.wakeup.notify_all();
    }

    /// 아직 분배되지 않은 예약 수
    pub fn pending_count(&self) -> usize {
        self.state.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::manager::JobQueueManager;
    use parking_lot::Mutex as PlMutex;
    use std::sync::Arc;

    fn setup() -> (Arc<JobQueueManager>, Arc<JobTimer>) {
        let config = JobConfig::default();
        let timer = Arc::new(JobTimer::new(&config));
        (JobQueueManager::new(&config, timer.clone()), timer)
    }

    #[test]
    fn test_due_items_are_pushed_in_time_order() {
        let (manager, timer) = setup();
        let queue = JobQueue::new(&manager);
        let log = Arc::new(PlMutex::new(Vec::new()));
        let base = Instant::now();

        for (name, delay) in [("a", 500), ("b", 100), ("c", 300)] {
            let log = log.clone();
            timer.schedule_at(
                base + Duration::from_millis(delay),
                Job::new(move || log.lock().push(name)),
                queue.downgrade(),
            );
        }

        let wait = timer.distribute_at(base + Duration::from_millis(150));
        // 다음 항목(c)까지 150ms, 최대 대기 시간으로 잘림
        assert_eq!(wait, Duration::from_millis(150).min(JobConfig::default().timer_max_wait));
        assert!(manager.drain(Duration::from_secs(1)));
        assert_eq!(*log.lock(), vec!["b"]);

        timer.distribute_at(base + Duration::from_millis(600));
        assert!(manager.drain(Duration::from_secs(1)));
        assert_eq!(*log.lock(), vec!["b", "c", "a"]);
        assert_eq!(timer.pending_count(), 0);
    }

    #[test]
    fn test_equal_times_keep_schedule_order() {
        let (manager, timer) = setup();
        let queue = JobQueue::new(&manager);
        let log = Arc::new(PlMutex::new(Vec::new()));
        let at = Instant::now();

        for i in 0..10 {
            let log = log.clone();
            timer.schedule_at(at, Job::new(move || log.lock().push(i)), queue.downgrade());
        }
        timer.distribute_at(at);
        assert!(manager.drain(Duration::from_secs(1)));
        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_owner_discards_job() {
        let (manager, timer) = setup();
        let queue = JobQueue::new(&manager);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let base = Instant::now();

        timer.schedule_at(
            base + Duration::from_millis(1000),
            Job::new(move || flag.store(true, Ordering::SeqCst)),
            queue.downgrade(),
        );
        drop(queue);

        timer.distribute_at(base + Duration::from_millis(1500));
        assert!(manager.drain(Duration::from_secs(1)));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(timer.pending_count(), 0);
        // 잡이 버려지면서 캡처한 Arc 도 해제됨
        assert_eq!(Arc::strong_count(&ran), 1);
    }

    #[test]
    fn test_empty_timer_waits_max() {
        let (_manager, timer) = setup();
        assert_eq!(timer.distribute(), JobConfig::default().timer_max_wait);
    }

    #[test]
    fn test_run_loop_stops_on_shutdown() {
        let (manager, timer) = setup();
        let queue = JobQueue::new(&manager);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        queue.schedule(
            Duration::from_millis(20),
            Job::new(move || flag.store(true, Ordering::SeqCst)),
        );

        let runner = {
            let timer = timer.clone();
            std::thread::spawn(move || timer.run())
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !ran.load(Ordering::SeqCst) && Instant::now() < deadline {
            manager.do_worker_job(Duration::from_millis(5));
        }
        timer.shutdown();
        runner.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
