//! 애플리케이션 컨텍스트
//!
//! 엔진 구성요소를 의존 순서대로 만들고, 세 종류의 워커 스레드 풀
//! (I/O 디스패치, 잡 flush, 타이머)을 띄우고 내립니다.
//!
//! 생성 순서: 락 컨텍스트 → 메모리 풀 → 잡 타이머 → 잡 큐 매니저 → 디스패처
//! 종료 순서는 그 반대입니다.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::job::{JobQueue, JobQueueManager, JobTimer};
use crate::lock::{DeadlockProfiler, LockContext};
use crate::memory::{PoolAllocator, SendBufferManager};
use crate::network::Dispatcher;
use crate::thread::ThreadManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Created,
    Running,
    Stopped,
}

pub struct AppContext {
    config: EngineConfig,
    lock_context: LockContext,
    allocator: Arc<PoolAllocator>,
    send_buffers: Arc<SendBufferManager>,
    timer: Arc<JobTimer>,
    job_manager: Arc<JobQueueManager>,
    dispatcher: Arc<Dispatcher>,
    threads: ThreadManager,
    state: Mutex<LifecycleState>,
}

impl AppContext {
    pub fn new(config: EngineConfig) -> CoreResult<Arc<Self>> {
        config.validate()?;

        let profiler = config
            .lock
            .deadlock_detection
            .then(|| Arc::new(DeadlockProfiler::new()));
        let lock_context = LockContext::from_config(&config.lock, profiler);

        let allocator = Arc::new(PoolAllocator::new(&config.memory));
        let send_buffers = Arc::new(SendBufferManager::new(&config.memory));
        let timer = Arc::new(JobTimer::new(&config.job));
        let job_manager = JobQueueManager::new(&config.job, timer.clone());
        let dispatcher = Dispatcher::new(&config.dispatcher)?;

        info!(
            "엔진 컨텍스트 생성 (I/O 워커 {}, 잡 워커 {}, 데드락 감지 {})",
            config.dispatcher.io_worker_count,
            config.job.job_worker_count,
            config.lock.deadlock_detection
        );

        Ok(Arc::new(Self {
            config,
            lock_context,
            allocator,
            send_buffers,
            timer,
            job_manager,
            dispatcher,
            threads: ThreadManager::new(),
            state: Mutex::new(LifecycleState::Created),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lock_context(&self) -> &LockContext {
        &self.lock_context
    }

    pub fn profiler(&self) -> Option<&Arc<DeadlockProfiler>> {
        self.lock_context.profiler()
    }

    pub fn allocator(&self) -> &Arc<PoolAllocator> {
        &self.allocator
    }

    pub fn send_buffers(&self) -> &Arc<SendBufferManager> {
        &self.send_buffers
    }

    pub fn timer(&self) -> &Arc<JobTimer> {
        &self.timer
    }

    pub fn job_manager(&self) -> &Arc<JobQueueManager> {
        &self.job_manager
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// 엔티티용 새 잡 큐
    pub fn create_job_queue(&self) -> Arc<JobQueue> {
        JobQueue::new(&self.job_manager)
    }

    /// 워커 스레드 풀을 띄웁니다.
    pub fn start_workers(&self) -> CoreResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Created => *state = LifecycleState::Running,
                LifecycleState::Running => return Ok(()),
                LifecycleState::Stopped => return Err(CoreError::ShutDown("AppContext")),
            }
        }

        for i in 0..self.config.dispatcher.io_worker_count {
            let dispatcher = self.dispatcher.clone();
            self.threads
                .launch(format!("io-worker-{i}"), move || dispatcher.run_worker())?;
        }
        for i in 0..self.config.job.job_worker_count {
            let manager = self.job_manager.clone();
            self.threads
                .launch(format!("job-worker-{i}"), move || manager.run_worker())?;
        }
        let timer = self.timer.clone();
        self.threads.launch("job-timer", move || timer.run())?;

        info!("워커 스레드 {}개 시작", self.threads.thread_count());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == LifecycleState::Running
    }

    /// 워커를 역순으로 멈추고 모두 join 합니다.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Stopped {
                return;
            }
            *state = LifecycleState::Stopped;
        }

        self.timer.shutdown();
        self.job_manager.shutdown();
        self.dispatcher.shutdown();
        self.threads.join();

        let dropped_queues = self.job_manager.clear_pending();
        let dropped_objects = self.dispatcher.clear_objects();
        if dropped_queues > 0 || dropped_objects > 0 {
            warn!(
                "종료 시 정리: 잡 큐 {}개, I/O 객체 {}개",
                dropped_queues, dropped_objects
            );
        }
        info!("엔진 컨텍스트 종료");
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
