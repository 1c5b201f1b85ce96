//! I/O 완료 디스패처
//!
//! 비동기 I/O 는 디스패처가 소유한 tokio 런타임에서 진행되고, 끝난 작업은
//! (소유자 ID, 이벤트) 형태로 완료 채널에 올라옵니다. OS 워커 스레드들이
//! [`Dispatcher::dispatch`] 를 돌며 완료를 하나씩 꺼내 소유 객체에게 넘깁니다.
//!
//! 소유 객체는 ID 로 등록부에 보관되며, 등록이 풀린 뒤 도착한 완료는
//! 조용히 버려집니다(stale completion).

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace};

use crate::buffer::RecvBuffer;
use crate::config::DispatcherConfig;
use crate::error::{CoreError, CoreResult};
use crate::memory::SendBuffer;

/// 등록부 키
pub type IoObjectId = u64;

/// 완료된 I/O 작업
///
/// 진행 중인 작업에 넘겨졌던 소켓 반쪽과 버퍼는 완료와 함께 소유자에게 돌아옵니다.
pub enum IoEvent {
    Connect(io::Result<TcpStream>),
    Disconnect,
    Accept {
        slot: usize,
        result: io::Result<(TcpStream, SocketAddr)>,
    },
    Recv {
        reader: OwnedReadHalf,
        buffer: RecvBuffer,
        result: io::Result<usize>,
    },
    Send {
        writer: OwnedWriteHalf,
        buffers: Vec<SendBuffer>,
        result: io::Result<usize>,
    },
}

impl IoEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            IoEvent::Connect(_) => "connect",
            IoEvent::Disconnect => "disconnect",
            IoEvent::Accept { .. } => "accept",
            IoEvent::Recv { .. } => "recv",
            IoEvent::Send { .. } => "send",
        }
    }
}

/// 디스패처에 등록되는 I/O 소유 객체 (세션, 리스너)
pub trait IoObject: Send + Sync {
    fn io_id(&self) -> IoObjectId;

    fn dispatch(self: Arc<Self>, event: IoEvent);
}

struct Completion {
    owner: IoObjectId,
    event: IoEvent,
}

/// `dispatch` 1회 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Dispatched,
    /// 대기 시간 안에 완료가 없었음 (정상)
    Timeout,
    /// 소유자가 이미 등록 해제됨
    Stale,
}

/// 디스패처 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub dispatched: u64,
    pub timeouts: u64,
    pub stale_completions: u64,
    pub registered: usize,
}

#[derive(Default)]
struct DispatcherCounters {
    dispatched: AtomicU64,
    timeouts: AtomicU64,
    stale: AtomicU64,
}

pub struct Dispatcher {
    runtime: Option<Runtime>,
    handle: Handle,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    objects: DashMap<IoObjectId, Arc<dyn IoObject>>,
    next_id: AtomicU64,
    dispatch_timeout: Duration,
    running: AtomicBool,
    counters: DispatcherCounters,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> CoreResult<Arc<Self>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.io_driver_threads)
            .thread_name("io-driver")
            .enable_all()
            .build()
            .map_err(|e| CoreError::io("tokio runtime", e))?;
        let handle = runtime.handle().clone();
        let (completion_tx, completion_rx) = unbounded();

        info!(
            "디스패처 생성 - I/O 드라이버 스레드: {}",
            config.io_driver_threads
        );

        Ok(Arc::new(Self {
            runtime: Some(runtime),
            handle,
            completion_tx,
            completion_rx,
            objects: DashMap::new(),
            next_id: AtomicU64::new(1),
            dispatch_timeout: config.dispatch_timeout,
            running: AtomicBool::new(true),
            counters: DispatcherCounters::default(),
        }))
    }

    /// 새 I/O 객체 ID 발급
    pub fn next_object_id(&self) -> IoObjectId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 소유 객체 등록. 실패는 호출자에게 보고됩니다.
    pub fn register(&self, object: Arc<dyn IoObject>) -> CoreResult<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(CoreError::ShutDown("dispatcher"));
        }

        let id = object.io_id();
        match self.objects.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CoreError::Registration(format!(
                "이미 등록된 I/O 객체: {id}"
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(object);
                trace!("I/O 객체 등록: {}", id);
                Ok(())
            }
        }
    }

    /// 등록 해제. 등록되어 있었다면 `true`.
    pub fn unregister(&self, id: IoObjectId) -> bool {
        let removed = self.objects.remove(&id).is_some();
        if removed {
            trace!("I/O 객체 등록 해제: {}", id);
        }
        removed
    }

    pub fn is_registered(&self, id: IoObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// 비동기 작업을 시작합니다. 끝나면 `owner` 앞으로 완료가 올라옵니다.
    pub fn spawn<F>(&self, owner: IoObjectId, operation: F) -> AbortHandle
    where
        F: Future<Output = IoEvent> + Send + 'static,
    {
        let completion_tx = self.completion_tx.clone();
        let task = self.handle.spawn(async move {
            let event = operation.await;
            // 수신 측은 디스패처와 수명을 같이 하므로 실패는 종료 중일 때뿐
            let _ = completion_tx.send(Completion { owner, event });
        });
        task.abort_handle()
    }

    /// I/O 없이 즉시 완료를 올립니다.
    pub fn post(&self, owner: IoObjectId, event: IoEvent) {
        let _ = self.completion_tx.send(Completion { owner, event });
    }

    /// 완료 하나를 최대 `timeout` 동안 기다려 소유자에게 전달합니다.
    pub fn dispatch(&self, timeout: Duration) -> DispatchStatus {
        let completion = match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => completion,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                return DispatchStatus::Timeout;
            }
        };

        // 샤드 락을 잡은 채로 콜백하지 않도록 먼저 복제
        let owner = self
            .objects
            .get(&completion.owner)
            .map(|entry| entry.value().clone());

        match owner {
            Some(owner) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                owner.dispatch(completion.event);
                DispatchStatus::Dispatched
            }
            None => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "등록 해제된 객체 {} 의 {} 완료 폐기",
                    completion.owner,
                    completion.event.kind()
                );
                DispatchStatus::Stale
            }
        }
    }

    /// I/O 워커 스레드 루프
    pub fn run_worker(&self) {
        debug!("I/O 워커 시작");
        while self.running.load(Ordering::Acquire) {
            self.dispatch(self.dispatch_timeout);
        }
        debug!("I/O 워커 종료");
    }

    /// `predicate` 가 참이 될 때까지 현재 스레드에서 디스패치합니다 (워커 없는 테스트용).
    pub fn dispatch_until(&self, timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !predicate() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            self.dispatch(Duration::from_millis(5));
        }
        true
    }

    pub fn runtime_handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 워커 루프 중단 요청. 이후 등록은 거부됩니다.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("디스패처 종료 요청 (등록 객체 {}개)", self.objects.len());
        }
    }

    /// 등록된 객체를 모두 내려놓습니다 (워커 종료 후).
    pub fn clear_objects(&self) -> usize {
        let count = self.objects.len();
        self.objects.clear();
        count
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            stale_completions: self.counters.stale.load(Ordering::Relaxed),
            registered: self.objects.len(),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
