//! 서비스: 세션 테이블과 접속 정책
//!
//! - [`ServerService`]: 리스너를 열고 들어오는 연결마다 세션을 만듭니다.
//! - [`ClientService`]: `max_session_count` 만큼 원격에 접속합니다 (더미 클라이언트, 부하 테스트).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::context::AppContext;
use crate::error::CoreResult;
use crate::lock::{LockContext, SpinRwLock};
use crate::memory::{PoolAllocator, SendBuffer};
use crate::network::address::NetAddress;
use crate::network::dispatcher::Dispatcher;
use crate::network::listener::Listener;
use crate::network::session::{Session, SessionFactory, SessionParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    Server,
    Client,
}

/// 서비스 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub accepted: u64,
    pub connected: u64,
    pub disconnected: u64,
    pub connect_failed: u64,
    pub current_sessions: usize,
}

#[derive(Default)]
struct ServiceCounters {
    accepted: AtomicU64,
    connected: AtomicU64,
    disconnected: AtomicU64,
    connect_failed: AtomicU64,
}

pub struct Service {
    service_type: ServiceType,
    address: NetAddress,
    network: NetworkConfig,
    factory: SessionFactory,
    dispatcher: Arc<Dispatcher>,
    allocator: Arc<PoolAllocator>,
    lock_context: LockContext,
    sessions: SpinRwLock<HashMap<u64, Arc<Session>>>,
    next_session_id: AtomicU64,
    counters: ServiceCounters,
    self_ref: Weak<Service>,
}

impl Service {
    pub fn new(
        service_type: ServiceType,
        address: NetAddress,
        factory: SessionFactory,
        context: &AppContext,
    ) -> Arc<Self> {
        let lock_context = context.lock_context().clone();
        Arc::new_cyclic(|self_ref| Self {
            service_type,
            address,
            network: context.config().network.clone(),
            factory,
            dispatcher: context.dispatcher().clone(),
            allocator: context.allocator().clone(),
            sessions: SpinRwLock::new("ServiceSessions", &lock_context, HashMap::new()),
            lock_context,
            next_session_id: AtomicU64::new(1),
            counters: ServiceCounters::default(),
            self_ref: self_ref.clone(),
        })
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn address(&self) -> &NetAddress {
        &self.address
    }

    pub fn network_config(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// 팩토리로 핸들러를 만들어 새 세션을 생성합니다. 테이블에는 연결된 뒤에 들어갑니다.
    pub fn create_session(&self) -> Arc<Session> {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        Session::new(SessionParams {
            session_id,
            handler: (self.factory)(),
            dispatcher: self.dispatcher.clone(),
            service: self.self_ref.clone(),
            allocator: self.allocator.clone(),
            lock_context: &self.lock_context,
            recv_buffer_size: self.network.recv_buffer_size,
        })
    }

    pub(crate) fn add_session(&self, session: Arc<Session>) {
        self.counters.connected.fetch_add(1, Ordering::Relaxed);
        self.sessions.write().insert(session.session_id(), session);
    }

    pub(crate) fn release_session(&self, session: &Session) {
        let removed = self.sessions.write().remove(&session.session_id());
        if removed.is_some() {
            self.counters.disconnected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_accept(&self) {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_failed(&self) {
        self.counters.connect_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn find_session(&self, session_id: u64) -> Option<Arc<Session>> {
        self.sessions.read().get(&session_id).cloned()
    }

    /// 현재 세션 목록 스냅샷
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// 연결된 모든 세션에 보냅니다. 보낸 세션 수를 반환합니다.
    pub fn broadcast(&self, buffer: &SendBuffer) -> usize {
        // 락 안에서는 목록만 복사
        self.sessions()
            .iter()
            .filter(|session| session.send(buffer.clone()).is_ok())
            .count()
    }

    pub fn disconnect_all(&self, cause: &str) -> usize {
        self.sessions()
            .iter()
            .filter(|session| session.disconnect(cause))
            .count()
    }

    pub fn current_session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn max_session_count(&self) -> usize {
        self.network.max_session_count
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            connected: self.counters.connected.load(Ordering::Relaxed),
            disconnected: self.counters.disconnected.load(Ordering::Relaxed),
            connect_failed: self.counters.connect_failed.load(Ordering::Relaxed),
            current_sessions: self.current_session_count(),
        }
    }
}

/// 리스너를 여는 서버 서비스
pub struct ServerService {
    service: Arc<Service>,
    listener: Mutex<Option<Arc<Listener>>>,
}

impl ServerService {
    pub fn new(context: &AppContext, address: NetAddress, factory: SessionFactory) -> Self {
        Self {
            service: Service::new(ServiceType::Server, address, factory, context),
            listener: Mutex::new(None),
        }
    }

    /// 리스너를 열고 실제로 바인딩된 주소를 반환합니다 (포트 0 이면 OS 가 고른 포트).
    pub fn start(&self) -> CoreResult<NetAddress> {
        let mut slot = self.listener.lock();
        if let Some(listener) = slot.as_ref() {
            return Ok(listener.local_address());
        }

        let listener = Listener::start(&self.service)?;
        let local_address = listener.local_address();
        *slot = Some(listener);
        Ok(local_address)
    }

    pub fn local_address(&self) -> Option<NetAddress> {
        self.listener.lock().as_ref().map(|l| l.local_address())
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// 리스너를 닫고 모든 세션 연결을 해제합니다.
    pub fn close(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.close();
        }
        let count = self.service.disconnect_all("서버 종료");
        info!("서버 서비스 종료 (해제 요청 세션 {}개)", count);
    }
}

/// 원격에 접속하는 클라이언트 서비스
pub struct ClientService {
    service: Arc<Service>,
}

impl ClientService {
    pub fn new(context: &AppContext, address: NetAddress, factory: SessionFactory) -> Self {
        Self {
            service: Service::new(ServiceType::Client, address, factory, context),
        }
    }

    /// `max_session_count` 만큼 세션을 만들어 연결을 시작합니다.
    pub fn start(&self) -> CoreResult<Vec<Arc<Session>>> {
        let count = self.service.max_session_count();
        let sessions = (0..count)
            .map(|_| self.connect_one())
            .collect::<CoreResult<Vec<_>>>()?;
        debug!(
            "클라이언트 서비스 시작: {} 로 {}개 연결 시도",
            self.service.address(),
            count
        );
        Ok(sessions)
    }

    /// 세션 하나를 더 연결합니다.
    pub fn connect_one(&self) -> CoreResult<Arc<Session>> {
        let session = self.service.create_session();
        session.connect(*self.service.address())?;
        Ok(session)
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    pub fn close(&self) {
        self.service.disconnect_all("클라이언트 종료");
    }
}
