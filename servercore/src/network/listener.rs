//! 리스너
//!
//! accept 슬롯을 미리 걸어두고, 완료될 때마다 같은 슬롯을 즉시 다시 겁니다.
//! accept 에러가 나도 슬롯은 버리지 않습니다.

use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::{CoreError, CoreResult};
use crate::network::address::NetAddress;
use crate::network::dispatcher::{Dispatcher, IoEvent, IoObject, IoObjectId};
use crate::network::service::Service;
use crate::network::socket_utils;

pub struct Listener {
    io_id: IoObjectId,
    listener: Arc<TcpListener>,
    local_address: NetAddress,
    network: NetworkConfig,
    service: Weak<Service>,
    dispatcher: Arc<Dispatcher>,
    slots: Mutex<Vec<Option<AbortHandle>>>,
    closed: AtomicBool,
}

impl Listener {
    /// 서비스 주소에 바인딩하고 accept 슬롯을 겁니다.
    pub fn start(service: &Arc<Service>) -> CoreResult<Arc<Self>> {
        let network = service.network_config().clone();
        let dispatcher = service.dispatcher().clone();

        let std_listener = socket_utils::bind_listener(service.address(), &network)?;
        let listener = {
            let _guard = dispatcher.runtime_handle().enter();
            TcpListener::from_std(std_listener).map_err(|e| CoreError::io("listener 등록", e))?
        };
        let local_address = listener
            .local_addr()
            .map(NetAddress::from)
            .map_err(|e| CoreError::io("local_addr", e))?;

        let slot_count = network.accept_slots;
        let this = Arc::new(Self {
            io_id: dispatcher.next_object_id(),
            listener: Arc::new(listener),
            local_address,
            network,
            service: Arc::downgrade(service),
            dispatcher: dispatcher.clone(),
            slots: Mutex::new((0..slot_count).map(|_| None).collect()),
            closed: AtomicBool::new(false),
        });

        dispatcher.register(this.clone())?;
        for slot in 0..slot_count {
            this.register_accept(slot);
        }

        info!(
            "리스너 시작: {} (accept 슬롯 {})",
            this.local_address, slot_count
        );
        Ok(this)
    }

    pub fn local_address(&self) -> NetAddress {
        self.local_address
    }

    pub fn accept_slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 걸어둔 accept 를 모두 취소하고 디스패처에서 빠집니다.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in self.slots.lock().iter_mut().filter_map(Option::take) {
            task.abort();
        }
        self.dispatcher.unregister(self.io_id);
        info!("리스너 종료: {}", self.local_address);
    }

    fn register_accept(&self, slot: usize) {
        if self.is_closed() {
            return;
        }

        let listener = self.listener.clone();
        let task = self.dispatcher.spawn(self.io_id, async move {
            IoEvent::Accept {
                slot,
                result: listener.accept().await,
            }
        });

        let mut slots = self.slots.lock();
        if let Some(entry) = slots.get_mut(slot) {
            *entry = Some(task);
        }
        drop(slots);

        // close 와 경합한 경우
        if self.is_closed() {
            if let Some(task) = self.slots.lock().get_mut(slot).and_then(Option::take) {
                task.abort();
            }
        }
    }

    fn process_accept(&self, slot: usize, result: io::Result<(TcpStream, SocketAddr)>) {
        match result {
            Ok((stream, peer)) => self.on_accepted(stream, peer),
            Err(e) => warn!("accept 실패 (슬롯 {}): {}", slot, e),
        }
        self.register_accept(slot);
    }

    fn on_accepted(&self, stream: TcpStream, peer: SocketAddr) {
        let Some(service) = self.service.upgrade() else {
            debug!("서비스가 없어 연결을 닫습니다: {}", peer);
            return;
        };

        if let Err(e) =
            socket_utils::apply_stream_options(&socket2::SockRef::from(&stream), &self.network)
        {
            e.log("accept 소켓 옵션 적용");
        }

        if service.current_session_count() >= service.max_session_count() {
            warn!(
                "최대 세션 수 초과로 연결 거부: {} ({}/{})",
                peer,
                service.current_session_count(),
                service.max_session_count()
            );
            return;
        }

        service.record_accept();
        let session = service.create_session();
        if let Err(e) = session.accept(stream, peer) {
            e.log("세션 accept");
        }
    }
}

impl IoObject for Listener {
    fn io_id(&self) -> IoObjectId {
        self.io_id
    }

    fn dispatch(self: Arc<Self>, event: IoEvent) {
        match event {
            IoEvent::Accept { slot, result } => self.process_accept(slot, result),
            other => warn!("리스너에 예상하지 못한 이벤트: {}", other.kind()),
        }
    }
}
