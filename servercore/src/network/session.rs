//! 세션: 연결 하나의 상태 기계
//!
//! `Idle → Connecting → Connected → Disconnecting → Disconnected`
//!
//! - 수신: 한 번에 하나의 recv 만 진행되며, 완료 시 핸들러가 소비한 만큼만 버퍼에서 빠집니다.
//! - 송신: 진행 중인 send 가 없을 때만 대기열 전체를 한 번의 scatter-gather 쓰기로 내보냅니다.
//!   진행 중에 쌓인 버퍼는 완료 직후 다음 쓰기로 이어집니다.
//! - 모든 I/O 오류와 원격 종료는 [`Session::disconnect`] 하나로 모입니다.

use parking_lot::Mutex;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::buffer::RecvBuffer;
use crate::error::{CoreError, CoreResult};
use crate::lock::{LockContext, SpinRwLock};
use crate::memory::{PoolAllocator, SendBuffer};
use crate::network::address::NetAddress;
use crate::network::dispatcher::{Dispatcher, IoEvent, IoObject, IoObjectId};
use crate::network::service::Service;
use crate::network::socket_utils;

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
    Disconnected = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Disconnecting,
            _ => SessionState::Disconnected,
        }
    }
}

/// 세션 이벤트 훅
///
/// 모든 콜백은 I/O 워커 스레드에서 호출됩니다. 한 세션의 `on_received` 는 동시에 두 번 불리지 않습니다.
pub trait SessionHandler: Send + Sync {
    fn on_connected(&self, _session: &Arc<Session>) {}

    fn on_disconnected(&self, _session: &Arc<Session>, _cause: &str) {}

    /// 받은 데이터를 처리하고 완전히 소비한 바이트 수를 반환합니다.
    ///
    /// 소비하지 않은 바이트는 다음 수신 데이터 앞에 그대로 남습니다.
    fn on_received(&self, session: &Arc<Session>, data: &[u8]) -> usize;

    fn on_sent(&self, _session: &Arc<Session>, _num_bytes: usize) {}
}

/// 새 연결마다 핸들러를 만드는 팩토리
pub type SessionFactory = Arc<dyn Fn() -> Box<dyn SessionHandler> + Send + Sync>;

pub(crate) struct SessionParams<'a> {
    pub session_id: u64,
    pub handler: Box<dyn SessionHandler>,
    pub dispatcher: Arc<Dispatcher>,
    pub service: Weak<Service>,
    pub allocator: Arc<PoolAllocator>,
    pub lock_context: &'a LockContext,
    pub recv_buffer_size: usize,
}

pub struct Session {
    io_id: IoObjectId,
    session_id: u64,
    state: AtomicU8,
    handler: Box<dyn SessionHandler>,
    dispatcher: Arc<Dispatcher>,
    service: Weak<Service>,
    allocator: Arc<PoolAllocator>,
    recv_buffer_size: usize,
    remote: Mutex<Option<NetAddress>>,
    disconnect_cause: Mutex<Option<String>>,
    send_queue: SpinRwLock<Vec<SendBuffer>>,
    send_registered: AtomicBool,
    /// 진행 중인 send 가 없을 때만 채워져 있음
    writer: Mutex<Option<OwnedWriteHalf>>,
    recv_task: Mutex<Option<AbortHandle>>,
    send_task: Mutex<Option<AbortHandle>>,
}

impl Session {
    pub(crate) fn new(params: SessionParams<'_>) -> Arc<Self> {
        Arc::new(Self {
            io_id: params.dispatcher.next_object_id(),
            session_id: params.session_id,
            state: AtomicU8::new(SessionState::Idle as u8),
            handler: params.handler,
            dispatcher: params.dispatcher,
            service: params.service,
            allocator: params.allocator,
            recv_buffer_size: params.recv_buffer_size,
            remote: Mutex::new(None),
            disconnect_cause: Mutex::new(None),
            send_queue: SpinRwLock::new("SessionSendQueue", params.lock_context, Vec::new()),
            send_registered: AtomicBool::new(false),
            writer: Mutex::new(None),
            recv_task: Mutex::new(None),
            send_task: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn io_id(&self) -> IoObjectId {
        self.io_id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn remote_address(&self) -> Option<NetAddress> {
        *self.remote.lock()
    }

    /// 마지막 연결 해제 사유
    pub fn disconnect_cause(&self) -> Option<String> {
        self.disconnect_cause.lock().clone()
    }

    pub fn service(&self) -> Option<Arc<Service>> {
        self.service.upgrade()
    }

    pub fn handler(&self) -> &dyn SessionHandler {
        self.handler.as_ref()
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 서버 쪽에서 연결할 곳을 지정해 비동기 연결을 시작합니다.
    pub fn connect(self: &Arc<Self>, address: NetAddress) -> CoreResult<()> {
        if !self.transition(SessionState::Idle, SessionState::Connecting) {
            return Err(CoreError::Registration(format!(
                "세션 {} 은(는) {:?} 상태에서 연결할 수 없습니다",
                self.session_id,
                self.state()
            )));
        }
        if let Err(e) = self.dispatcher.register(self.clone()) {
            self.state
                .store(SessionState::Disconnected as u8, Ordering::Release);
            return Err(e);
        }

        let addr = address.socket_addr();
        debug!("세션 {} 연결 시도: {}", self.session_id, address);
        self.dispatcher.spawn(self.io_id, async move {
            IoEvent::Connect(TcpStream::connect(addr).await)
        });
        Ok(())
    }

    /// 리스너가 받아들인 소켓으로 연결 상태에 들어갑니다.
    pub(crate) fn accept(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> CoreResult<()> {
        if !self.transition(SessionState::Idle, SessionState::Connecting) {
            return Err(CoreError::Registration(format!(
                "세션 {} 은(는) 이미 사용 중입니다",
                self.session_id
            )));
        }
        if let Err(e) = self.dispatcher.register(self.clone()) {
            self.state
                .store(SessionState::Disconnected as u8, Ordering::Release);
            return Err(e);
        }

        *self.remote.lock() = Some(NetAddress::from(peer));
        self.process_connect(stream);
        Ok(())
    }

    /// 송신 대기열에 추가합니다. 진행 중인 send 가 없으면 바로 내보냅니다.
    pub fn send(&self, buffer: SendBuffer) -> CoreResult<()> {
        if !self.is_connected() {
            return Err(CoreError::SessionNotConnected(self.session_id));
        }

        let register = {
            let mut queue = self.send_queue.write();
            queue.push(buffer);
            !self.send_registered.swap(true, Ordering::AcqRel)
        };
        if register {
            self.register_send();
        }
        Ok(())
    }

    /// 연결 해제를 요청합니다. 이미 해제 중이면 `false`.
    pub fn disconnect(&self, cause: &str) -> bool {
        if !self.transition(SessionState::Connected, SessionState::Disconnecting) {
            return false;
        }

        *self.disconnect_cause.lock() = Some(cause.to_string());
        debug!("세션 {} 연결 해제 요청: {}", self.session_id, cause);

        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.send_task.lock().take() {
            task.abort();
        }
        // 쓰기 반쪽을 닫으면 상대에게 FIN 이 전달됨
        drop(self.writer.lock().take());

        self.dispatcher.post(self.io_id, IoEvent::Disconnect);
        true
    }

    fn process_connect_result(self: &Arc<Self>, result: io::Result<TcpStream>) {
        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                let cause = format!("연결 실패: {e}");
                warn!("세션 {} {}", self.session_id, cause);
                *self.disconnect_cause.lock() = Some(cause.clone());
                self.state
                    .store(SessionState::Disconnected as u8, Ordering::Release);
                self.dispatcher.unregister(self.io_id);
                if let Some(service) = self.service.upgrade() {
                    service.record_connect_failed();
                }
                self.handler.on_disconnected(self, &cause);
                return;
            }
        };

        if let Some(service) = self.service.upgrade() {
            let options = socket2::SockRef::from(&stream);
            if let Err(e) = socket_utils::apply_stream_options(&options, service.network_config()) {
                e.log("연결 소켓 옵션 적용");
            }
        }
        *self.remote.lock() = stream.peer_addr().ok().map(NetAddress::from);
        self.process_connect(stream);
    }

    fn process_connect(self: &Arc<Self>, stream: TcpStream) {
        let (reader, writer) = stream.into_split();
        *self.writer.lock() = Some(writer);
        self.state
            .store(SessionState::Connected as u8, Ordering::Release);

        if let Some(service) = self.service.upgrade() {
            service.add_session(self.clone());
        }
        info!(
            "세션 {} 연결됨 (remote: {:?})",
            self.session_id,
            self.remote_address()
        );

        self.handler.on_connected(self);

        let buffer = RecvBuffer::new(self.recv_buffer_size, &self.allocator);
        self.register_recv(reader, buffer);
    }

    fn register_recv(&self, mut reader: OwnedReadHalf, mut buffer: RecvBuffer) {
        if !self.is_connected() {
            return;
        }
        if buffer.free_size() == 0 {
            self.disconnect("수신 버퍼가 가득 찼습니다");
            return;
        }

        let task = self.dispatcher.spawn(self.io_id, async move {
            let result = reader.read(buffer.write_slice()).await;
            IoEvent::Recv {
                reader,
                buffer,
                result,
            }
        });
        *self.recv_task.lock() = Some(task);
        // 등록 직전에 해제가 시작되었다면 여기서 정리
        if !self.is_connected() {
            if let Some(task) = self.recv_task.lock().take() {
                task.abort();
            }
        }
    }

    fn process_recv(
        self: &Arc<Self>,
        reader: OwnedReadHalf,
        mut buffer: RecvBuffer,
        result: io::Result<usize>,
    ) {
        let num_bytes = match result {
            Ok(0) => {
                self.disconnect("원격 종료");
                return;
            }
            Ok(num_bytes) => num_bytes,
            Err(e) => {
                self.handle_error("recv", e);
                return;
            }
        };
        if !self.is_connected() {
            return;
        }

        if !buffer.on_write(num_bytes) {
            self.disconnect("수신 버퍼 쓰기 초과");
            return;
        }

        let data_size = buffer.data_size();
        let processed = self.handler.on_received(self, buffer.read_slice());
        if processed > data_size || !buffer.on_read(processed) {
            self.disconnect("수신 처리 크기 오류");
            return;
        }
        trace!(
            "세션 {} 수신 {} 바이트, 처리 {} 바이트",
            self.session_id,
            num_bytes,
            processed
        );

        buffer.clean();
        self.register_recv(reader, buffer);
    }

    fn register_send(&self) {
        if !self.is_connected() {
            return;
        }

        let buffers = std::mem::take(&mut *self.send_queue.write());
        if buffers.is_empty() {
            self.send_registered.store(false, Ordering::Release);
            return;
        }
        let Some(mut writer) = self.writer.lock().take() else {
            // 해제 중
            return;
        };

        let task = self.dispatcher.spawn(self.io_id, async move {
            let result = write_all_vectored(&mut writer, &buffers).await;
            IoEvent::Send {
                writer,
                buffers,
                result,
            }
        });
        *self.send_task.lock() = Some(task);
        if !self.is_connected() {
            if let Some(task) = self.send_task.lock().take() {
                task.abort();
            }
        }
    }

    fn process_send(
        self: &Arc<Self>,
        writer: OwnedWriteHalf,
        buffers: Vec<SendBuffer>,
        result: io::Result<usize>,
    ) {
        let num_bytes = match result {
            Ok(num_bytes) => num_bytes,
            Err(e) => {
                self.handle_error("send", e);
                return;
            }
        };
        drop(buffers);
        if !self.is_connected() {
            return;
        }

        *self.writer.lock() = Some(writer);
        if !self.is_connected() {
            drop(self.writer.lock().take());
            return;
        }

        self.handler.on_sent(self, num_bytes);

        let has_more = {
            let queue = self.send_queue.write();
            if queue.is_empty() {
                self.send_registered.store(false, Ordering::Release);
                false
            } else {
                true
            }
        };
        if has_more {
            self.register_send();
        }
    }

    fn process_disconnect(self: &Arc<Self>) {
        self.state
            .store(SessionState::Disconnected as u8, Ordering::Release);
        let cause = self.disconnect_cause().unwrap_or_default();
        info!("세션 {} 연결 해제: {}", self.session_id, cause);

        self.handler.on_disconnected(self, &cause);

        if let Some(service) = self.service.upgrade() {
            service.release_session(self);
        }
        self.send_queue.write().clear();
        self.dispatcher.unregister(self.io_id);
    }

    fn handle_error(&self, operation: &str, error: io::Error) {
        match error.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => {
                debug!("세션 {} {} 종료: {}", self.session_id, operation, error)
            }
            _ => warn!("세션 {} {} 오류: {}", self.session_id, operation, error),
        }
        self.disconnect(&format!("{operation} 오류: {error}"));
    }
}

impl IoObject for Session {
    fn io_id(&self) -> IoObjectId {
        self.io_id
    }

    fn dispatch(self: Arc<Self>, event: IoEvent) {
        match event {
            IoEvent::Connect(result) => self.process_connect_result(result),
            IoEvent::Disconnect => self.process_disconnect(),
            IoEvent::Recv {
                reader,
                buffer,
                result,
            } => self.process_recv(reader, buffer, result),
            IoEvent::Send {
                writer,
                buffers,
                result,
            } => self.process_send(writer, buffers, result),
            IoEvent::Accept { .. } => {
                warn!("세션 {} 에 accept 완료가 도착", self.session_id)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        trace!("세션 {} 해제", self.session_id);
    }
}

/// 여러 버퍼를 순서대로 모두 씁니다. 부분 쓰기는 이어서 처리합니다.
async fn write_all_vectored(
    writer: &mut OwnedWriteHalf,
    buffers: &[SendBuffer],
) -> io::Result<usize> {
    let total: usize = buffers.iter().map(SendBuffer::len).sum();
    let mut index = 0;
    let mut offset = 0;

    loop {
        while index < buffers.len() && offset == buffers[index].len() {
            index += 1;
            offset = 0;
        }
        if index == buffers.len() {
            break;
        }

        let written = {
            let slices: Vec<IoSlice<'_>> =
                std::iter::once(IoSlice::new(&buffers[index].as_slice()[offset..]))
                    .chain(buffers[index + 1..].iter().map(|b| IoSlice::new(b.as_slice())))
                    .collect();
            writer.write_vectored(&slices).await?
        };
        if written == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }

        let mut remaining = written;
        while remaining > 0 {
            let left = buffers[index].len() - offset;
            if remaining >= left {
                remaining -= left;
                index += 1;
                offset = 0;
            } else {
                offset += remaining;
                remaining = 0;
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            SessionState::Idle,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Disconnecting,
            SessionState::Disconnected,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[tokio::test]
    async fn test_write_all_vectored_concatenates_in_order() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (mut server, _) = listener.accept().await.unwrap();
        let client = client.await.unwrap();

        let (_reader, mut writer) = client.into_split();
        let buffers = vec![
            SendBuffer::copy_from_slice(b"hello "),
            SendBuffer::copy_from_slice(b""),
            SendBuffer::copy_from_slice(b"world"),
        ];
        let written = write_all_vectored(&mut writer, &buffers).await.unwrap();
        assert_eq!(written, 11);
        drop(writer);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello world");
    }
}
