//! 패킷 프레이밍과 핸들러 맵
//!
//! 와이어 포맷 (little-endian, 패딩 없음):
//!
//! ```text
//! +-----------+-----------+----------------+
//! | size: u16 | id: u16   | body           |
//! +-----------+-----------+----------------+
//! ```
//!
//! `size` 는 헤더를 포함한 전체 크기입니다.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::buffer::{BufferReader, LeBytes};
use crate::config::UnknownPacketPolicy;
use crate::error::{CoreError, CoreResult};
use crate::memory::{SendBuffer, SendBufferManager};
use crate::network::session::{Session, SessionHandler};

pub const PACKET_HEADER_SIZE: usize = u16::SIZE * 2;

/// 패킷 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub size: u16,
    pub id: u16,
}

impl PacketHeader {
    /// 헤더를 읽습니다. 데이터가 헤더보다 짧으면 `None`.
    pub fn peek(data: &[u8]) -> Option<Self> {
        let mut reader = BufferReader::new(data);
        let size = reader.read::<u16>()?;
        let id = reader.read::<u16>()?;
        Some(Self { size, id })
    }

    pub fn body_size(&self) -> usize {
        (self.size as usize).saturating_sub(PACKET_HEADER_SIZE)
    }
}

/// 완성된 패킷 하나 (헤더 포함)
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub data: &'a [u8],
}

impl<'a> Packet<'a> {
    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn body(&self) -> &'a [u8] {
        &self.data[PACKET_HEADER_SIZE..]
    }
}

/// 패킷 본문으로 직렬화되는 타입
pub trait PacketPayload: Sized {
    fn encode(&self) -> CoreResult<Vec<u8>>;

    fn decode(body: &[u8]) -> CoreResult<Self>;
}

/// 받은 바이트열에서 완성된 패킷만 잘라 `on_packet` 에 넘깁니다.
///
/// 소비한 바이트 수를 반환합니다. 뒤에 남은 불완전한 패킷은 소비하지 않습니다.
/// 헤더 크기보다 작은 `size` 는 스트림이 깨진 것이므로 에러입니다.
pub fn frame_packets<F>(data: &[u8], mut on_packet: F) -> CoreResult<usize>
where
    F: FnMut(Packet<'_>),
{
    let mut processed = 0;

    loop {
        let rest = &data[processed..];
        let Some(header) = PacketHeader::peek(rest) else {
            break;
        };

        let size = header.size as usize;
        if size < PACKET_HEADER_SIZE {
            return Err(CoreError::PacketDecode {
                id: header.id,
                message: format!("잘못된 패킷 크기: {size}"),
            });
        }
        if size > rest.len() {
            break;
        }

        on_packet(Packet {
            header,
            data: &rest[..size],
        });
        processed += size;
    }

    Ok(processed)
}

/// 헤더를 붙인 송신 버퍼를 만듭니다.
pub fn make_raw_send_buffer(
    manager: &SendBufferManager,
    id: u16,
    body: &[u8],
) -> CoreResult<SendBuffer> {
    let size = PACKET_HEADER_SIZE + body.len();
    if size > u16::MAX as usize || size > manager.chunk_size() {
        return Err(CoreError::PacketTooLarge { id, size });
    }

    Ok(manager.write(size, |writer| {
        writer.write(size as u16);
        writer.write(id);
        writer.write_bytes(body);
        writer.write_size()
    }))
}

/// 페이로드를 직렬화해 송신 버퍼로 만듭니다.
pub fn make_send_buffer<P: PacketPayload>(
    manager: &SendBufferManager,
    id: u16,
    payload: &P,
) -> CoreResult<SendBuffer> {
    let body = payload.encode()?;
    make_raw_send_buffer(manager, id, &body)
}

/// 패킷 단위 세션 훅
pub trait PacketSessionHandler: Send + Sync {
    fn on_connected(&self, _session: &Arc<Session>) {}

    fn on_disconnected(&self, _session: &Arc<Session>, _cause: &str) {}

    fn on_recv_packet(&self, session: &Arc<Session>, packet: Packet<'_>);

    fn on_sent(&self, _session: &Arc<Session>, _num_bytes: usize) {}
}

/// 바이트 스트림을 패킷으로 잘라 [`PacketSessionHandler`] 에 넘기는 어댑터
pub struct PacketSession<H> {
    handler: H,
}

impl<H: PacketSessionHandler> PacketSession<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn inner(&self) -> &H {
        &self.handler
    }
}

impl<H: PacketSessionHandler> SessionHandler for PacketSession<H> {
    fn on_connected(&self, session: &Arc<Session>) {
        self.handler.on_connected(session);
    }

    fn on_disconnected(&self, session: &Arc<Session>, cause: &str) {
        self.handler.on_disconnected(session, cause);
    }

    fn on_received(&self, session: &Arc<Session>, data: &[u8]) -> usize {
        match frame_packets(data, |packet| self.handler.on_recv_packet(session, packet)) {
            Ok(processed) => processed,
            Err(e) => {
                e.log("패킷 프레이밍");
                session.disconnect(&e.to_string());
                data.len()
            }
        }
    }

    fn on_sent(&self, session: &Arc<Session>, num_bytes: usize) {
        self.handler.on_sent(session, num_bytes);
    }
}

type PacketHandlerFn = Box<dyn Fn(&Arc<Session>, &[u8]) -> CoreResult<()> + Send + Sync>;

/// 패킷 ID → 핸들러
pub struct PacketHandlerMap {
    handlers: HashMap<u16, PacketHandlerFn>,
    unknown_policy: UnknownPacketPolicy,
}

impl PacketHandlerMap {
    pub fn new(unknown_policy: UnknownPacketPolicy) -> Self {
        Self {
            handlers: HashMap::new(),
            unknown_policy,
        }
    }

    /// 본문을 `P` 로 디코딩해 넘기는 핸들러를 등록합니다.
    pub fn register_handler<P, F>(&mut self, id: u16, handler: F)
    where
        P: PacketPayload + 'static,
        F: Fn(&Arc<Session>, P) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.register_raw(id, move |session, body| handler(session, P::decode(body)?));
    }

    /// 본문 바이트를 그대로 넘기는 핸들러를 등록합니다.
    pub fn register_raw<F>(&mut self, id: u16, handler: F)
    where
        F: Fn(&Arc<Session>, &[u8]) -> CoreResult<()> + Send + Sync + 'static,
    {
        if self.handlers.insert(id, Box::new(handler)).is_some() {
            warn!("패킷 핸들러 덮어씀: id {}", id);
        }
    }

    pub fn is_registered(&self, id: u16) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn unknown_policy(&self) -> UnknownPacketPolicy {
        self.unknown_policy
    }

    /// 패킷을 처리합니다. 핸들러가 성공하면 `true`.
    pub fn handle_packet(&self, session: &Arc<Session>, packet: Packet<'_>) -> bool {
        let Some(handler) = self.handlers.get(&packet.id()) else {
            warn!(
                "알 수 없는 패킷: 세션 {}, id {}, 크기 {}",
                session.session_id(),
                packet.id(),
                packet.header.size
            );
            if self.unknown_policy == UnknownPacketPolicy::Disconnect {
                session.disconnect("알 수 없는 패킷");
            }
            return false;
        };

        match handler(session, packet.body()) {
            Ok(()) => true,
            Err(e) => {
                e.log("패킷 처리");
                if self.unknown_policy == UnknownPacketPolicy::Disconnect {
                    session.disconnect(&e.to_string());
                } else {
                    debug!("세션 {} 패킷 {} 처리 실패, 무시", session.session_id(), packet.id());
                }
                false
            }
        }
    }
}
