//! 패킷 핸들러
//!
//! 방 상태를 건드리는 요청은 방의 잡 큐로 넘기고, 하트비트처럼 상태가 없는 요청은
//! I/O 워커에서 바로 응답합니다.

use servercore::config::UnknownPacketPolicy;
use servercore::network::{
    make_send_buffer, Packet, PacketHandlerMap, PacketSession, PacketSessionHandler, Session,
    SessionFactory, SessionHandler,
};
use servercore::{JobSerializer, SendBufferManager};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::protocol::{
    ChatRequest, EnterRoomRequest, HeartbeatRequest, HeartbeatResponse, LeaveRoomRequest,
    C_CHAT, C_ENTER_ROOM, C_HEARTBEAT, C_LEAVE_ROOM, S_HEARTBEAT,
};
use crate::room::Room;

/// 채팅 서버 패킷 핸들러 맵을 만듭니다.
pub fn build_handlers(
    room: &Arc<Room>,
    send_buffers: &Arc<SendBufferManager>,
    policy: UnknownPacketPolicy,
) -> PacketHandlerMap {
    let mut handlers = PacketHandlerMap::new(policy);

    let target = room.clone();
    handlers.register_handler::<EnterRoomRequest, _>(C_ENTER_ROOM, move |session, request| {
        let session = session.clone();
        target.push_method(move |room| room.enter(session, request.name));
        Ok(())
    });

    let target = room.clone();
    handlers.register_handler::<ChatRequest, _>(C_CHAT, move |session, request| {
        let player_id = session.session_id();
        target.push_method(move |room| room.chat(player_id, request.message));
        Ok(())
    });

    let target = room.clone();
    handlers.register_handler::<LeaveRoomRequest, _>(C_LEAVE_ROOM, move |session, _| {
        let player_id = session.session_id();
        target.push_method(move |room| room.leave(player_id));
        Ok(())
    });

    let buffers = send_buffers.clone();
    handlers.register_handler::<HeartbeatRequest, _>(C_HEARTBEAT, move |session, request| {
        let response = HeartbeatResponse {
            client_time: request.client_time,
            server_time_ms: now_millis(),
        };
        session.send(make_send_buffer(&buffers, S_HEARTBEAT, &response)?)
    });

    handlers
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// 세션 하나의 채팅 핸들러
pub struct ChatSession {
    room: Arc<Room>,
    handlers: Arc<PacketHandlerMap>,
}

impl PacketSessionHandler for ChatSession {
    fn on_connected(&self, session: &Arc<Session>) {
        debug!("채팅 세션 연결: {}", session.session_id());
    }

    fn on_disconnected(&self, session: &Arc<Session>, cause: &str) {
        let player_id = session.session_id();
        debug!("채팅 세션 해제: {} ({})", player_id, cause);
        self.room.push_method(move |room| room.leave(player_id));
    }

    fn on_recv_packet(&self, session: &Arc<Session>, packet: Packet<'_>) {
        self.handlers.handle_packet(session, packet);
    }
}

/// 연결마다 [`ChatSession`] 을 만드는 팩토리
pub fn chat_session_factory(room: Arc<Room>, handlers: Arc<PacketHandlerMap>) -> SessionFactory {
    Arc::new(move || -> Box<dyn SessionHandler> {
        Box::new(PacketSession::new(ChatSession {
            room: room.clone(),
            handlers: handlers.clone(),
        }))
    })
}
