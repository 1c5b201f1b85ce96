//! 채팅 서버 조립
//!
//! 엔진 컨텍스트 → 방 → 핸들러 맵 → 서버 서비스 순으로 만들고 워커를 띄웁니다.

use anyhow::{Context, Result};
use servercore::network::{NetAddress, ServerService, ServiceStats};
use servercore::AppContext;
use std::sync::Arc;
use tracing::info;

use crate::config::TcpServerConfig;
use crate::handler::{build_handlers, chat_session_factory};
use crate::room::Room;

pub struct ChatServer {
    context: Arc<AppContext>,
    room: Arc<Room>,
    server: ServerService,
}

impl ChatServer {
    pub fn new(config: &TcpServerConfig) -> Result<Self> {
        let engine = config.engine_config();
        let policy = engine.packet.unknown_packet_policy;
        let context = AppContext::new(engine).context("엔진 컨텍스트 생성 실패")?;

        let room = Room::new(1, &context, config.max_room_players);
        let handlers = Arc::new(build_handlers(&room, context.send_buffers(), policy));
        let server = ServerService::new(
            &context,
            config.bind_address()?,
            chat_session_factory(room.clone(), handlers),
        );
        room.start_tick(config.room_tick);

        Ok(Self {
            context,
            room,
            server,
        })
    }

    /// 워커를 띄우고 리슨을 시작합니다. 실제 바인딩 주소를 반환합니다.
    pub fn start(&self) -> Result<NetAddress> {
        self.context
            .start_workers()
            .context("워커 스레드 시작 실패")?;
        let address = self.server.start().context("TCP 리스너 시작 실패")?;
        info!("✅ 채팅 서버가 {}에서 실행 중입니다", address);
        Ok(address)
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    pub fn stats(&self) -> ServiceStats {
        self.server.service().stats()
    }

    /// 리스너와 세션을 닫고 워커를 멈춥니다.
    pub fn stop(&self) {
        info!("🛑 채팅 서버 중지 중...");
        self.server.close();
        self.context.shutdown();
        info!("✅ 채팅 서버가 성공적으로 중지되었습니다");
    }
}
