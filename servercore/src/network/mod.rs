//! 네트워크 계층
//!
//! - `dispatcher`: 완료 이벤트를 I/O 워커에 분배하는 디스패처
//! - `session`: 연결 하나의 상태 기계와 송수신 경로
//! - `listener`: accept 슬롯을 유지하는 리스너
//! - `service`: 세션 테이블, 서버/클라이언트 서비스
//! - `packet`: 패킷 헤더 프레이밍과 ID 별 핸들러 맵
//! - `address`, `socket_utils`: 주소와 소켓 옵션 헬퍼

pub mod address;
pub mod dispatcher;
pub mod listener;
pub mod packet;
pub mod service;
pub mod session;
pub mod socket_utils;

pub use address::NetAddress;
pub use dispatcher::{DispatchStatus, Dispatcher, DispatcherStats, IoEvent, IoObject, IoObjectId};
pub use listener::Listener;
pub use packet::{
    frame_packets, make_raw_send_buffer, make_send_buffer, Packet, PacketHandlerMap, PacketHeader,
    PacketPayload, PacketSession, PacketSessionHandler, PACKET_HEADER_SIZE,
};
pub use service::{ClientService, ServerService, Service, ServiceStats, ServiceType};
pub use session::{Session, SessionFactory, SessionHandler, SessionState};
