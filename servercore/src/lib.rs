//! 게임 서버 엔진 코어
//!
//! 비동기 네트워킹, 잡 기반 동시성, 데드락 감지를 제공합니다.
//!
//! - `network`: 디스패처, 세션, 리스너, 서비스, 패킷 프레이밍
//! - `job`: 엔티티별 잡 큐와 타이머
//! - `lock`: Reader/Writer 스핀락과 데드락 프로파일러
//! - `memory` / `buffer`: 풀링된 메모리와 송수신 버퍼
//! - `context`: 구성요소 생성과 워커 스레드 수명 관리

pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod lock;
pub mod logging;
pub mod memory;
pub mod network;
pub mod thread;

pub use config::{EngineConfig, UnknownPacketPolicy};
pub use context::AppContext;
pub use error::{fatal, CoreError, CoreResult, ErrorSeverity};
pub use job::{Job, JobQueue, JobQueueManager, JobSerializer, JobTimer};
pub use logging::{init_logging, LoggingConfig};
pub use memory::{SendBuffer, SendBufferManager};
pub use network::{
    ClientService, NetAddress, Packet, PacketHandlerMap, PacketPayload, PacketSession,
    PacketSessionHandler, ServerService, Session, SessionFactory, SessionHandler,
};
