//! 채팅 방 TCP 서버
//!
//! 엔진 코어(`servercore`) 위에 올린 얇은 애플리케이션 계층입니다.
//!
//! # 모듈 구조
//!
//! - **config**: .env / 환경변수 기반 서버 설정
//! - **protocol**: 패킷 ID 와 JSON 페이로드
//! - **room**: 자기 잡 큐를 가진 채팅 방 엔티티
//! - **handler**: 패킷 핸들러 맵과 세션 팩토리
//! - **server**: 구성요소 조립과 시작/중지

pub mod config;
pub mod handler;
pub mod protocol;
pub mod room;
pub mod server;

pub use config::{validate_config, TcpServerConfig};
pub use room::Room;
pub use server::ChatServer;
