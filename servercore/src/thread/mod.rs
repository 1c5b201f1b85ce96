//! 스레드 관리
//!
//! - `context`: 스레드 로컬 실행 컨텍스트 (논리 스레드 ID, 캐시 정리)
//! - `manager`: 이름 있는 OS 워커 스레드 실행/조인

pub mod context;
pub mod manager;

pub use context::{current_thread_id, ThreadContext};
pub use manager::ThreadManager;
