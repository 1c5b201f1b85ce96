//! 잡 기반 동시성
//!
//! - `job`: 한 번 실행되는 지연 호출
//! - `queue`: 엔티티별 잡 큐 (한 번에 한 워커만 flush)
//! - `manager`: hot 큐를 워커 풀에 분배
//! - `timer`: 지연 예약을 큐로 옮기는 타이머
//! - `serializer`: 엔티티에 잡 큐를 붙이는 트레이트

#[allow(clippy::module_inception)]
pub mod job;
pub mod manager;
pub mod queue;
pub mod serializer;
pub mod timer;

pub use job::Job;
pub use manager::{JobQueueManager, JobStats};
pub use queue::JobQueue;
pub use serializer::JobSerializer;
pub use timer::JobTimer;
