//! 메모리 풀링
//!
//! - `object_pool`: `SegQueue` 기반 범용 객체 풀과 통계
//! - `memory_pool`: 크기 클래스별 블록 풀 (`PoolAllocator`)
//! - `send_buffer`: 스레드 로컬 SendChunk 캐시와 송신 버퍼

pub mod memory_pool;
pub mod object_pool;
pub mod send_buffer;

pub use memory_pool::{MemoryPool, PoolAllocator, PooledBlock, MAX_ALLOC_SIZE};
pub use object_pool::{ObjectPool, PoolStats};
pub use send_buffer::{SendBuffer, SendBufferManager, SendChunk};
