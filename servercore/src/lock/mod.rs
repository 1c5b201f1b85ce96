//! 락 프리미티브
//!
//! - `rw_spin_lock`: 타임아웃 시 중단하는 Reader/Writer 스핀락과 RAII 가드
//! - `deadlock`: 락 획득 순서 그래프로 잠재적 데드락을 감지

pub mod deadlock;
pub mod rw_spin_lock;

pub use deadlock::DeadlockProfiler;
pub use rw_spin_lock::{
    LockContext, ReadLockGuard, RwSpinLock, SpinReadGuard, SpinRwLock, SpinWriteGuard,
    WriteLockGuard,
};
