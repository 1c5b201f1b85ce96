//! Reader/Writer 스핀락
//!
//! 하나의 `AtomicU32` 에 쓰기 소유 스레드 ID(상위 16비트)와 읽기 카운트(하위 16비트)를 담습니다.
//! CAS 실패 시 지수적으로 늘어나는 스핀 후 양보하며, 타임아웃을 넘기면 프로세스를 중단합니다.
//! 같은 스레드의 재귀 획득은 허용하지 않습니다.

use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::LockConfig;
use crate::error::fatal;
use crate::lock::deadlock::DeadlockProfiler;
use crate::thread::current_thread_id;

const EMPTY_FLAG: u32 = 0x0000_0000;
const WRITE_THREAD_MASK: u32 = 0xFFFF_0000;
const READ_COUNT_MASK: u32 = 0x0000_FFFF;

/// 락 생성 시 주입되는 공통 설정 (타임아웃, 스핀 상한, 프로파일러)
#[derive(Clone)]
pub struct LockContext {
    acquire_timeout: Duration,
    max_spin_count: u32,
    profiler: Option<Arc<DeadlockProfiler>>,
}

impl Default for LockContext {
    fn default() -> Self {
        Self::from_config(&LockConfig::default(), None)
    }
}

impl LockContext {
    pub fn from_config(config: &LockConfig, profiler: Option<Arc<DeadlockProfiler>>) -> Self {
        Self {
            acquire_timeout: config.acquire_timeout,
            max_spin_count: config.max_spin_count.max(1),
            profiler,
        }
    }

    /// 프로파일러 없이 타임아웃만 지정
    pub fn with_timeout(acquire_timeout: Duration) -> Self {
        Self {
            acquire_timeout,
            ..Self::from_config(&LockConfig::default(), None)
        }
    }

    pub fn with_profiler(mut self, profiler: Arc<DeadlockProfiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn profiler(&self) -> Option<&Arc<DeadlockProfiler>> {
        self.profiler.as_ref()
    }
}

/// Reader/Writer 스핀락
pub struct RwSpinLock {
    lock_flag: AtomicU32,
    name: &'static str,
    context: LockContext,
}

impl RwSpinLock {
    /// `name` 은 데드락 감지 그래프의 노드 이름입니다 (보통 타입 이름).
    pub fn new(name: &'static str, context: &LockContext) -> Self {
        Self {
            lock_flag: AtomicU32::new(EMPTY_FLAG),
            name,
            context: context.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 쓰기 락 획득
    pub fn lock_write(&self) {
        let thread_id = current_thread_id();
        let owner = (self.lock_flag.load(Ordering::Relaxed) & WRITE_THREAD_MASK) >> 16;
        if owner == thread_id {
            fatal(&format!("쓰기 락 재귀 획득: {}", self.name));
        }

        // 실제로 막히기 전에 순서 그래프부터 검사
        if let Some(profiler) = &self.context.profiler {
            profiler.push_lock(self.name);
        }

        let desired = (thread_id << 16) & WRITE_THREAD_MASK;
        self.spin_until("LOCK_WRITE_TIMEOUT", || {
            self.lock_flag
                .compare_exchange_weak(EMPTY_FLAG, desired, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        });
    }

    /// 쓰기 락 해제
    pub fn unlock_write(&self) {
        let flag = self.lock_flag.load(Ordering::Relaxed);
        if (flag & READ_COUNT_MASK) != 0 || (flag >> 16) != current_thread_id() {
            fatal(&format!("잘못된 쓰기 락 해제: {}", self.name));
        }

        if let Some(profiler) = &self.context.profiler {
            profiler.pop_lock(self.name);
        }

        self.lock_flag.store(EMPTY_FLAG, Ordering::Release);
    }

    /// 읽기 락 획득
    pub fn lock_read(&self) {
        let owner = (self.lock_flag.load(Ordering::Relaxed) & WRITE_THREAD_MASK) >> 16;
        if owner == current_thread_id() {
            fatal(&format!("쓰기 락 보유 중 읽기 락 획득: {}", self.name));
        }

        if let Some(profiler) = &self.context.profiler {
            profiler.push_lock(self.name);
        }

        self.spin_until("LOCK_READ_TIMEOUT", || {
            let expected = self.lock_flag.load(Ordering::Relaxed) & READ_COUNT_MASK;
            if expected == READ_COUNT_MASK {
                fatal(&format!("읽기 카운트 초과: {}", self.name));
            }
            self.lock_flag
                .compare_exchange_weak(expected, expected + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        });
    }

    /// 읽기 락 해제
    pub fn unlock_read(&self) {
        if let Some(profiler) = &self.context.profiler {
            profiler.pop_lock(self.name);
        }

        let previous = self.lock_flag.fetch_sub(1, Ordering::Release);
        if (previous & READ_COUNT_MASK) == 0 {
            fatal(&format!("읽기 락 중복 해제: {}", self.name));
        }
    }

    /// 성공할 때까지 지수 백오프로 재시도, 상한 도달 후에는 양보
    fn spin_until(&self, timeout_reason: &str, mut try_acquire: impl FnMut() -> bool) {
        let start = Instant::now();
        let mut backoff: u32 = 1;

        loop {
            if try_acquire() {
                return;
            }

            for _ in 0..backoff {
                spin_loop();
            }
            if backoff < self.context.max_spin_count {
                backoff = (backoff * 2).min(self.context.max_spin_count);
            } else {
                std::thread::yield_now();
            }

            if start.elapsed() >= self.context.acquire_timeout {
                fatal(&format!("{}: {}", timeout_reason, self.name));
            }
        }
    }

    /// 쓰기 가드
    pub fn write(&self) -> WriteLockGuard<'_> {
        self.lock_write();
        WriteLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// 읽기 가드
    pub fn read(&self) -> ReadLockGuard<'_> {
        self.lock_read();
        ReadLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }
}

// 가드는 획득한 스레드에서만 해제되어야 합니다 (스레드 로컬 락 스택).

/// 쓰기 락 가드
pub struct WriteLockGuard<'a> {
    lock: &'a RwSpinLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WriteLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}

/// 읽기 락 가드
pub struct ReadLockGuard<'a> {
    lock: &'a RwSpinLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

/// [`RwSpinLock`] 으로 보호되는 값
pub struct SpinRwLock<T> {
    lock: RwSpinLock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinRwLock<T> {}
unsafe impl<T: Send + Sync> Sync for SpinRwLock<T> {}

impl<T> SpinRwLock<T> {
    pub fn new(name: &'static str, context: &LockContext, value: T) -> Self {
        Self {
            lock: RwSpinLock::new(name, context),
            data: UnsafeCell::new(value),
        }
    }

    pub fn write(&self) -> SpinWriteGuard<'_, T> {
        let guard = self.lock.write();
        SpinWriteGuard {
            _guard: guard,
            data: &self.data,
        }
    }

    pub fn read(&self) -> SpinReadGuard<'_, T> {
        let guard = self.lock.read();
        SpinReadGuard {
            _guard: guard,
            data: &self.data,
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

pub struct SpinWriteGuard<'a, T> {
    _guard: WriteLockGuard<'a>,
    data: &'a UnsafeCell<T>,
}

impl<T> Deref for SpinWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 쓰기 락이 유지되는 동안 유일한 접근자
        unsafe { &*self.data.get() }
    }
}

impl<T> DerefMut for SpinWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 쓰기 락이 유지되는 동안 유일한 접근자
        unsafe { &mut *self.data.get() }
    }
}

pub struct SpinReadGuard<'a, T> {
    _guard: ReadLockGuard<'a>,
    data: &'a UnsafeCell<T>,
}

impl<T> Deref for SpinReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 읽기 락 동안에는 쓰기 접근자가 없음
        unsafe { &*self.data.get() }
    }
}
