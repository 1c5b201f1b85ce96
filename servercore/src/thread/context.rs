//! 스레드 로컬 실행 컨텍스트
//!
//! 각 워커 스레드는 시작 시 [`ThreadContext::init`] 으로 논리 스레드 ID 를 받고,
//! 종료 시 [`ThreadContext::destroy`] 로 스레드 로컬 캐시(SendChunk, 락 스택)를 정리합니다.

use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use crate::error::fatal;
use crate::lock::deadlock;
use crate::memory::send_buffer;

/// 락 워드의 쓰기 영역(16비트)에 들어가야 하므로 ID 는 1..=0xFFFF 범위입니다.
const MAX_THREAD_ID: u32 = 0xFFFF;

/// 스레드 ID 발급기
///
/// 종료한 스레드의 ID 는 free list 로 돌아가 재사용되므로, 살아 있는 두 스레드가
/// 같은 ID 를 갖는 일은 없습니다. 동시에 살아 있는 스레드가 `max` 개를 넘으면 발급 실패.
struct ThreadIdPool {
    next: AtomicU32,
    max: u32,
    free: Mutex<Vec<u32>>,
}

impl ThreadIdPool {
    const fn new(max: u32) -> Self {
        Self {
            next: AtomicU32::new(1),
            max,
            free: Mutex::new(Vec::new()),
        }
    }

    fn allocate(&self) -> Option<u32> {
        if let Some(id) = self.free.lock().pop() {
            return Some(id);
        }
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| {
                (next <= self.max).then_some(next + 1)
            })
            .ok()
    }

    fn release(&self, id: u32) {
        self.free.lock().push(id);
    }
}

static THREAD_IDS: ThreadIdPool = ThreadIdPool::new(MAX_THREAD_ID);

/// 스레드가 끝나면 ID 를 반환하는 슬롯
struct ThreadIdSlot(Cell<u32>);

impl Drop for ThreadIdSlot {
    fn drop(&mut self) {
        let id = self.0.replace(0);
        if id != 0 {
            THREAD_IDS.release(id);
        }
    }
}

thread_local! {
    static THREAD_ID: ThreadIdSlot = const { ThreadIdSlot(Cell::new(0)) };
}

/// 현재 스레드의 논리 ID (0 이 아님)
///
/// 워커가 아닌 스레드(테스트, main)에서도 처음 호출될 때 할당됩니다.
pub fn current_thread_id() -> u32 {
    let id = THREAD_ID.try_with(|slot| {
        if slot.0.get() == 0 {
            match THREAD_IDS.allocate() {
                Some(id) => slot.0.set(id),
                None => fatal(&format!("스레드 ID 소진: 동시 스레드 {MAX_THREAD_ID}개 초과")),
            }
        }
        slot.0.get()
    });
    match id {
        Ok(id) => id,
        Err(_) => fatal("스레드 로컬 정리 이후에는 스레드 ID 를 쓸 수 없습니다"),
    }
}

/// 워커 스레드 컨텍스트
pub struct ThreadContext;

impl ThreadContext {
    /// 워커 시작 시 호출
    pub fn init() -> u32 {
        let id = current_thread_id();
        debug!(
            "스레드 컨텍스트 초기화: id={}, name={:?}",
            id,
            std::thread::current().name()
        );
        id
    }

    /// 워커 종료 시 호출
    pub fn destroy() {
        let cached = send_buffer::release_thread_cache();
        let held = deadlock::clear_thread_lock_stacks();
        if held > 0 {
            warn!("스레드 종료 시 해제되지 않은 락 {}개", held);
        }
        debug!(
            "스레드 컨텍스트 정리: id={}, 반환된 SendChunk={}",
            current_thread_id(),
            cached
        );
    }
}
