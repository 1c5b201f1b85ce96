//! 범용 객체 풀
//!
//! `SegQueue` 기반 free list 로 객체를 재사용합니다. 반환 시 리셋 훅을 거치며,
//! 보관 한도를 넘는 객체는 폐기됩니다.

use crossbeam_queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::trace;

/// 풀 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// 새로 생성한 객체 수
    pub allocated: u64,
    /// 풀에서 꺼내 재사용한 객체 수
    pub reused: u64,
    /// 풀로 돌아온 객체 수
    pub returned: u64,
    /// 한도 초과로 폐기된 객체 수
    pub discarded: u64,
    /// 현재 풀에 보관 중인 객체 수
    pub pooled: usize,
}

impl PoolStats {
    /// 재사용률 (%)
    pub fn hit_rate_percent(&self) -> f64 {
        let total = self.allocated + self.reused;
        if total == 0 {
            return 0.0;
        }
        self.reused as f64 / total as f64 * 100.0
    }
}

#[derive(Default)]
struct PoolCounters {
    allocated: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type ResetHook<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// 객체 풀
pub struct ObjectPool<T> {
    free: SegQueue<T>,
    pooled: AtomicUsize,
    capacity: usize,
    factory: Factory<T>,
    reset: Option<ResetHook<T>>,
    counters: PoolCounters,
}

impl<T: Send> ObjectPool<T> {
    /// `capacity` 는 풀에 보관할 최대 객체 수입니다.
    pub fn new(capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: SegQueue::new(),
            pooled: AtomicUsize::new(0),
            capacity,
            factory: Box::new(factory),
            reset: None,
            counters: PoolCounters::default(),
        }
    }

    /// 반환 시 호출될 리셋 훅
    pub fn with_reset(mut self, reset: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.reset = Some(Box::new(reset));
        self
    }

    /// 객체 하나를 꺼냅니다. 비어 있으면 새로 만듭니다.
    pub fn pop(&self) -> T {
        match self.free.pop() {
            Some(item) => {
                self.pooled.fetch_sub(1, Ordering::Relaxed);
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                item
            }
            None => {
                self.counters.allocated.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            }
        }
    }

    /// 객체를 풀로 돌려보냅니다.
    pub fn push(&self, mut item: T) {
        if self.pooled.load(Ordering::Relaxed) >= self.capacity {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            trace!("풀이 가득 차 객체 폐기");
            return;
        }

        if let Some(reset) = &self.reset {
            reset(&mut item);
        }
        self.pooled.fetch_add(1, Ordering::Relaxed);
        self.counters.returned.fetch_add(1, Ordering::Relaxed);
        self.free.push(item);
    }

    /// 미리 `count` 개를 만들어 둡니다.
    pub fn prewarm(&self, count: usize) {
        for _ in 0..count.min(self.capacity) {
            self.counters.allocated.fetch_add(1, Ordering::Relaxed);
            self.pooled.fetch_add(1, Ordering::Relaxed);
            self.free.push((self.factory)());
        }
    }

    pub fn pooled_count(&self) -> usize {
        self.pooled.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.counters.allocated.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            returned: self.counters.returned.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            pooled: self.pooled_count(),
        }
    }
}
