//! 송신 버퍼
//!
//! 송신 메시지는 고정 크기 [`SendChunk`] 에서 잘라낸 [`SendBuffer`] 에 직렬화됩니다.
//! 스레드마다 현재 청크를 하나씩 캐시하므로 핫 패스에서 스레드 간 경합이 없습니다.
//! 잘려 나간 버퍼는 불변 `Bytes` 이며, 청크의 모든 버퍼가 drop 된 뒤에야
//! 청크의 메모리가 재사용됩니다.

use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::buffer::BufferWriter;
use crate::config::MemoryConfig;
use crate::error::fatal;
use crate::memory::object_pool::{ObjectPool, PoolStats};

/// 완성된 송신 버퍼 (복제 비용이 낮음)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendBuffer {
    data: Bytes,
}

impl SendBuffer {
    /// 청크를 거치지 않고 만든 버퍼 (테스트, 일회성 메시지)
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// 송신 버퍼를 잘라내는 고정 크기 영역
///
/// 한 번에 하나의 할당만 열 수 있습니다.
pub struct SendChunk {
    buffer: BytesMut,
    chunk_size: usize,
    open: bool,
    alloc_size: usize,
}

impl SendChunk {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
            open: false,
            alloc_size: 0,
        }
    }

    /// 풀로 돌아올 때 호출. 잘려 나간 버퍼가 모두 drop 되었다면 원래 메모리를 회수합니다.
    pub fn reset(&mut self) {
        self.open = false;
        self.alloc_size = 0;
        self.buffer.clear();
        self.buffer.reserve(self.chunk_size);
    }

    pub fn free_size(&self) -> usize {
        self.buffer.capacity() - self.buffer.len()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// `alloc_size` 바이트를 열고 쓰기 영역을 돌려줍니다.
    pub fn open(&mut self, alloc_size: usize) -> &mut [u8] {
        if self.open {
            fatal("SendChunk 에 이미 열린 할당이 있습니다");
        }
        if alloc_size > self.free_size() {
            fatal(&format!(
                "SendChunk 초과 할당: 요청 {} > 여유 {}",
                alloc_size,
                self.free_size()
            ));
        }

        self.open = true;
        self.alloc_size = alloc_size;
        self.buffer.resize(alloc_size, 0);
        &mut self.buffer[..]
    }

    /// 실제 쓴 `write_size` 만큼 잘라 송신 버퍼로 만듭니다.
    pub fn close(&mut self, write_size: usize) -> SendBuffer {
        if !self.open {
            fatal("열리지 않은 SendChunk 를 닫으려 했습니다");
        }
        if write_size > self.alloc_size {
            fatal(&format!(
                "SendBuffer 쓰기 초과: {} > 할당 {}",
                write_size, self.alloc_size
            ));
        }

        self.open = false;
        self.alloc_size = 0;
        self.buffer.truncate(write_size);
        SendBuffer {
            data: self.buffer.split().freeze(),
        }
    }
}

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

struct CachedChunk {
    chunk: SendChunk,
    pool: Weak<ObjectPool<SendChunk>>,
}

thread_local! {
    /// 관리자별 현재 스레드 캐시 청크
    static CACHED_CHUNKS: RefCell<HashMap<u64, CachedChunk>> = RefCell::new(HashMap::new());
}

/// 현재 스레드가 캐시한 청크를 모두 풀로 돌려보내고, 돌려보낸 수를 반환합니다.
pub(crate) fn release_thread_cache() -> usize {
    let cached: Vec<CachedChunk> = CACHED_CHUNKS
        .try_with(|chunks| chunks.borrow_mut().drain().map(|(_, c)| c).collect())
        .unwrap_or_default();

    let mut released = 0;
    for CachedChunk { chunk, pool } in cached {
        if let Some(pool) = pool.upgrade() {
            pool.push(chunk);
            released += 1;
        }
    }
    released
}

/// 송신 버퍼 관리자
pub struct SendBufferManager {
    id: u64,
    chunk_size: usize,
    pool: Arc<ObjectPool<SendChunk>>,
}

impl SendBufferManager {
    pub fn new(config: &MemoryConfig) -> Self {
        let chunk_size = config.send_chunk_size;
        let pool = ObjectPool::new(config.send_chunk_pool_capacity, move || {
            SendChunk::new(chunk_size)
        })
        .with_reset(SendChunk::reset);

        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            chunk_size,
            pool: Arc::new(pool),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 최대 `alloc_size` 바이트를 열어 `fill` 로 채웁니다.
    ///
    /// `fill` 은 실제로 쓴 바이트 수를 반환합니다.
    pub fn write<F>(&self, alloc_size: usize, fill: F) -> SendBuffer
    where
        F: FnOnce(&mut BufferWriter<'_>) -> usize,
    {
        if alloc_size > self.chunk_size {
            fatal(&format!(
                "SendBuffer 요청이 청크보다 큽니다: {} > {}",
                alloc_size, self.chunk_size
            ));
        }

        let mut chunk = self.take_chunk(alloc_size);
        let written = {
            let mut writer = BufferWriter::new(chunk.open(alloc_size));
            fill(&mut writer)
        };
        let buffer = chunk.close(written);
        self.store_chunk(chunk);
        buffer
    }

    /// 바이트열을 그대로 담은 송신 버퍼
    pub fn copy_from(&self, data: &[u8]) -> SendBuffer {
        self.write(data.len(), |writer| {
            writer.write_bytes(data);
            writer.write_size()
        })
    }

    /// 현재 스레드 캐시에서 여유가 충분한 청크를 꺼냅니다.
    fn take_chunk(&self, alloc_size: usize) -> SendChunk {
        let cached = CACHED_CHUNKS.with(|chunks| chunks.borrow_mut().remove(&self.id));
        match cached {
            Some(cached) if cached.chunk.free_size() >= alloc_size => cached.chunk,
            Some(cached) => {
                trace!("SendChunk 소진, 새 청크로 교체");
                self.pool.push(cached.chunk);
                self.pool.pop()
            }
            None => self.pool.pop(),
        }
    }

    fn store_chunk(&self, chunk: SendChunk) {
        let previous = CACHED_CHUNKS.with(|chunks| {
            chunks.borrow_mut().insert(
                self.id,
                CachedChunk {
                    chunk,
                    pool: Arc::downgrade(&self.pool),
                },
            )
        });
        // fill 안에서 중첩 write 가 일어나 캐시가 채워진 경우
        if let Some(previous) = previous {
            self.pool.push(previous.chunk);
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
