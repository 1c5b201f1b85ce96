//! 크기별 메모리 풀
//!
//! 요청 크기를 크기 클래스로 올림하여 해당 클래스의 풀에서 블록을 꺼냅니다.
//! - ~1024: 32 바이트 단위
//! - ~2048: 128 바이트 단위
//! - ~4096: 256 바이트 단위
//!
//! 4096 을 넘는 요청은 풀을 거치지 않고 힙에서 바로 할당됩니다.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

use crate::config::MemoryConfig;
use crate::memory::object_pool::{ObjectPool, PoolStats};

/// 풀이 담당하는 최대 블록 크기
pub const MAX_ALLOC_SIZE: usize = 4096;

/// 같은 크기의 블록을 보관하는 풀
pub struct MemoryPool {
    block_size: usize,
    blocks: ObjectPool<Box<[u8]>>,
}

impl MemoryPool {
    fn new(block_size: usize, max_blocks: usize) -> Self {
        Self {
            block_size,
            blocks: ObjectPool::new(max_blocks, move || vec![0u8; block_size].into_boxed_slice()),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn stats(&self) -> PoolStats {
        self.blocks.stats()
    }
}

/// 할당된 블록. drop 시 원래 풀로 돌아갑니다.
pub struct PooledBlock {
    data: Option<Box<[u8]>>,
    len: usize,
    home: Option<Arc<MemoryPool>>,
}

impl PooledBlock {
    /// 풀을 거치지 않는 힙 블록
    pub fn heap(len: usize) -> Self {
        Self {
            data: Some(vec![0u8; len].into_boxed_slice()),
            len,
            home: None,
        }
    }

    /// 풀에서 나온 블록인지 여부
    pub fn is_pooled(&self) -> bool {
        self.home.is_some()
    }

    /// 실제 블록 크기 (요청 크기 이상)
    pub fn block_size(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.len())
    }
}

impl Deref for PooledBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..self.len],
            None => &[],
        }
    }
}

impl DerefMut for PooledBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.data {
            Some(data) => &mut data[..self.len],
            None => &mut [],
        }
    }
}

impl Drop for PooledBlock {
    fn drop(&mut self) {
        if let (Some(home), Some(data)) = (self.home.take(), self.data.take()) {
            home.blocks.push(data);
        }
    }
}

/// 크기 클래스 할당기
pub struct PoolAllocator {
    pools: Vec<Arc<MemoryPool>>,
    /// 요청 크기(0..=MAX_ALLOC_SIZE) → pools 인덱스
    pool_table: Vec<usize>,
}

impl PoolAllocator {
    pub fn new(config: &MemoryConfig) -> Self {
        let max_blocks = config.max_blocks_per_class;
        let mut pools = Vec::new();
        let mut pool_table = vec![0usize; MAX_ALLOC_SIZE + 1];

        let mut table_index = 1;
        let mut push_classes = |from: usize, to: usize, step: usize| {
            let mut size = from;
            while size <= to {
                pools.push(Arc::new(MemoryPool::new(size, max_blocks)));
                while table_index <= size {
                    pool_table[table_index] = pools.len() - 1;
                    table_index += 1;
                }
                size += step;
            }
        };

        push_classes(32, 1024, 32);
        push_classes(1024 + 128, 2048, 128);
        push_classes(2048 + 256, 4096, 256);

        debug!("메모리 풀 초기화: 크기 클래스 {}개", pools.len());
        Self { pools, pool_table }
    }

    /// `size` 바이트 블록 할당
    pub fn allocate(&self, size: usize) -> PooledBlock {
        if size > MAX_ALLOC_SIZE {
            return PooledBlock::heap(size);
        }

        let pool = &self.pools[self.pool_table[size]];
        PooledBlock {
            data: Some(pool.blocks.pop()),
            len: size,
            home: Some(pool.clone()),
        }
    }

    /// 크기 클래스 수
    pub fn class_count(&self) -> usize {
        self.pools.len()
    }

    /// `size` 요청이 사용할 블록 크기 (힙 할당이면 None)
    pub fn class_size_for(&self, size: usize) -> Option<usize> {
        (size <= MAX_ALLOC_SIZE).then(|| self.pools[self.pool_table[size]].block_size())
    }

    /// 전체 크기 클래스 통계 합계
    pub fn stats(&self) -> PoolStats {
        self.pools.iter().fold(PoolStats::default(), |mut acc, pool| {
            let stats = pool.stats();
            acc.allocated += stats.allocated;
            acc.reused += stats.reused;
            acc.returned += stats.returned;
            acc.discarded += stats.discarded;
            acc.pooled += stats.pooled;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> PoolAllocator {
        PoolAllocator::new(&MemoryConfig::default())
    }

    #[test]
    fn test_size_classes() {
        let allocator = allocator();
        assert_eq!(allocator.class_count(), 32 + 8 + 8);
        assert_eq!(allocator.class_size_for(1), Some(32));
        assert_eq!(allocator.class_size_for(32), Some(32));
        assert_eq!(allocator.class_size_for(33), Some(64));
        assert_eq!(allocator.class_size_for(1025), Some(1152));
        assert_eq!(allocator.class_size_for(2049), Some(2304));
        assert_eq!(allocator.class_size_for(4096), Some(4096));
        assert_eq!(allocator.class_size_for(4097), None);
    }

    #[test]
    fn test_block_returns_to_pool() {
        let allocator = allocator();
        {
            let mut block = allocator.allocate(100);
            assert_eq!(block.len(), 100);
            assert_eq!(block.block_size(), 128);
            assert!(block.is_pooled());
            block[0] = 0xAB;
        }
        assert_eq!(allocator.stats().pooled, 1);

        let _again = allocator.allocate(120);
        let stats = allocator.stats();
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.pooled, 0);
    }

    #[test]
    fn test_large_allocation_uses_heap() {
        let allocator = allocator();
        let block = allocator.allocate(MAX_ALLOC_SIZE + 1);
        assert!(!block.is_pooled());
        assert_eq!(block.len(), MAX_ALLOC_SIZE + 1);
        drop(block);
        assert_eq!(allocator.stats().pooled, 0);
    }

    #[test]
    fn test_live_blocks_never_overlap() {
        let allocator = allocator();
        let mut blocks: Vec<PooledBlock> = (0..16u8)
            .map(|i| {
                let mut block = allocator.allocate(64);
                block.fill(i);
                block
            })
            .collect();

        // 절반 반환 후 다시 할당
        blocks.truncate(8);
        let refill: Vec<PooledBlock> = (100..108u8)
            .map(|i| {
                let mut block = allocator.allocate(64);
                block.fill(i);
                block
            })
            .collect();

        for (i, block) in blocks.iter().enumerate() {
            assert!(block.iter().all(|&b| b == i as u8));
        }
        for (i, block) in refill.iter().enumerate() {
            assert!(block.iter().all(|&b| b == 100 + i as u8));
        }
    }
}
