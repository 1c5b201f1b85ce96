//! 송신 버퍼 / 메모리 풀 통합 테스트

use servercore::config::MemoryConfig;
use servercore::memory::{PoolAllocator, SendBufferManager, SendChunk};
use std::sync::Arc;

#[test]
#[should_panic(expected = "SendChunk 초과 할당")]
fn test_over_allocation_from_chunk_is_fatal() {
    let mut chunk = SendChunk::new(64);
    let first = chunk.open(48);
    first.fill(1);
    let _ = chunk.close(48);

    assert!(chunk.free_size() < 32);
    chunk.open(32);
}

#[test]
fn test_live_send_buffers_never_overlap() {
    let manager = Arc::new(SendBufferManager::new(&MemoryConfig {
        send_chunk_size: 256,
        send_chunk_pool_capacity: 4,
        ..MemoryConfig::default()
    }));

    let workers: Vec<_> = (0..4u8)
        .map(|worker| {
            let manager = manager.clone();
            std::thread::spawn(move || {
                let mut live = Vec::new();
                for round in 0..200u32 {
                    let fill = worker.wrapping_mul(50).wrapping_add(round as u8);
                    let size = 10 + (round as usize % 40);
                    let buffer = manager.write(size, |writer| {
                        for _ in 0..size {
                            writer.write(fill);
                        }
                        writer.write_size()
                    });
                    live.push((fill, size, buffer));
                    // 일부만 반납해 청크 재사용을 섞음
                    if round % 3 == 0 {
                        live.remove(0);
                    }
                }
                for (fill, size, buffer) in &live {
                    assert_eq!(buffer.len(), *size);
                    assert!(buffer.as_slice().iter().all(|b| b == fill));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let stats = manager.stats();
    assert!(stats.allocated + stats.reused > 0);
}

#[test]
fn test_pooled_blocks_are_reused_without_overlap() {
    let allocator = PoolAllocator::new(&MemoryConfig::default());

    let mut first = allocator.allocate(100);
    first.fill(0xAA);
    let mut second = allocator.allocate(100);
    second.fill(0xBB);
    assert!(first.iter().all(|&b| b == 0xAA));
    drop(first);

    let third = allocator.allocate(100);
    assert!(third.is_pooled());
    assert!(second.iter().all(|&b| b == 0xBB));
    assert!(allocator.stats().reused >= 1);

    let large = allocator.allocate(64 * 1024);
    assert!(!large.is_pooled());
    assert_eq!(large.len(), 64 * 1024);
}
