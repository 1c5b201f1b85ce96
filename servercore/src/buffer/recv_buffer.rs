//! 수신 버퍼
//!
//! 용량은 `buffer_size * 10` 입니다. 읽기 커서가 쓰기 커서를 따라잡으면 둘 다 0 으로 돌아가고,
//! 남은 공간이 `buffer_size` 보다 작아지면 읽지 않은 바이트를 앞으로 당깁니다.

use crate::memory::{PoolAllocator, PooledBlock};

const BUFFER_COUNT: usize = 10;

pub struct RecvBuffer {
    storage: PooledBlock,
    buffer_size: usize,
    read_pos: usize,
    write_pos: usize,
}

impl RecvBuffer {
    /// 크기 클래스에 맞으면 풀에서, 아니면 힙에서 저장 공간을 얻습니다.
    pub fn new(buffer_size: usize, allocator: &PoolAllocator) -> Self {
        Self::with_storage(buffer_size, allocator.allocate(buffer_size * BUFFER_COUNT))
    }

    pub fn with_capacity(buffer_size: usize) -> Self {
        Self::with_storage(buffer_size, PooledBlock::heap(buffer_size * BUFFER_COUNT))
    }

    fn with_storage(buffer_size: usize, storage: PooledBlock) -> Self {
        Self {
            storage,
            buffer_size,
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// 커서 정리
    pub fn clean(&mut self) {
        let data_size = self.data_size();
        if data_size == 0 {
            self.read_pos = 0;
            self.write_pos = 0;
        } else if self.free_size() < self.buffer_size {
            self.storage.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = data_size;
        }
    }

    /// 소비한 바이트만큼 읽기 커서 이동
    pub fn on_read(&mut self, num_bytes: usize) -> bool {
        if num_bytes > self.data_size() {
            return false;
        }
        self.read_pos += num_bytes;
        true
    }

    /// 수신한 바이트만큼 쓰기 커서 이동
    pub fn on_write(&mut self, num_bytes: usize) -> bool {
        if num_bytes > self.free_size() {
            return false;
        }
        self.write_pos += num_bytes;
        true
    }

    /// 아직 처리하지 않은 데이터
    pub fn read_slice(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// 다음 수신을 받을 빈 공간
    pub fn write_slice(&mut self) -> &mut [u8] {
        let end = self.capacity();
        &mut self.storage[self.write_pos..end]
    }

    pub fn data_size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn free_size(&self) -> usize {
        self.capacity() - self.write_pos
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

    #[test]
    fn test_capacity_is_ten_units() {
        let buffer = RecvBuffer::with_capacity(16);
        assert_eq!(buffer.capacity(), 160);
        assert_eq!(buffer.free_size(), 160);
    }

    #[test]
    fn test_small_buffer_uses_pool() {
        let allocator = PoolAllocator::new(&MemoryConfig::default());
        let buffer = RecvBuffer::new(100, &allocator);
        assert_eq!(buffer.capacity(), 1000);
        drop(buffer);
        assert_eq!(allocator.stats().pooled, 1);
    }

    #[test]
    fn test_write_read_and_reset_cursors() {
        let mut buffer = RecvBuffer::with_capacity(8);
        buffer.write_slice()[..5].copy_from_slice(b"hello");
        assert!(buffer.on_write(5));
        assert_eq!(buffer.read_slice(), b"hello");

        assert!(buffer.on_read(5));
        buffer.clean();
        assert_eq!(buffer.data_size(), 0);
        assert_eq!(buffer.free_size(), 80);
    }

    #[test]
    fn test_clean_compacts_when_low_on_space() {
        let mut buffer = RecvBuffer::with_capacity(8);
        let fill: Vec<u8> = (0..75u8).collect();
        buffer.write_slice()[..75].copy_from_slice(&fill);
        assert!(buffer.on_write(75));
        assert!(buffer.on_read(70));

        buffer.clean();
        assert_eq!(buffer.read_slice(), &[70, 71, 72, 73, 74]);
        assert_eq!(buffer.free_size(), 75);
    }

    #[test]
    fn test_clean_keeps_layout_with_enough_space() {
        let mut buffer = RecvBuffer::with_capacity(8);
        buffer.write_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);
        buffer.on_write(4);
        buffer.on_read(1);
        buffer.clean();
        assert_eq!(buffer.read_slice(), &[2, 3, 4]);
        assert_eq!(buffer.free_size(), 76);
    }

    #[test]
    fn test_cursor_overflow_rejected() {
        let mut buffer = RecvBuffer::with_capacity(1);
        assert!(!buffer.on_write(11));
        assert!(buffer.on_write(3));
        assert!(!buffer.on_read(4));
    }
}
