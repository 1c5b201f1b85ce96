//! 수신 패킷 해석용 읽기 커서

use crate::buffer::LeBytes;

/// 바이트 슬라이스를 순차적으로 읽는 커서
///
/// 남은 바이트가 부족하면 `None` 을 반환하고 위치는 그대로 둡니다.
pub struct BufferReader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn peek<T: LeBytes>(&self) -> Option<T> {
        (self.remaining() >= T::SIZE).then(|| T::read_le(&self.buffer[self.pos..]))
    }

    pub fn read<T: LeBytes>(&mut self) -> Option<T> {
        let value = self.peek::<T>()?;
        self.pos += T::SIZE;
        Some(value)
    }

    pub fn read_bytes(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.remaining() < size {
            return None;
        }
        let slice = &self.buffer[self.pos..self.pos + size];
        self.pos += size;
        Some(slice)
    }

    /// 남은 바이트 전부
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buffer[self.pos..];
        self.pos = self.buffer.len();
        slice
    }

    pub fn read_size(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }
}
