//! 송신 버퍼 직렬화용 쓰기 커서

use crate::buffer::LeBytes;
use crate::error::fatal;

/// 고정 크기 영역에 순차적으로 쓰는 커서
///
/// 영역을 넘어서는 쓰기는 버퍼 손상이므로 치명적입니다.
pub struct BufferWriter<'a> {
    buffer: &'a mut [u8],
    pos: usize,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn write<T: LeBytes>(&mut self, value: T) {
        let at = self.advance(T::SIZE);
        value.write_le(&mut self.buffer[at..]);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        let at = self.advance(data.len());
        self.buffer[at..at + data.len()].copy_from_slice(data);
    }

    /// `size` 바이트를 건너뛰고 그 시작 위치를 반환합니다 (헤더를 나중에 채울 때).
    pub fn reserve(&mut self, size: usize) -> usize {
        self.advance(size)
    }

    /// 이미 지나간 위치에 값을 덮어씁니다.
    pub fn write_at<T: LeBytes>(&mut self, offset: usize, value: T) {
        if offset + T::SIZE > self.pos {
            fatal(&format!(
                "BufferWriter 되쓰기 범위 초과: offset={} size={} pos={}",
                offset,
                T::SIZE,
                self.pos
            ));
        }
        value.write_le(&mut self.buffer[offset..]);
    }

    pub fn write_size(&self) -> usize {
        self.pos
    }

    pub fn free_size(&self) -> usize {
        self.buffer.len() - self.pos
    }

    pub fn written(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }

    fn advance(&mut self, size: usize) -> usize {
        if size > self.free_size() {
            fatal(&format!(
                "BufferWriter 오버플로우: 요청 {} > 여유 {}",
                size,
                self.free_size()
            ));
        }
        let at = self.pos;
        self.pos += size;
        at
    }
}
