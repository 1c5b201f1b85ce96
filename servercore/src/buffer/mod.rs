//! 바이트 버퍼
//!
//! - `writer` / `reader`: 경계 검사를 하는 리틀 엔디언 커서
//! - `recv_buffer`: 읽기/쓰기 커서를 가진 수신 버퍼

pub mod reader;
pub mod recv_buffer;
pub mod writer;

pub use reader::BufferReader;
pub use recv_buffer::RecvBuffer;
pub use writer::BufferWriter;

/// 리틀 엔디언으로 직렬화할 수 있는 고정 크기 값
pub trait LeBytes: Sized + Copy {
    const SIZE: usize;

    fn write_le(self, out: &mut [u8]);
    fn read_le(input: &[u8]) -> Self;
}

macro_rules! impl_le_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl LeBytes for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(input: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&input[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_le_bytes!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);
