//! 运行期可切换的字节序标记，封装在 `byteorder` crate 的编译期 trait 之上。

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// 缓冲的字节序游标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    Big,
    #[default]
    Little,
}

macro_rules! dispatch {
    ($self:expr, $big:expr, $little:expr) => {
        match $self {
            ByteOrder::Big => $big,
            ByteOrder::Little => $little,
        }
    };
}

impl ByteOrder {
    pub fn read_u16(self, src: &[u8]) -> u16 {
        dispatch!(self, BigEndian::read_u16(src), LittleEndian::read_u16(src))
    }

    pub fn write_u16(self, dst: &mut [u8], v: u16) {
        dispatch!(
            self,
            BigEndian::write_u16(dst, v),
            LittleEndian::write_u16(dst, v)
        )
    }

    pub fn read_u32(self, src: &[u8]) -> u32 {
        dispatch!(self, BigEndian::read_u32(src), LittleEndian::read_u32(src))
    }

    pub fn write_u32(self, dst: &mut [u8], v: u32) {
        dispatch!(
            self,
            BigEndian::write_u32(dst, v),
            LittleEndian::write_u32(dst, v)
        )
    }

    pub fn read_u64(self, src: &[u8]) -> u64 {
        dispatch!(self, BigEndian::read_u64(src), LittleEndian::read_u64(src))
    }

    pub fn write_u64(self, dst: &mut [u8], v: u64) {
        dispatch!(
            self,
            BigEndian::write_u64(dst, v),
            LittleEndian::write_u64(dst, v)
        )
    }

    pub fn read_f32(self, src: &[u8]) -> f32 {
        dispatch!(self, BigEndian::read_f32(src), LittleEndian::read_f32(src))
    }

    pub fn write_f32(self, dst: &mut [u8], v: f32) {
        dispatch!(
            self,
            BigEndian::write_f32(dst, v),
            LittleEndian::write_f32(dst, v)
        )
    }

    pub fn read_f64(self, src: &[u8]) -> f64 {
        dispatch!(self, BigEndian::read_f64(src), LittleEndian::read_f64(src))
    }

    pub fn write_f64(self, dst: &mut [u8], v: f64) {
        dispatch!(
            self,
            BigEndian::write_f64(dst, v),
            LittleEndian::write_f64(dst, v)
        )
    }

    /// 按 `n` 字节（1..=8）读取有符号整数并符号扩展到 64 位。
    pub fn read_int_n(self, src: &[u8], n: u8) -> i64 {
        debug_assert!((1..=8).contains(&n));
        let n = n as usize;
        let unsigned = dispatch!(
            self,
            BigEndian::read_uint(src, n),
            LittleEndian::read_uint(src, n)
        );
        let shift = 64 - n * 8;
        ((unsigned << shift) as i64) >> shift
    }

    /// 按 `n` 字节（1..=8）截断写入有符号整数。
    pub fn write_int_n(self, dst: &mut [u8], n: u8, v: i64) {
        debug_assert!((1..=8).contains(&n));
        let n = n as usize;
        dispatch!(
            self,
            BigEndian::write_uint(dst, v as u64, n),
            LittleEndian::write_uint(dst, v as u64, n)
        )
    }
}
