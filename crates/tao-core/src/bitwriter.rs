//! 比特流写入器.
//!
//! 提供向字节缓冲区按位写入数据的能力, 是 AAC 码流打包的基础设施.
//!
//! 按大端位序写入 (MSB first). 码流打包代码面向 [`BitSink`] 编写,
//! 同一套逻辑既可以真正写入 ([`BitWriter`]), 也可以只统计位数 ([`BitCounter`]),
//! 保证码率控制估算的位数与最终写出的位数完全一致.

use crate::error::TaoResult;

/// 按位输出目标
pub trait BitSink {
    /// 写入 N 个位 (最多 32 位), 值的低 N 位被写入, 高位在前
    fn put_bits(&mut self, value: u32, n: u32);

    /// 已写入的总位数
    fn bits_written(&self) -> usize;

    /// 写入 1 个位
    fn put_bit(&mut self, bit: bool) {
        self.put_bits(u32::from(bit), 1);
    }
}

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use tao_core::bitwriter::{BitSink, BitWriter};
///
/// let mut bw = BitWriter::new();
/// bw.put_bits(0b1011, 4);
/// bw.put_bits(0b0001, 4);
/// bw.put_bits(0b01010101, 8);
/// let data = bw.finish();
/// assert_eq!(data, vec![0b10110001, 0b01010101]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 以指定容量创建比特流写入器, 分配失败时返回 `OutOfMemory`
    pub fn try_with_capacity(capacity: usize) -> TaoResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        Ok(Self {
            data,
            current_byte: 0,
            bit_count: 0,
        })
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.current_byte <<= pad;
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 自动用 0 填充.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }
}

impl BitSink for BitWriter {
    fn put_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "put_bits: n={} 超过 32 位", n);

        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - self.bit_count as u32;
            let to_write = remaining.min(available);

            let shift = remaining - to_write;
            let mask = (1u32 << to_write) - 1;
            let bits = ((value >> shift) & mask) as u8;

            if to_write == 8 {
                // 整字节写入 (bit_count 必定为 0)
                self.current_byte = bits;
            } else {
                self.current_byte = (self.current_byte << to_write) | bits;
            }
            self.bit_count += to_write as u8;

            if self.bit_count == 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            remaining -= to_write;
        }
    }

    fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// 只计数不写入的比特输出
#[derive(Debug, Default, Clone, Copy)]
pub struct BitCounter {
    bits: usize,
}

impl BitCounter {
    /// 创建计数器
    pub fn new() -> Self {
        Self { bits: 0 }
    }
}

impl BitSink for BitCounter {
    fn put_bits(&mut self, _value: u32, n: u32) {
        self.bits += n as usize;
    }

    fn bits_written(&self) -> usize {
        self.bits
    }
}
