//! 采样率相关的缩放因子频带 (scalefactor band) 表.
//!
//! 每个采样率对应一组长窗 (1024 线) 与短窗 (128 线) 的频带宽度.
//! 表在编译期确定, 全局只读共享.

/// 长窗频谱线数
pub const LONG_LINES: usize = 1024;
/// 短窗频谱线数
pub const SHORT_LINES: usize = 128;

/// 单个采样率的频带配置
#[derive(Debug)]
pub struct SrInfo {
    /// 标称采样率 (Hz)
    pub sample_rate: u32,
    /// 长窗各频带宽度, 总和为 1024
    pub cb_width_long: &'static [usize],
    /// 短窗各频带宽度, 总和为 128
    pub cb_width_short: &'static [usize],
}

impl SrInfo {
    /// 长窗频带数
    pub fn num_cb_long(&self) -> usize {
        self.cb_width_long.len()
    }

    /// 短窗频带数
    pub fn num_cb_short(&self) -> usize {
        self.cb_width_short.len()
    }
}

#[rustfmt::skip]
const LONG_96000: [usize; 41] = [
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    8, 8, 8, 8, 8, 12, 12, 12, 12, 12, 16, 16, 24, 28,
    36, 44, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64,
];

#[rustfmt::skip]
const SHORT_96000: [usize; 12] = [4, 4, 4, 4, 4, 4, 8, 8, 8, 16, 28, 36];

#[rustfmt::skip]
const LONG_64000: [usize; 47] = [
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    8, 8, 8, 8, 12, 12, 12, 16, 16, 16, 20, 24, 24, 28,
    36, 40, 40, 40, 40, 40, 40, 40, 40, 40, 40, 40, 40, 40,
    40, 40, 40, 40, 40,
];

// 与 96 kHz 短窗相同 (ISO 14496-3 swb_offset_128_64)
#[rustfmt::skip]
const SHORT_64000: [usize; 12] = [4, 4, 4, 4, 4, 4, 8, 8, 8, 16, 28, 36];

#[rustfmt::skip]
const LONG_48000: [usize; 49] = [
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 8, 8, 8, 8, 8, 8, 8,
    12, 12, 12, 12, 16, 16, 20, 20, 24, 24, 28, 28, 32, 32, 32, 32, 32, 32,
    32, 32, 32, 32, 32, 32, 32, 32, 32, 32, 32, 32, 32, 96,
];

#[rustfmt::skip]
const SHORT_48000: [usize; 14] = [4, 4, 4, 4, 4, 8, 8, 8, 12, 12, 12, 16, 16, 16];

#[rustfmt::skip]
const LONG_32000: [usize; 51] = [
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 8, 8, 8, 8,
    8, 8, 8, 12, 12, 12, 12, 16, 16, 20, 20, 24, 24, 28,
    28, 32, 32, 32, 32, 32, 32, 32, 32, 32, 32, 32, 32, 32,
    32, 32, 32, 32, 32, 32, 32, 32, 32,
];

#[rustfmt::skip]
const LONG_24000: [usize; 47] = [
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 12, 12, 12, 12, 16, 16, 16, 20, 20, 24, 24, 28, 28, 32,
    36, 36, 40, 44, 48, 52, 52, 64, 64, 64, 64, 64,
];

// ISO 14496-3 swb_offset_128_24
#[rustfmt::skip]
const SHORT_24000: [usize; 15] = [4, 4, 4, 4, 4, 4, 4, 8, 8, 8, 12, 12, 16, 16, 20];

#[rustfmt::skip]
const LONG_16000: [usize; 43] = [
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 12, 12, 12,
    12, 12, 12, 12, 12, 12, 16, 16, 16, 16, 20, 20, 20, 24,
    24, 28, 28, 32, 36, 40, 40, 44, 48, 52, 56, 60, 64, 64, 64,
];

#[rustfmt::skip]
const SHORT_16000: [usize; 15] = [4, 4, 4, 4, 4, 4, 4, 4, 8, 8, 12, 12, 16, 20, 20];

// ISO 14496-3 swb_offset_1024_8
#[rustfmt::skip]
const LONG_8000: [usize; 40] = [
    12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 16,
    16, 16, 16, 16, 16, 16, 20, 20, 20, 20, 24, 24, 24, 28,
    28, 32, 36, 36, 40, 44, 48, 52, 56, 60, 64, 80,
];

#[rustfmt::skip]
const SHORT_8000: [usize; 15] = [4, 4, 4, 4, 4, 4, 4, 8, 8, 8, 8, 12, 16, 20, 20];

/// 采样率配置表, 顺序与 ADTS sampling_frequency_index 0..=11 一致
pub static SR_INFO: [SrInfo; 12] = [
    SrInfo { sample_rate: 96000, cb_width_long: &LONG_96000, cb_width_short: &SHORT_96000 },
    SrInfo { sample_rate: 88200, cb_width_long: &LONG_96000, cb_width_short: &SHORT_96000 },
    SrInfo { sample_rate: 64000, cb_width_long: &LONG_64000, cb_width_short: &SHORT_64000 },
    SrInfo { sample_rate: 48000, cb_width_long: &LONG_48000, cb_width_short: &SHORT_48000 },
    SrInfo { sample_rate: 44100, cb_width_long: &LONG_48000, cb_width_short: &SHORT_48000 },
    SrInfo { sample_rate: 32000, cb_width_long: &LONG_32000, cb_width_short: &SHORT_48000 },
    SrInfo { sample_rate: 24000, cb_width_long: &LONG_24000, cb_width_short: &SHORT_24000 },
    SrInfo { sample_rate: 22050, cb_width_long: &LONG_24000, cb_width_short: &SHORT_24000 },
    SrInfo { sample_rate: 16000, cb_width_long: &LONG_16000, cb_width_short: &SHORT_16000 },
    SrInfo { sample_rate: 12000, cb_width_long: &LONG_16000, cb_width_short: &SHORT_16000 },
    SrInfo { sample_rate: 11025, cb_width_long: &LONG_16000, cb_width_short: &SHORT_16000 },
    SrInfo { sample_rate: 8000, cb_width_long: &LONG_8000, cb_width_short: &SHORT_8000 },
];

/// 就近匹配采样率, 返回配置表索引 (同时也是 ADTS 采样率索引)
///
/// 分界点取相邻标准采样率之间的几何中点附近, 任意正采样率都能得到结果.
pub fn sr_index(sample_rate: u32) -> usize {
    match sample_rate {
        92017.. => 0,
        75132.. => 1,
        55426.. => 2,
        46009.. => 3,
        37566.. => 4,
        27713.. => 5,
        23004.. => 6,
        18783.. => 7,
        13856.. => 8,
        11502.. => 9,
        9391.. => 10,
        _ => 11,
    }
}

/// 按采样率查找配置
pub fn lookup(sample_rate: u32) -> (usize, &'static SrInfo) {
    let idx = sr_index(sample_rate);
    (idx, &SR_INFO[idx])
}

/// 由频带宽度构建偏移表 (长度为频带数 + 1, 末项为总线数)
pub fn band_offsets(widths: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(widths.len() + 1);
    let mut offset = 0;
    offsets.push(0);
    for &w in widths {
        offset += w;
        offsets.push(offset);
    }
    offsets
}
