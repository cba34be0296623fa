//! 每声道编码状态.
//!
//! 记录窗序列、窗形状、频带偏移、重叠缓冲以及量化器输出,
//! 滤波器组、量化器与码流写入器都围绕它工作.

use crate::sr_info::{LONG_LINES, SrInfo, band_offsets};

/// 最大窗组数 (短块 8 个窗)
pub const MAX_WINDOW_GROUPS: usize = 8;

/// 零码本 (频带全部为零, 不传缩放因子与频谱)
pub const ZERO_HCB: u8 = 0;
/// 转义码本
pub const ESC_HCB: u8 = 11;

/// 缩放因子偏移: 反量化增益 2^((sf - SF_OFFSET) / 4)
pub const SF_OFFSET: i32 = 100;

/// 块类型 (window_sequence)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// ONLY_LONG_SEQUENCE
    OnlyLong,
    /// LONG_START_SEQUENCE: 长窗过渡到短窗
    LongToShort,
    /// EIGHT_SHORT_SEQUENCE
    OnlyShort,
    /// LONG_STOP_SEQUENCE: 短窗过渡回长窗
    ShortToLong,
}

impl BlockType {
    /// 码流中的 window_sequence 值
    pub fn window_sequence(self) -> u32 {
        match self {
            BlockType::OnlyLong => 0,
            BlockType::LongToShort => 1,
            BlockType::OnlyShort => 2,
            BlockType::ShortToLong => 3,
        }
    }

    /// 是否为 8 短窗
    pub fn is_short(self) -> bool {
        matches!(self, BlockType::OnlyShort)
    }
}

/// 窗形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowShape {
    /// 正弦窗
    Sine,
    /// Kaiser-Bessel 派生窗
    Kbd,
}

impl WindowShape {
    /// 码流中的 window_shape 位
    pub fn bit(self) -> bool {
        matches!(self, WindowShape::Kbd)
    }
}

/// 码本分段 (section_data 中的一段)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// 所属窗组
    pub group: usize,
    /// 码本编号 (0..=11)
    pub book: u8,
    /// 起始频带
    pub start: usize,
    /// 频带数
    pub len: usize,
}

/// 单声道编码状态
#[derive(Debug, Clone)]
pub struct CoderInfo {
    /// 当前帧窗形状
    pub window_shape: WindowShape,
    /// 上一帧窗形状 (决定本帧窗的上升沿)
    pub prev_window_shape: WindowShape,
    /// 当前帧块类型
    pub block_type: BlockType,
    /// 上一次块切换时心理声学模型的期望块类型
    pub desired_block_type: BlockType,
    /// 窗组数
    pub num_window_groups: usize,
    /// 每组包含的窗数
    pub window_group_length: [usize; MAX_WINDOW_GROUPS],
    /// 实际编码的频带数
    pub max_sfb: usize,
    /// 当前窗长的频带总数
    pub nr_of_sfb: usize,
    /// 频带起始偏移 (单个窗内), 长度为 nr_of_sfb + 1
    pub sfb_offset: Vec<usize>,
    /// 重叠缓冲: 上一帧的时域输入
    pub overlap: Vec<f64>,
    /// 每个 (窗组, 频带) 的缩放因子, 下标 group * nr_of_sfb + sfb
    pub scale_factor: Vec<i32>,
    /// 每个 (窗组, 频带) 的码本
    pub book: Vec<u8>,
    /// 码本分段
    pub sections: Vec<Section>,
    /// 全局增益 (第一个非零频带的缩放因子)
    pub global_gain: i32,
    /// 量化后的频谱, 按窗顺序存放 (短块为 window * 128 + k)
    pub quantized: Vec<i32>,
}

impl CoderInfo {
    /// 创建初始状态: 正弦窗, 长块, 单窗组
    pub fn new(sr_info: &SrInfo) -> Self {
        let mut window_group_length = [0; MAX_WINDOW_GROUPS];
        window_group_length[0] = 1;
        let nr_of_sfb = sr_info.num_cb_long();
        Self {
            window_shape: WindowShape::Sine,
            prev_window_shape: WindowShape::Sine,
            block_type: BlockType::OnlyLong,
            desired_block_type: BlockType::OnlyLong,
            num_window_groups: 1,
            window_group_length,
            max_sfb: nr_of_sfb,
            nr_of_sfb,
            sfb_offset: band_offsets(sr_info.cb_width_long),
            overlap: vec![0.0; LONG_LINES],
            scale_factor: vec![0; MAX_WINDOW_GROUPS * sr_info.num_cb_long()],
            book: vec![ZERO_HCB; MAX_WINDOW_GROUPS * sr_info.num_cb_long()],
            sections: Vec::new(),
            global_gain: 0,
            quantized: vec![0; LONG_LINES],
        }
    }

    /// 按当前块类型重建频带偏移表与窗组信息
    ///
    /// 短块: 短窗频带, 8 个窗组, 每组 1 个窗; 其他块类型: 长窗频带, 单窗组.
    pub fn build_sfb_table(&mut self, sr_info: &SrInfo) {
        let widths = match self.block_type {
            BlockType::OnlyShort => {
                self.num_window_groups = MAX_WINDOW_GROUPS;
                self.window_group_length = [1; MAX_WINDOW_GROUPS];
                sr_info.cb_width_short
            }
            BlockType::OnlyLong | BlockType::LongToShort | BlockType::ShortToLong => {
                self.num_window_groups = 1;
                self.window_group_length = [0; MAX_WINDOW_GROUPS];
                self.window_group_length[0] = 1;
                sr_info.cb_width_long
            }
        };
        self.nr_of_sfb = widths.len();
        self.max_sfb = widths.len();
        self.sfb_offset.clear();
        self.sfb_offset.extend(band_offsets(widths));
    }

    /// 第 `group` 组的第一个窗序号
    pub fn group_start_window(&self, group: usize) -> usize {
        self.window_group_length[..group].iter().sum()
    }

    /// 每个窗的频谱线数
    pub fn window_lines(&self) -> usize {
        match self.block_type {
            BlockType::OnlyShort => LONG_LINES / MAX_WINDOW_GROUPS,
            BlockType::OnlyLong | BlockType::LongToShort | BlockType::ShortToLong => LONG_LINES,
        }
    }

    /// scale_factor_grouping 字段: 窗 1..8 与前一窗同组时对应位为 1
    pub fn scale_factor_grouping(&self) -> u32 {
        let mut grouping = 0u32;
        let mut window = 0;
        for g in 0..self.num_window_groups {
            for w in 0..self.window_group_length[g] {
                if window > 0 {
                    grouping = (grouping << 1) | u32::from(w > 0);
                }
                window += 1;
            }
        }
        grouping
    }
}
