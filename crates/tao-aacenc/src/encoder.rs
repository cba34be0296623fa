//! AAC-LC 编码会话.
//!
//! 每次 [`AacEncoder::encode`] 调用严格按以下顺序执行:
//! 送入前瞻缓冲 (同时更新心理声学模型) -> 心理声学计算 -> 块切换 ->
//! 滤波器组 -> 频带表重建 -> 中侧决策 -> 量化 -> 码流写入.
//!
//! 前 3 次调用只填充前瞻缓冲, 不输出数据. 输入耗尽后以空输入调用
//! 进行冲刷, 第 4 次空输入调用后会话终止, 之后的调用始终返回 0.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use tao_core::{BitWriter, TaoError, TaoResult};

use crate::bitstream::{self, ADTS_HEADER_BYTES, MAX_ADTS_FRAME_BYTES};
use crate::channels::{ChannelElement, build_elements, lfe_mask};
use crate::coder::{BlockType, CoderInfo, WindowShape};
use crate::filterbank::FilterBank;
use crate::lookahead::LookaheadBuffer;
use crate::midside::ms_encode;
use crate::psych::{PsyModel, block_switch};
use crate::quantize::Quantizer;
use crate::sr_info::{self, LONG_LINES, SrInfo};

/// 每声道每帧采样数
pub const FRAME_LEN: usize = LONG_LINES;

/// 填充阶段的调用次数
const FILL_FRAMES: u64 = 3;
/// 第几次空输入调用后终止
const FLUSH_FRAMES: u32 = 4;
/// 默认每声道码率 (bit/s)
const DEFAULT_BIT_RATE_PER_CHANNEL: u32 = 64000;
/// 单声道每帧位数上限 (ISO 14496-3 规定的 6144 位)
const MAX_CHANNEL_BITS: usize = 6144;
/// 单声道可变部分的预算上限, 为 ICS 头部留出余量
const MAX_CHANNEL_PAYLOAD_BITS: usize = 6000;
/// LFE 声道分配位数时的感知熵权重
const LFE_PE_WEIGHT: f64 = 0.25;
/// 帧末剩余位数超过该值时回补给受限声道
const REDISTRIBUTE_MIN_BITS: usize = 64;

/// 编码器可调参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// 是否允许中侧立体声
    pub allow_midside: bool,
    /// 末尾单独的声道是否作为 LFE 编码
    pub use_lfe: bool,
    /// 总码率 (bit/s, 所有声道之和)
    pub bit_rate: u32,
}

impl EncoderConfig {
    /// 指定声道数的默认配置: 允许中侧, 不使用 LFE, 每声道 64 kbit/s
    pub fn for_channels(channels: usize) -> Self {
        Self {
            allow_midside: true,
            use_lfe: false,
            bit_rate: DEFAULT_BIT_RATE_PER_CHANNEL.saturating_mul(channels as u32),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::for_channels(2)
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 前瞻缓冲填充中, 不输出
    Filling,
    /// 正常逐帧输出
    Steady,
    /// 输入已耗尽, 冲刷剩余帧
    Flushing,
    /// 已结束, 之后的调用都返回 0
    Terminated,
}

/// 最近一帧的编码统计
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    /// 会话内的调用序号 (从 1 开始)
    pub frame_number: u64,
    /// 输出字节数 (含 ADTS 帧头)
    pub bytes: usize,
    /// 本帧的位预算
    pub budget_bits: usize,
    /// 实际使用的位数
    pub used_bits: usize,
    /// 是否超出预算
    pub overrun: bool,
    /// 各声道块类型
    pub block_types: Vec<BlockType>,
    /// 各声道对是否使用中侧编码 (按元素顺序)
    pub ms_used: Vec<bool>,
}

/// AAC-LC 编码器
pub struct AacEncoder {
    sample_rate: u32,
    sr_index: usize,
    sr_info: &'static SrInfo,
    channels: usize,
    config: EncoderConfig,
    frame_num: u64,
    flush_frame: u32,
    state: SessionState,
    lookahead: Vec<LookaheadBuffer>,
    psy: PsyModel,
    filterbank: FilterBank,
    quantizer: Quantizer,
    coders: Vec<CoderInfo>,
    freq: Vec<Vec<f64>>,
    elements: Vec<ChannelElement>,
    lfe: Vec<bool>,
    weights: Vec<f64>,
    last_frame: Option<FrameStats>,
}

impl AacEncoder {
    /// 打开编码会话
    ///
    /// 非标准采样率就近匹配频带表; 支持 1..=6 以及 8 声道.
    pub fn open(sample_rate: u32, channels: usize) -> TaoResult<Self> {
        if sample_rate == 0 {
            return Err(TaoError::InvalidArgument("采样率不能为 0".into()));
        }
        if channels == 0 {
            return Err(TaoError::InvalidArgument("声道数不能为 0".into()));
        }
        if channels == 7 || channels > 8 {
            return Err(TaoError::InvalidArgument(format!(
                "AAC 不支持的声道数: {}",
                channels,
            )));
        }

        let (sr_index, sr_info) = sr_info::lookup(sample_rate);
        if sr_info.sample_rate != sample_rate {
            warn!(
                "非标准采样率 {} Hz, 使用 {} Hz 的频带表",
                sample_rate, sr_info.sample_rate,
            );
        }

        let config = EncoderConfig::for_channels(channels);
        let elements = build_elements(channels, config.use_lfe);
        let lfe = lfe_mask(&elements, channels);

        debug!(
            "打开 AAC-LC 编码器: {} Hz, {} 声道, {} bit/s",
            sample_rate, channels, config.bit_rate,
        );

        Ok(Self {
            sample_rate,
            sr_index,
            sr_info,
            channels,
            config,
            frame_num: 0,
            flush_frame: 0,
            state: SessionState::Filling,
            lookahead: vec![LookaheadBuffer::new(); channels],
            psy: PsyModel::new(sample_rate, sr_info, channels),
            filterbank: FilterBank::new(),
            quantizer: Quantizer::new(),
            coders: vec![CoderInfo::new(sr_info); channels],
            freq: vec![vec![0.0; FRAME_LEN]; channels],
            elements,
            lfe,
            weights: vec![0.0; channels],
            last_frame: None,
        })
    }

    /// 当前配置
    pub fn configuration(&self) -> EncoderConfig {
        self.config
    }

    /// 更新配置 (仅 allow_midside / use_lfe / bit_rate)
    pub fn set_configuration(&mut self, config: EncoderConfig) -> TaoResult<()> {
        if config.bit_rate == 0 {
            return Err(TaoError::InvalidArgument("码率不能为 0".into()));
        }
        debug!(
            "更新编码配置: 中侧 {}, LFE {}, {} bit/s",
            config.allow_midside, config.use_lfe, config.bit_rate,
        );
        self.config = config;
        Ok(())
    }

    /// 编码一帧
    ///
    /// `pcm` 为交错的 16 位样本, 每声道至多 1024 个, 不足部分补零;
    /// 空切片表示输入结束. 返回写入 `output` 的字节数.
    pub fn encode(&mut self, pcm: &[i16], output: &mut [u8]) -> TaoResult<usize> {
        if self.state == SessionState::Terminated {
            return Ok(0);
        }
        if pcm.len() > FRAME_LEN * self.channels {
            return Err(TaoError::InvalidArgument(format!(
                "输入样本数 {} 超过一帧 ({} x {} 声道)",
                pcm.len(),
                FRAME_LEN,
                self.channels,
            )));
        }
        if pcm.len() % self.channels != 0 {
            return Err(TaoError::InvalidArgument(format!(
                "交错样本数 {} 不是声道数 {} 的整数倍",
                pcm.len(),
                self.channels,
            )));
        }
        if !pcm.is_empty() && self.state == SessionState::Flushing {
            return Err(TaoError::InvalidArgument("输入已结束, 不能再送入样本".into()));
        }

        self.frame_num += 1;
        if pcm.is_empty() {
            self.flush_frame += 1;
            self.state = SessionState::Flushing;
        }
        if self.flush_frame == FLUSH_FRAMES {
            self.state = SessionState::Terminated;
            debug!("AAC 编码会话结束, 共 {} 次调用", self.frame_num);
            return Ok(0);
        }

        self.elements = build_elements(self.channels, self.config.use_lfe);
        self.lfe = lfe_mask(&self.elements, self.channels);

        for (ch, buffer) in self.lookahead.iter_mut().enumerate() {
            if pcm.is_empty() {
                buffer.ingest_silence();
            } else {
                buffer.ingest(pcm, ch, self.channels);
            }
            self.psy.buffer_update(ch, buffer.newest())?;
        }

        if self.frame_num <= FILL_FRAMES {
            return Ok(0);
        }
        if self.state == SessionState::Filling {
            self.state = SessionState::Steady;
        }

        self.encode_frame(output)
    }

    /// 结束会话并释放资源
    pub fn close(self) {
        debug!(
            "关闭 AAC-LC 编码器: {} 次调用, 状态 {:?}",
            self.frame_num, self.state,
        );
    }

    /// 会话状态
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 最近输出帧的统计
    pub fn last_frame(&self) -> Option<&FrameStats> {
        self.last_frame.as_ref()
    }

    /// 最坏情况下的单帧字节数, 可用于分配输出缓冲
    pub fn max_frame_bytes(&self) -> usize {
        ADTS_HEADER_BYTES + (self.channels * MAX_CHANNEL_BITS).div_ceil(8) + 2
    }

    /// 采样率
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 声道数
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 每帧位预算: round(bit_rate * 1024 / sample_rate)
    pub fn frame_budget_bits(&self) -> usize {
        let sr = u64::from(self.sample_rate);
        ((u64::from(self.config.bit_rate) * FRAME_LEN as u64 + sr / 2) / sr) as usize
    }

    /// 心理声学计算之后的完整编码流程
    fn encode_frame(&mut self, output: &mut [u8]) -> TaoResult<usize> {
        self.psy.calculate();
        block_switch(&mut self.coders, self.psy.infos(), &self.lfe);

        for (ch, coder) in self.coders.iter_mut().enumerate() {
            coder.prev_window_shape = coder.window_shape;
            coder.window_shape = window_shape_for(coder.block_type);
            self.filterbank
                .transform(coder, self.lookahead[ch].current(), &mut self.freq[ch]);
            coder.build_sfb_table(self.sr_info);
        }

        let ms_pairs = ms_encode(
            &mut self.elements,
            &self.coders,
            &mut self.freq,
            self.psy.infos_mut(),
            self.config.allow_midside,
        );
        trace!("第 {} 帧: {} 个声道对采用中侧编码", self.frame_num, ms_pairs);

        let budget_bits = self.frame_budget_bits();
        let overrun = self.allocate_and_quantize(budget_bits);

        let frame_bytes = bitstream::frame_bytes(self.sr_index, &self.elements, &self.coders);
        if frame_bytes > MAX_ADTS_FRAME_BYTES {
            return Err(TaoError::Internal(format!(
                "帧长度 {} 超过 ADTS 上限 {}",
                frame_bytes, MAX_ADTS_FRAME_BYTES,
            )));
        }
        if frame_bytes > output.len() {
            return Err(TaoError::BufferTooSmall {
                needed: frame_bytes,
                capacity: output.len(),
            });
        }

        let mut writer = BitWriter::try_with_capacity(frame_bytes)?;
        bitstream::write_frame(
            &mut writer,
            self.sr_index,
            &self.elements,
            &self.coders,
            frame_bytes,
        );
        let data = writer.finish();
        if data.len() != frame_bytes {
            return Err(TaoError::Internal(format!(
                "码流长度 {} 与统计值 {} 不一致",
                data.len(),
                frame_bytes,
            )));
        }
        output[..frame_bytes].copy_from_slice(&data);

        let used_bits = frame_bytes * 8;
        let overrun = overrun || used_bits > budget_bits;
        if overrun {
            warn!(
                "第 {} 帧超出位预算: 使用 {} 位, 预算 {} 位",
                self.frame_num, used_bits, budget_bits,
            );
        }

        let stats = FrameStats {
            frame_number: self.frame_num,
            bytes: frame_bytes,
            budget_bits,
            used_bits,
            overrun,
            block_types: self.coders.iter().map(|c| c.block_type).collect(),
            ms_used: self
                .elements
                .iter()
                .filter_map(|e| match *e {
                    ChannelElement::Pair { ms_used, .. } => Some(ms_used),
                    _ => None,
                })
                .collect(),
        };
        trace!(
            "第 {} 帧: {} 字节, 块类型 {:?}, 中侧 {:?}",
            stats.frame_number, stats.bytes, stats.block_types, stats.ms_used,
        );
        self.last_frame = Some(stats);
        Ok(frame_bytes)
    }

    /// 按感知熵在声道间分配位预算并量化, 返回是否有声道超限
    ///
    /// 前面声道没用完的位数顺延给后面的声道. 最后仍有剩余时,
    /// 交还给受预算限制最明显的声道重新量化一次.
    fn allocate_and_quantize(&mut self, budget_bits: usize) -> bool {
        let side = bitstream::side_bits(&self.elements, &self.coders);
        let available = budget_bits.saturating_sub(side);

        for (ch, weight) in self.weights.iter_mut().enumerate() {
            let pe = self.psy.info(ch).pe(self.coders[ch].block_type).max(1.0);
            *weight = if self.lfe[ch] { pe * LFE_PE_WEIGHT } else { pe };
        }
        let total: f64 = self.weights.iter().sum();

        let mut carry = 0usize;
        let mut overrun = false;
        // (声道, 预算, 实际位数)
        let mut limited: Option<(usize, usize, usize)> = None;
        for (ch, coder) in self.coders.iter_mut().enumerate() {
            let share = (available as f64 * self.weights[ch] / total).floor() as usize;
            let pool = share + carry;
            let budget = pool.min(MAX_CHANNEL_PAYLOAD_BITS);
            let thr = self.psy.info(ch).thresholds(coder.block_type);
            let result = self
                .quantizer
                .quantize(coder, &self.freq[ch], thr, budget);
            trace!(
                "声道 {}: 预算 {} 位, 使用 {} 位, 失真 {:.3}",
                ch, budget, result.bits, result.distortion,
            );
            carry = pool.saturating_sub(result.bits);
            overrun |= result.overrun;
            if budget < MAX_CHANNEL_PAYLOAD_BITS
                && result.distortion > 0.0
                && limited.is_none_or(|(_, _, bits)| result.bits > bits)
            {
                limited = Some((ch, budget, result.bits));
            }
        }

        let retry = limited.filter(|&(_, budget, bits)| {
            carry > REDISTRIBUTE_MIN_BITS && (bits + carry).min(MAX_CHANNEL_PAYLOAD_BITS) > budget
        });
        if let Some((ch, _, bits)) = retry {
            let coder = &mut self.coders[ch];
            let extended = (bits + carry).min(MAX_CHANNEL_PAYLOAD_BITS);
            let thr = self.psy.info(ch).thresholds(coder.block_type);
            let result = self
                .quantizer
                .quantize(coder, &self.freq[ch], thr, extended);
            trace!(
                "声道 {}: 剩余 {} 位回补, 预算 {} 位, 使用 {} 位",
                ch, carry, extended, result.bits,
            );
            overrun |= result.overrun;
        }
        overrun
    }
}

/// 窗形状选择: 短块及其前导过渡块使用 KBD 窗, 其余使用正弦窗
fn window_shape_for(block_type: BlockType) -> WindowShape {
    match block_type {
        BlockType::OnlyShort | BlockType::LongToShort => WindowShape::Kbd,
        BlockType::OnlyLong | BlockType::ShortToLong => WindowShape::Sine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_会话可跨线程移动() {
        assert_send::<AacEncoder>();
    }

    #[test]
    fn test_打开参数校验() {
        assert!(matches!(
            AacEncoder::open(0, 2),
            Err(TaoError::InvalidArgument(_))
        ));
        assert!(matches!(
            AacEncoder::open(44100, 0),
            Err(TaoError::InvalidArgument(_))
        ));
        assert!(matches!(
            AacEncoder::open(44100, 7),
            Err(TaoError::InvalidArgument(_))
        ));
        assert!(AacEncoder::open(44100, 8).is_ok());
        assert!(AacEncoder::open(7350, 1).is_ok());
    }

    #[test]
    fn test_默认配置() {
        let enc = AacEncoder::open(48000, 2).unwrap();
        let config = enc.configuration();
        assert!(config.allow_midside);
        assert!(!config.use_lfe);
        assert_eq!(config.bit_rate, 128000);
        assert_eq!(enc.state(), SessionState::Filling);
    }

    #[test]
    fn test_码率为零被拒绝() {
        let mut enc = AacEncoder::open(44100, 1).unwrap();
        let mut config = enc.configuration();
        config.bit_rate = 0;
        assert!(enc.set_configuration(config).is_err());
        assert_eq!(enc.configuration().bit_rate, 64000);
    }

    #[test]
    fn test_帧预算() {
        let mut enc = AacEncoder::open(44100, 2).unwrap();
        // 128000 * 1024 / 44100 = 2972.3
        assert_eq!(enc.frame_budget_bits(), 2972);
        enc.set_configuration(EncoderConfig {
            bit_rate: 96000,
            ..enc.configuration()
        })
        .unwrap();
        // 96000 * 1024 / 44100 = 2229.1
        assert_eq!(enc.frame_budget_bits(), 2229);
    }

    #[test]
    fn test_输入过长被拒绝() {
        let mut enc = AacEncoder::open(44100, 2).unwrap();
        let pcm = vec![0i16; FRAME_LEN * 2 + 2];
        let mut out = vec![0u8; enc.max_frame_bytes()];
        assert!(matches!(
            enc.encode(&pcm, &mut out),
            Err(TaoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_冲刷后不接受新输入() {
        let mut enc = AacEncoder::open(44100, 1).unwrap();
        let mut out = vec![0u8; enc.max_frame_bytes()];
        assert_eq!(enc.encode(&[], &mut out).unwrap(), 0);
        assert_eq!(enc.state(), SessionState::Flushing);
        assert!(enc.encode(&[1, 2, 3], &mut out).is_err());
    }

    #[test]
    fn test_窗形状选择() {
        assert_eq!(window_shape_for(BlockType::OnlyLong), WindowShape::Sine);
        assert_eq!(window_shape_for(BlockType::LongToShort), WindowShape::Kbd);
        assert_eq!(window_shape_for(BlockType::OnlyShort), WindowShape::Kbd);
        assert_eq!(window_shape_for(BlockType::ShortToLong), WindowShape::Sine);
    }

    #[test]
    fn test_配置_json_缺省字段() {
        let config: EncoderConfig = serde_json::from_str(r#"{"bit_rate": 96000}"#).unwrap();
        assert_eq!(config.bit_rate, 96000);
        assert!(config.allow_midside);
        assert!(!config.use_lfe);
    }
}
