//! 心理声学模型.
//!
//! 每送入一帧 ([`PsyModel::buffer_update`]) 就对 `[上一帧, 新帧]` 做一次
//! 长窗 FFT 和 8 次短窗 FFT, 得到各频带能量, 并检测瞬态. 结果按前瞻深度
//! 存入 4 层历史, 与前瞻缓冲的槽位一一对应.
//!
//! [`PsyModel::calculate`] 针对深度 0 (本次编码的帧) 计算掩蔽阈值:
//! Bark 域 Schroeder 扩散函数求激励, 减去掩蔽偏移后与绝对听阈取大,
//! 长块再做前回声限制; 同时给出感知熵和期望块类型 (由深度 1 的瞬态标志决定).

use std::f64::consts::PI;

use tao_core::TaoResult;

use crate::coder::{BlockType, CoderInfo};
use crate::fft::RealFft;
use crate::lookahead::LOOKAHEAD_SLOTS;
use crate::sr_info::{LONG_LINES, SHORT_LINES, SrInfo};

/// 短窗个数
const NUM_SHORT: usize = 8;
/// 第一个短分析窗在 2048 点块中的起点 (与滤波器组短窗对齐)
const SHORT_START: usize = (LONG_LINES - SHORT_LINES) / 2;

/// 激励到掩蔽阈值的偏移 (dB)
const MASK_OFFSET_DB: f64 = 16.0;
/// 听阈曲线上限 (dB SPL), 避免高频处溢出
const ATH_CEILING_DB: f64 = 120.0;
/// 听阈 dB SPL 到长窗 MDCT 能量的换算偏移 (满幅正弦约为 96 dB SPL)
const ATH_OFFSET_LONG_DB: f64 = 56.0;
/// 听阈 dB SPL 到短窗 MDCT 能量的换算偏移
const ATH_OFFSET_SHORT_DB: f64 = 38.0;
/// 扩散函数截断 (dB)
const SPREAD_FLOOR_DB: f64 = -60.0;
/// 前回声限制: 阈值不超过上一帧的倍数
const PRE_ECHO_RATIO: f64 = 2.0;
/// FFT 功率到 MDCT 能量的换算系数
const POWER_SCALE: f64 = 2.0;
/// 比值计算的分母下界
const EPSILON: f64 = 1.0;

/// 瞬态检测段长
const ATTACK_SEGMENT: usize = 128;
/// 瞬态检测范围 (块内样本下标)
const ATTACK_BEGIN: usize = 512;
const ATTACK_END: usize = 1536;
/// 段能量超过此前若干段均值的倍数即判为瞬态
const ATTACK_RATIO: f64 = 10.0;
/// 参与均值的历史段数
const ATTACK_HISTORY: usize = 8;
/// 瞬态段的最低能量 (高通后)
const ATTACK_FLOOR: f64 = 1.0e6;

/// 单帧分析结果
#[derive(Debug, Clone)]
struct Analysis {
    energy_long: Vec<f64>,
    /// 下标 w * 短窗频带数 + sfb
    energy_short: Vec<f64>,
    attack: bool,
}

impl Analysis {
    fn new(num_long: usize, num_short: usize) -> Self {
        Self {
            energy_long: vec![0.0; num_long],
            energy_short: vec![0.0; NUM_SHORT * num_short],
            attack: false,
        }
    }
}

/// 单声道模型状态
#[derive(Debug, Clone)]
struct ChannelState {
    prev_frame: Vec<f64>,
    history: [Analysis; LOOKAHEAD_SLOTS],
    /// 上一帧未限制的长块阈值
    prev_thr_long: Vec<f64>,
}

/// 单声道心理声学输出
#[derive(Debug, Clone)]
pub struct PsyInfo {
    /// 长块各频带掩蔽阈值
    pub thr_long: Vec<f64>,
    /// 短块各窗各频带掩蔽阈值, 下标 w * 短窗频带数 + sfb
    pub thr_short: Vec<f64>,
    /// 长块感知熵
    pub pe_long: f64,
    /// 短块感知熵 (8 窗之和)
    pub pe_short: f64,
    /// 期望块类型 (OnlyLong 或 OnlyShort)
    pub desired_block_type: BlockType,
}

impl PsyInfo {
    fn new(num_long: usize, num_short: usize) -> Self {
        Self {
            thr_long: vec![0.0; num_long],
            thr_short: vec![0.0; NUM_SHORT * num_short],
            pe_long: 0.0,
            pe_short: 0.0,
            desired_block_type: BlockType::OnlyLong,
        }
    }

    /// 按块类型取阈值, 下标与 [`CoderInfo`] 的 (窗组, 频带) 一致
    pub fn thresholds(&self, block_type: BlockType) -> &[f64] {
        match block_type {
            BlockType::OnlyShort => &self.thr_short,
            BlockType::OnlyLong | BlockType::LongToShort | BlockType::ShortToLong => {
                &self.thr_long
            }
        }
    }

    /// 可写阈值 (中侧编码改写用)
    pub fn thresholds_mut(&mut self, block_type: BlockType) -> &mut [f64] {
        match block_type {
            BlockType::OnlyShort => &mut self.thr_short,
            BlockType::OnlyLong | BlockType::LongToShort | BlockType::ShortToLong => {
                &mut self.thr_long
            }
        }
    }

    /// 按块类型取感知熵
    pub fn pe(&self, block_type: BlockType) -> f64 {
        match block_type {
            BlockType::OnlyShort => self.pe_short,
            BlockType::OnlyLong | BlockType::LongToShort | BlockType::ShortToLong => self.pe_long,
        }
    }

    /// 可写感知熵 (中侧编码改写用)
    pub fn pe_mut(&mut self, block_type: BlockType) -> &mut f64 {
        match block_type {
            BlockType::OnlyShort => &mut self.pe_short,
            BlockType::OnlyLong | BlockType::LongToShort | BlockType::ShortToLong => {
                &mut self.pe_long
            }
        }
    }
}

/// 单个频带的感知熵: width * log2(max(1, e / thr))
pub fn band_pe(energy: f64, thr: f64, width: usize) -> f64 {
    let ratio = (energy + EPSILON) / (thr + EPSILON);
    if ratio > 1.0 {
        width as f64 * ratio.log2()
    } else {
        0.0
    }
}

/// 心理声学模型
pub struct PsyModel {
    sr_info: &'static SrInfo,
    fft_long: RealFft,
    fft_short: RealFft,
    win_long: Vec<f64>,
    win_short: Vec<f64>,
    /// 扩散矩阵 (线性), 下标 maskee * n + masker
    spread_long: Vec<f64>,
    spread_short: Vec<f64>,
    ath_long: Vec<f64>,
    ath_short: Vec<f64>,
    block: Vec<f64>,
    windowed: Vec<f64>,
    power: Vec<f64>,
    excitation: Vec<f64>,
    channels: Vec<ChannelState>,
    infos: Vec<PsyInfo>,
}

impl PsyModel {
    /// 创建模型, `sample_rate` 为会话实际采样率
    pub fn new(sample_rate: u32, sr_info: &'static SrInfo, channels: usize) -> Self {
        let num_long = sr_info.num_cb_long();
        let num_short = sr_info.num_cb_short();
        let sr = f64::from(sample_rate);

        let long_bark = band_barks(sr_info.cb_width_long, sr / (2.0 * LONG_LINES as f64));
        let short_bark = band_barks(sr_info.cb_width_short, sr / (2.0 * SHORT_LINES as f64));

        let state = ChannelState {
            prev_frame: vec![0.0; LONG_LINES],
            history: std::array::from_fn(|_| Analysis::new(num_long, num_short)),
            prev_thr_long: vec![0.0; num_long],
        };

        Self {
            sr_info,
            fft_long: RealFft::new((2 * LONG_LINES).trailing_zeros()),
            fft_short: RealFft::new((2 * SHORT_LINES).trailing_zeros()),
            win_long: analysis_window(2 * LONG_LINES),
            win_short: analysis_window(2 * SHORT_LINES),
            spread_long: spreading_matrix(&long_bark),
            spread_short: spreading_matrix(&short_bark),
            ath_long: band_ath(
                sr_info.cb_width_long,
                sr / (2.0 * LONG_LINES as f64),
                ATH_OFFSET_LONG_DB,
            ),
            ath_short: band_ath(
                sr_info.cb_width_short,
                sr / (2.0 * SHORT_LINES as f64),
                ATH_OFFSET_SHORT_DB,
            ),
            block: vec![0.0; 2 * LONG_LINES],
            windowed: vec![0.0; 2 * LONG_LINES],
            power: vec![0.0; LONG_LINES],
            excitation: vec![0.0; num_long.max(num_short)],
            channels: vec![state; channels],
            infos: vec![PsyInfo::new(num_long, num_short); channels],
        }
    }

    /// 送入第 `ch` 声道最新的一帧, 更新能量历史与瞬态标志
    pub fn buffer_update(&mut self, ch: usize, newest: &[f64]) -> TaoResult<()> {
        debug_assert_eq!(newest.len(), LONG_LINES);
        let num_short = self.sr_info.num_cb_short();
        let state = &mut self.channels[ch];

        self.block[..LONG_LINES].copy_from_slice(&state.prev_frame);
        self.block[LONG_LINES..].copy_from_slice(newest);
        state.prev_frame.copy_from_slice(newest);

        state.history.rotate_left(1);
        let analysis = &mut state.history[LOOKAHEAD_SLOTS - 1];

        for ((dst, &x), &w) in self
            .windowed
            .iter_mut()
            .zip(self.block.iter())
            .zip(self.win_long.iter())
        {
            *dst = x * w;
        }
        self.fft_long.power_spectrum(&self.windowed, &mut self.power)?;
        accumulate_bands(
            &self.power,
            self.sr_info.cb_width_long,
            &mut analysis.energy_long,
        );

        let short_len = 2 * SHORT_LINES;
        for w in 0..NUM_SHORT {
            let start = SHORT_START + w * SHORT_LINES;
            let seg = &self.block[start..start + short_len];
            for ((dst, &x), &win) in self.windowed[..short_len]
                .iter_mut()
                .zip(seg.iter())
                .zip(self.win_short.iter())
            {
                *dst = x * win;
            }
            self.fft_short
                .power_spectrum(&self.windowed[..short_len], &mut self.power[..SHORT_LINES])?;
            accumulate_bands(
                &self.power[..SHORT_LINES],
                self.sr_info.cb_width_short,
                &mut analysis.energy_short[w * num_short..(w + 1) * num_short],
            );
        }

        analysis.attack = detect_attack(&self.block);
        Ok(())
    }

    /// 计算所有声道当前编码帧的阈值、感知熵与期望块类型
    pub fn calculate(&mut self) {
        let widths_long = self.sr_info.cb_width_long;
        let widths_short = self.sr_info.cb_width_short;
        let num_long = widths_long.len();
        let num_short = widths_short.len();
        let ratio = 10f64.powf(-MASK_OFFSET_DB / 10.0);

        for (state, info) in self.channels.iter_mut().zip(self.infos.iter_mut()) {
            let current = &state.history[0];

            spread(
                &current.energy_long,
                &self.spread_long,
                &mut self.excitation[..num_long],
            );
            let mut pe_long = 0.0;
            for b in 0..num_long {
                let raw = self.excitation[b] * ratio;
                let limited = raw.min(PRE_ECHO_RATIO * state.prev_thr_long[b]);
                state.prev_thr_long[b] = raw;
                let thr = limited.max(self.ath_long[b]);
                info.thr_long[b] = thr;
                pe_long += band_pe(current.energy_long[b], thr, widths_long[b]);
            }

            let mut pe_short = 0.0;
            for w in 0..NUM_SHORT {
                let range = w * num_short..(w + 1) * num_short;
                let energy = &current.energy_short[range.clone()];
                spread(energy, &self.spread_short, &mut self.excitation[..num_short]);
                let thr = &mut info.thr_short[range];
                for b in 0..num_short {
                    thr[b] = (self.excitation[b] * ratio).max(self.ath_short[b]);
                    pe_short += band_pe(energy[b], thr[b], widths_short[b]);
                }
            }

            info.pe_long = pe_long;
            info.pe_short = pe_short;
            info.desired_block_type = if state.history[1].attack {
                BlockType::OnlyShort
            } else {
                BlockType::OnlyLong
            };
        }
    }

    /// 第 `ch` 声道的模型输出
    pub fn info(&self, ch: usize) -> &PsyInfo {
        &self.infos[ch]
    }

    /// 全部声道的模型输出
    pub fn infos(&self) -> &[PsyInfo] {
        &self.infos
    }

    /// 全部声道的可写模型输出
    pub fn infos_mut(&mut self) -> &mut [PsyInfo] {
        &mut self.infos
    }
}

/// 块切换
///
/// 所有非 LFE 声道共用一个决定: 任一声道期望短块则全部切短块.
/// 上一帧为 OnlyShort/LongToShort 时, 仅当上一次与本次都期望长块才
/// 过渡为 ShortToLong, 否则保持 OnlyShort; 上一帧为长块时, 期望短块
/// 则过渡为 LongToShort. LFE 声道固定 OnlyLong.
pub fn block_switch(coders: &mut [CoderInfo], infos: &[PsyInfo], lfe: &[bool]) {
    let want_short = coders
        .iter()
        .zip(infos.iter())
        .zip(lfe.iter())
        .any(|((_, info), &is_lfe)| !is_lfe && info.desired_block_type.is_short());
    let desired = if want_short {
        BlockType::OnlyShort
    } else {
        BlockType::OnlyLong
    };

    for (coder, &is_lfe) in coders.iter_mut().zip(lfe.iter()) {
        if is_lfe {
            coder.block_type = BlockType::OnlyLong;
            coder.desired_block_type = BlockType::OnlyLong;
            continue;
        }
        coder.block_type = match coder.block_type {
            BlockType::OnlyShort | BlockType::LongToShort => {
                if coder.desired_block_type.is_short() || want_short {
                    BlockType::OnlyShort
                } else {
                    BlockType::ShortToLong
                }
            }
            BlockType::OnlyLong | BlockType::ShortToLong => {
                if want_short {
                    BlockType::LongToShort
                } else {
                    BlockType::OnlyLong
                }
            }
        };
        coder.desired_block_type = desired;
    }
}

/// 分析用正弦窗
fn analysis_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| (PI * (i as f64 + 0.5) / len as f64).sin())
        .collect()
}

/// 频带能量累加 (FFT 功率换算到 MDCT 能量尺度)
fn accumulate_bands(power: &[f64], widths: &[usize], out: &mut [f64]) {
    let mut offset = 0;
    for (dst, &w) in out.iter_mut().zip(widths.iter()) {
        *dst = POWER_SCALE * power[offset..offset + w].iter().sum::<f64>();
        offset += w;
    }
}

/// 激励: excitation[b] = sum_j energy[j] * spread[b][j]
fn spread(energy: &[f64], matrix: &[f64], out: &mut [f64]) {
    let n = energy.len();
    for (b, dst) in out.iter_mut().enumerate() {
        let row = &matrix[b * n..(b + 1) * n];
        *dst = row.iter().zip(energy.iter()).map(|(s, e)| s * e).sum();
    }
}

/// Hz 到 Bark
fn bark(freq: f64) -> f64 {
    13.0 * (0.00076 * freq).atan() + 3.5 * ((freq / 7500.0) * (freq / 7500.0)).atan()
}

/// 各频带中心频率对应的 Bark 值
fn band_barks(widths: &[usize], hz_per_line: f64) -> Vec<f64> {
    let mut offset = 0;
    widths
        .iter()
        .map(|&w| {
            let center = (offset as f64 + w as f64 / 2.0) * hz_per_line;
            offset += w;
            bark(center)
        })
        .collect()
}

/// Schroeder 扩散函数 (dB), `dz` = 被掩蔽频带 Bark - 掩蔽频带 Bark
fn spreading_db(dz: f64) -> f64 {
    let x = dz + 0.474;
    15.81 + 7.5 * x - 17.5 * (1.0 + x * x).sqrt()
}

fn spreading_matrix(barks: &[f64]) -> Vec<f64> {
    let n = barks.len();
    let mut matrix = vec![0.0; n * n];
    for (b, &zb) in barks.iter().enumerate() {
        for (j, &zj) in barks.iter().enumerate() {
            let db = spreading_db(zb - zj);
            if db > SPREAD_FLOOR_DB {
                matrix[b * n + j] = 10f64.powf(db / 10.0);
            }
        }
    }
    matrix
}

/// 绝对听阈 (Terhardt 近似, dB SPL)
fn ath_db(freq: f64) -> f64 {
    let f = (freq / 1000.0).max(0.01);
    let db = 3.64 * f.powf(-0.8) - 6.5 * (-0.6 * (f - 3.3) * (f - 3.3)).exp() + 1e-3 * f.powi(4);
    db.min(ATH_CEILING_DB)
}

/// 各频带听阈能量: 频带内最低的单线听阈乘以频带宽度
fn band_ath(widths: &[usize], hz_per_line: f64, offset_db: f64) -> Vec<f64> {
    let mut offset = 0;
    widths
        .iter()
        .map(|&w| {
            let min_db = (offset..offset + w)
                .map(|k| ath_db((k as f64 + 0.5) * hz_per_line))
                .fold(f64::INFINITY, f64::min);
            offset += w;
            10f64.powf((min_db + offset_db) / 10.0) * w as f64
        })
        .collect()
}

/// 瞬态检测: 一阶差分高通后按 128 样本分段,
/// 检测范围内任一段能量超过此前 8 段均值的 10 倍且高于下限即为瞬态.
fn detect_attack(block: &[f64]) -> bool {
    let num_segments = ATTACK_END / ATTACK_SEGMENT;
    let mut energies = [0.0f64; ATTACK_END / ATTACK_SEGMENT];
    for (s, energy) in energies.iter_mut().enumerate().take(num_segments) {
        let start = (s * ATTACK_SEGMENT).max(1);
        let end = (s + 1) * ATTACK_SEGMENT;
        *energy = (start..end)
            .map(|n| {
                let d = block[n] - block[n - 1];
                d * d
            })
            .sum();
    }

    (ATTACK_BEGIN / ATTACK_SEGMENT..num_segments).any(|s| {
        let from = s.saturating_sub(ATTACK_HISTORY);
        let mean = energies[from..s].iter().sum::<f64>() / (s - from) as f64;
        energies[s] > ATTACK_FLOOR && energies[s] > ATTACK_RATIO * mean
    })
}
