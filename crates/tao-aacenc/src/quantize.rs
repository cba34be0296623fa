//! 量化与码率控制.
//!
//! 量化公式 (ISO 14496-3 非均匀量化):
//! `q = floor((|x| * 2^(-(sf - 100) / 4))^(3/4) + 0.4054)`, |q| <= 8191.
//!
//! 流程:
//! 1. 能量不超过掩蔽阈值的频带直接置零 (零码本);
//! 2. 其余频带由阈值给出初始缩放因子: 量化噪声约为 width * step^2 / 12;
//! 3. 内循环: 对全局偏移做二分查找, 取能放进预算的最细量化;
//! 4. 外循环: 噪声超过阈值的频带缩放因子减小, 重新做内循环,
//!    仅当仍在预算内且加权失真严格下降时采纳, 最多 4 轮;
//! 5. 最粗量化仍超预算时输出全零频谱并报告超限.

use log::trace;

use crate::bitstream;
use crate::coder::{CoderInfo, SF_OFFSET, Section, ZERO_HCB};
use crate::huffman::{self, MAX_QUANT, MAX_SF_DELTA};

/// 量化取整偏置
const MAGIC_NUMBER: f64 = 0.4054;
/// 外循环最大轮数
const MAX_OUTER_LOOPS: usize = 4;
/// 内循环全局偏移搜索范围
const MIN_GLOBAL_OFFSET: i32 = -32;
const MAX_GLOBAL_OFFSET: i32 = 255;
/// 缩放因子取值范围
const MAX_SCALE_FACTOR: i32 = 255;
/// 失真权重分母下界
const MIN_THRESHOLD: f64 = 1e-9;

/// 单声道量化结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizeResult {
    /// section + scalefactor + spectral 位数
    pub bits: usize,
    /// 加权失真 sum(noise / thr)
    pub distortion: f64,
    /// 预算不足, 已退化为全零频谱
    pub overrun: bool,
}

/// 频带 (窗组, 频带) 的静态信息
#[derive(Debug, Clone, Copy, Default)]
struct Band {
    energy: f64,
    thr: f64,
    active: bool,
    /// 由阈值推出的缩放因子
    base_sf: i32,
    /// 保证 |q| <= 8191 的最小缩放因子
    min_sf: i32,
}

/// 最佳候选的快照
#[derive(Debug, Clone, Default)]
struct Snapshot {
    scale_factor: Vec<i32>,
    book: Vec<u8>,
    sections: Vec<Section>,
    quantized: Vec<i32>,
    global_gain: i32,
    max_sfb: usize,
    noise: Vec<f64>,
}

impl Snapshot {
    fn save(&mut self, coder: &CoderInfo, noise: &[f64]) {
        self.scale_factor.clone_from(&coder.scale_factor);
        self.book.clone_from(&coder.book);
        self.sections.clone_from(&coder.sections);
        self.quantized.clone_from(&coder.quantized);
        self.global_gain = coder.global_gain;
        self.max_sfb = coder.max_sfb;
        self.noise.clear();
        self.noise.extend_from_slice(noise);
    }

    fn restore(&self, coder: &mut CoderInfo) {
        coder.scale_factor.clone_from(&self.scale_factor);
        coder.book.clone_from(&self.book);
        coder.sections.clone_from(&self.sections);
        coder.quantized.clone_from(&self.quantized);
        coder.global_gain = self.global_gain;
        coder.max_sfb = self.max_sfb;
    }
}

/// 量化器 (跨帧复用缓冲)
pub struct Quantizer {
    /// |x|^(3/4)
    xr34: Vec<f64>,
    /// q^(4/3), q = 0..=8191
    pow43: Vec<f64>,
    bands: Vec<Band>,
    noise: Vec<f64>,
    scratch: Vec<i32>,
    best: Snapshot,
}

impl Quantizer {
    /// 创建量化器
    pub fn new() -> Self {
        Self {
            xr34: Vec::new(),
            pow43: (0..=MAX_QUANT).map(|q| f64::from(q).powf(4.0 / 3.0)).collect(),
            bands: Vec::new(),
            noise: Vec::new(),
            scratch: Vec::new(),
            best: Snapshot::default(),
        }
    }

    /// 量化一个声道
    ///
    /// `freq` 为 1024 条频谱线 (短块按窗顺序), `thr` 为 (窗, 频带) 阈值,
    /// `budget` 为该声道可变部分可用的位数. 结果写回 `coder`.
    pub fn quantize(
        &mut self,
        coder: &mut CoderInfo,
        freq: &[f64],
        thr: &[f64],
        budget: usize,
    ) -> QuantizeResult {
        self.xr34.clear();
        self.xr34.extend(freq.iter().map(|x| x.abs().powf(0.75)));
        self.prepare_bands(coder, freq, thr);

        let Some(first) = self.search(coder, freq, budget) else {
            let result = self.evaluate_zero(coder, freq);
            trace!(
                "量化超出预算: 全零频谱 {} 位, 预算 {} 位",
                result.bits,
                budget
            );
            return result;
        };
        let mut best = first;

        for _ in 0..MAX_OUTER_LOOPS {
            let mut changed = false;
            for (band, &noise) in self.bands.iter_mut().zip(self.best.noise.iter()) {
                if band.active && noise > band.thr && band.base_sf > 0 {
                    band.base_sf -= 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            let previous = self.best.clone();
            match self.search(coder, freq, budget) {
                Some(candidate) if candidate.distortion < best.distortion => {
                    best = candidate;
                }
                _ => {
                    self.best = previous;
                    break;
                }
            }
        }

        self.best.restore(coder);
        best
    }

    /// 计算各频带能量、阈值与初始缩放因子
    fn prepare_bands(&mut self, coder: &CoderInfo, freq: &[f64], thr: &[f64]) {
        let nsfb = coder.nr_of_sfb;
        let lines = coder.window_lines();
        let max_pow = f64::from(MAX_QUANT) - MAGIC_NUMBER;

        self.bands.clear();
        self.bands.resize(coder.num_window_groups * nsfb, Band::default());
        for g in 0..coder.num_window_groups {
            let first = coder.group_start_window(g);
            let windows = first..first + coder.window_group_length[g];
            for sfb in 0..nsfb {
                let width = coder.sfb_offset[sfb + 1] - coder.sfb_offset[sfb];
                let mut energy = 0.0;
                let mut band_thr = 0.0;
                let mut peak34 = 0.0f64;
                for w in windows.clone() {
                    let start = w * lines + coder.sfb_offset[sfb];
                    for k in start..start + width {
                        energy += freq[k] * freq[k];
                        peak34 = peak34.max(self.xr34[k]);
                    }
                    band_thr += thr[w * nsfb + sfb];
                }
                let band_thr = band_thr.max(MIN_THRESHOLD);
                let total_width = (width * (windows.end - windows.start)) as f64;

                let band = &mut self.bands[g * nsfb + sfb];
                band.energy = energy;
                band.thr = band_thr;
                band.active = energy > band_thr && peak34 > 0.0;
                if !band.active {
                    continue;
                }
                let step = (12.0 * band_thr / total_width).log2();
                band.base_sf = (SF_OFFSET as f64 + (2.0 * step).floor())
                    .clamp(0.0, f64::from(MAX_SCALE_FACTOR)) as i32;
                // peak34 * 2^(-3/16 (sf - 100)) <= 8190.59
                let need = (16.0 / 3.0 * (peak34 / max_pow).log2()).ceil();
                band.min_sf = (SF_OFFSET as f64 + need).clamp(0.0, f64::from(MAX_SCALE_FACTOR)) as i32;
            }
        }
    }

    /// 内循环: 二分查找能放进预算的最小全局偏移, 成功时更新快照
    fn search(&mut self, coder: &mut CoderInfo, freq: &[f64], budget: usize) -> Option<QuantizeResult> {
        let finest = self.evaluate(coder, freq, MIN_GLOBAL_OFFSET);
        if finest.bits <= budget {
            self.best.save(coder, &self.noise);
            return Some(finest);
        }
        let coarsest = self.evaluate(coder, freq, MAX_GLOBAL_OFFSET);
        if coarsest.bits > budget {
            return None;
        }
        let mut fit = (MAX_GLOBAL_OFFSET, coarsest);
        self.best.save(coder, &self.noise);

        let mut lo = MIN_GLOBAL_OFFSET;
        let mut hi = MAX_GLOBAL_OFFSET;
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            let result = self.evaluate(coder, freq, mid);
            if result.bits <= budget {
                hi = mid;
                fit = (mid, result);
                self.best.save(coder, &self.noise);
            } else {
                lo = mid;
            }
        }
        trace!("内循环: 全局偏移 {}, {} 位", fit.0, fit.1.bits);
        Some(fit.1)
    }

    /// 以全局偏移 `offset` 量化全部频带, 结果写入 `coder`
    fn evaluate(&mut self, coder: &mut CoderInfo, freq: &[f64], offset: i32) -> QuantizeResult {
        let nsfb = coder.nr_of_sfb;
        let lines = coder.window_lines();
        let mut last: Option<i32> = None;
        let mut distortion = 0.0;
        self.noise.clear();
        self.noise.resize(self.bands.len(), 0.0);

        for g in 0..coder.num_window_groups {
            let first = coder.group_start_window(g);
            let windows = first..first + coder.window_group_length[g];
            for sfb in 0..nsfb {
                let idx = g * nsfb + sfb;
                let band = self.bands[idx];
                let width = coder.sfb_offset[sfb + 1] - coder.sfb_offset[sfb];

                let mut sf = (band.base_sf + offset).max(band.min_sf);
                if let Some(prev) = last {
                    sf = sf.clamp(prev - MAX_SF_DELTA, prev + MAX_SF_DELTA);
                }
                sf = sf.clamp(0, MAX_SCALE_FACTOR);

                let mut noise = 0.0;
                let mut nonzero = false;
                self.scratch.clear();
                if band.active {
                    let inv = 2f64.powf(-0.1875 * f64::from(sf - SF_OFFSET));
                    let gain = 2f64.powf(0.25 * f64::from(sf - SF_OFFSET));
                    for w in windows.clone() {
                        let start = w * lines + coder.sfb_offset[sfb];
                        for k in start..start + width {
                            let q = ((self.xr34[k] * inv + MAGIC_NUMBER).floor() as u32).min(MAX_QUANT);
                            let err = freq[k].abs() - self.pow43[q as usize] * gain;
                            noise += err * err;
                            nonzero |= q != 0;
                            let signed = if freq[k] < 0.0 { -(q as i32) } else { q as i32 };
                            coder.quantized[k] = signed;
                            self.scratch.push(signed);
                        }
                    }
                }

                if nonzero {
                    let (book, _) = huffman::choose_book(&self.scratch);
                    coder.book[idx] = book;
                    coder.scale_factor[idx] = sf;
                    if last.is_none() {
                        coder.global_gain = sf;
                    }
                    last = Some(sf);
                } else {
                    for w in windows.clone() {
                        let start = w * lines + coder.sfb_offset[sfb];
                        coder.quantized[start..start + width].fill(0);
                    }
                    coder.book[idx] = ZERO_HCB;
                    coder.scale_factor[idx] = 0;
                    noise = band.energy;
                }
                self.noise[idx] = noise;
                distortion += noise / band.thr;
            }
        }
        if last.is_none() {
            coder.global_gain = 0;
        }

        coder.max_sfb = nsfb;
        build_sections(coder);
        QuantizeResult {
            bits: bitstream::payload_bits(coder),
            distortion,
            overrun: false,
        }
    }

    /// 全零频谱 (最粗结果)
    fn evaluate_zero(&mut self, coder: &mut CoderInfo, freq: &[f64]) -> QuantizeResult {
        for band in &mut self.bands {
            band.active = false;
        }
        let mut result = self.evaluate(coder, freq, MAX_GLOBAL_OFFSET);
        result.overrun = true;
        result
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new()
    }
}

/// 按窗组把相邻的同码本频带合并为分段
pub fn build_sections(coder: &mut CoderInfo) {
    coder.sections.clear();
    let nsfb = coder.nr_of_sfb;
    for g in 0..coder.num_window_groups {
        let mut sfb = 0;
        while sfb < coder.max_sfb {
            let book = coder.book[g * nsfb + sfb];
            let start = sfb;
            while sfb < coder.max_sfb && coder.book[g * nsfb + sfb] == book {
                sfb += 1;
            }
            coder.sections.push(Section {
                group: g,
                book,
                start,
                len: sfb - start,
            });
        }
    }
}
