//! AAC 分析滤波器组: 加窗 + MDCT, 50% 重叠.
//!
//! 每帧的变换输入为 `[上一帧 1024 样本, 当前帧 1024 样本]`.
//! 窗的上升沿使用上一帧的窗形状, 下降沿使用当前帧的窗形状:
//!
//! | 块类型 | 窗 |
//! |--------|----|
//! | OnlyLong | 长上升 / 长下降 |
//! | LongToShort | 长上升, 1024..1472 为 1, 1472..1600 短下降, 其后为 0 |
//! | ShortToLong | 0..448 为 0, 448..576 短上升, 576..1024 为 1, 长下降 |
//! | OnlyShort | 8 个 256 点短窗, 起点 448 + 128 * w |
//!
//! MDCT 使用 N/4 点复数 FFT 加前后旋转实现, 缩放与 ISO 14496-3 一致:
//! `X[k] = 2 * sum z[n] cos(2π/N (n + n0)(k + 1/2))`.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::coder::{BlockType, CoderInfo, WindowShape};
use crate::fft::SplitFft;
use crate::sr_info::{LONG_LINES, SHORT_LINES};

/// 长窗长度
pub const LONG_WINDOW: usize = 2 * LONG_LINES;
/// 短窗长度
pub const SHORT_WINDOW: usize = 2 * SHORT_LINES;
/// 短窗个数
pub const NUM_SHORT_WINDOWS: usize = 8;
/// 第一个短窗在 2048 点块中的起点
const SHORT_START: usize = (LONG_LINES - SHORT_LINES) / 2;

/// 长窗 KBD alpha
const KBD_ALPHA_LONG: f64 = 4.0;
/// 短窗 KBD alpha
const KBD_ALPHA_SHORT: f64 = 6.0;

/// 基于 FFT 的 MDCT (输入 N 点, 输出 N/2 点)
pub struct Mdct {
    n: usize,
    fft: SplitFft,
    /// 前后旋转因子 e^{-iπ(m + 1/8) / (N/2)}, m = 0..N/4
    twiddle: Vec<Complex<f64>>,
    fold: Vec<f64>,
    buf: Vec<Complex<f64>>,
}

impl Mdct {
    /// 创建 `n` 点 MDCT, `n` 必须是 2 的幂且不小于 8
    pub fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two() && n >= 8);
        let m = n / 2;
        let l = n / 4;
        let twiddle = (0..l)
            .map(|i| Complex::from_polar(1.0, -PI * (i as f64 + 0.125) / m as f64))
            .collect();
        Self {
            n,
            fft: SplitFft::new(l.trailing_zeros()),
            twiddle,
            fold: vec![0.0; m],
            buf: vec![Complex::new(0.0, 0.0); l],
        }
    }

    /// 输入长度
    pub fn len(&self) -> usize {
        self.n
    }

    /// 计算 MDCT: `input` 为 N 个已加窗样本, `output` 写入 N/2 个系数
    pub fn forward(&mut self, input: &[f64], output: &mut [f64]) {
        let m = self.n / 2;
        let h = m / 2;
        debug_assert_eq!(input.len(), self.n);
        debug_assert!(output.len() >= m);

        // TDAC 折叠: (a, b, c, d) -> (-c_r - d, a - b_r), 转化为 M 点 DCT-IV
        for i in 0..h {
            self.fold[i] = -input[3 * h - 1 - i] - input[3 * h + i];
            self.fold[h + i] = input[i] - input[m - 1 - i];
        }

        // DCT-IV: 偶数位与逆序奇数位组成复数, 前旋转, M/2 点 FFT, 后旋转
        for (i, (c, tw)) in self.buf.iter_mut().zip(self.twiddle.iter()).enumerate() {
            *c = Complex::new(self.fold[2 * i], self.fold[m - 1 - 2 * i]) * tw;
        }
        self.fft.process(&mut self.buf);
        for (p, (c, tw)) in self.buf.iter().zip(self.twiddle.iter()).enumerate() {
            let y = c * tw;
            output[2 * p] = 2.0 * y.re;
            output[m - 1 - 2 * p] = -2.0 * y.im;
        }
    }
}

/// 窗表集合
pub struct WindowBank {
    long_sine: Vec<f64>,
    long_kbd: Vec<f64>,
    short_sine: Vec<f64>,
    short_kbd: Vec<f64>,
}

impl WindowBank {
    /// 构建全部窗表
    pub fn new() -> Self {
        Self {
            long_sine: build_sine_window(LONG_WINDOW),
            long_kbd: build_kbd_window(LONG_WINDOW, KBD_ALPHA_LONG),
            short_sine: build_sine_window(SHORT_WINDOW),
            short_kbd: build_kbd_window(SHORT_WINDOW, KBD_ALPHA_SHORT),
        }
    }

    /// 长窗
    pub fn long(&self, shape: WindowShape) -> &[f64] {
        match shape {
            WindowShape::Sine => &self.long_sine,
            WindowShape::Kbd => &self.long_kbd,
        }
    }

    /// 短窗
    pub fn short(&self, shape: WindowShape) -> &[f64] {
        match shape {
            WindowShape::Sine => &self.short_sine,
            WindowShape::Kbd => &self.short_kbd,
        }
    }
}

impl Default for WindowBank {
    fn default() -> Self {
        Self::new()
    }
}

/// 分析滤波器组 (各声道共享窗表与 MDCT, 重叠缓冲保存在 [`CoderInfo`])
pub struct FilterBank {
    windows: WindowBank,
    mdct_long: Mdct,
    mdct_short: Mdct,
    block: Vec<f64>,
    windowed: Vec<f64>,
}

impl FilterBank {
    /// 创建滤波器组
    pub fn new() -> Self {
        Self {
            windows: WindowBank::new(),
            mdct_long: Mdct::new(LONG_WINDOW),
            mdct_short: Mdct::new(SHORT_WINDOW),
            block: vec![0.0; LONG_WINDOW],
            windowed: vec![0.0; LONG_WINDOW],
        }
    }

    /// 对一帧做正向变换
    ///
    /// 使用 `coder` 中的块类型与窗形状, 把 1024 条频谱线写入 `freq`
    /// (短块按窗顺序排列, 每窗 128 条), 并把 `frame` 存为下一帧的重叠部分.
    pub fn transform(&mut self, coder: &mut CoderInfo, frame: &[f64], freq: &mut [f64]) {
        debug_assert_eq!(frame.len(), LONG_LINES);
        debug_assert!(freq.len() >= LONG_LINES);

        self.block[..LONG_LINES].copy_from_slice(&coder.overlap);
        self.block[LONG_LINES..].copy_from_slice(frame);

        let prev = coder.prev_window_shape;
        let curr = coder.window_shape;

        match coder.block_type {
            BlockType::OnlyShort => {
                let short_prev = self.windows.short(prev);
                let short_curr = self.windows.short(curr);
                for w in 0..NUM_SHORT_WINDOWS {
                    let start = SHORT_START + w * SHORT_LINES;
                    let rise = if w == 0 { short_prev } else { short_curr };
                    let seg = &mut self.windowed[..SHORT_WINDOW];
                    for i in 0..SHORT_LINES {
                        seg[i] = self.block[start + i] * rise[i];
                        seg[SHORT_LINES + i] =
                            self.block[start + SHORT_LINES + i] * short_curr[SHORT_LINES + i];
                    }
                    let out = &mut freq[w * SHORT_LINES..(w + 1) * SHORT_LINES];
                    self.mdct_short.forward(&self.windowed[..SHORT_WINDOW], out);
                }
            }
            block_type => {
                apply_long_window(
                    &self.block,
                    &mut self.windowed,
                    block_type,
                    prev,
                    curr,
                    &self.windows,
                );
                self.mdct_long.forward(&self.windowed, &mut freq[..LONG_LINES]);
            }
        }

        coder.overlap.copy_from_slice(frame);
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new()
    }
}

/// 长块 (OnlyLong / LongToShort / ShortToLong) 加窗
fn apply_long_window(
    block: &[f64],
    out: &mut [f64],
    block_type: BlockType,
    prev: WindowShape,
    curr: WindowShape,
    windows: &WindowBank,
) {
    let long_prev = windows.long(prev);
    let long_curr = windows.long(curr);
    let short_prev = windows.short(prev);
    let short_curr = windows.short(curr);
    let flat_end = SHORT_START + LONG_LINES;

    for (i, (dst, &x)) in out.iter_mut().zip(block.iter()).enumerate() {
        let w = match block_type {
            BlockType::LongToShort => {
                if i < LONG_LINES {
                    long_prev[i]
                } else if i < flat_end {
                    1.0
                } else if i < flat_end + SHORT_LINES {
                    short_curr[SHORT_LINES + (i - flat_end)]
                } else {
                    0.0
                }
            }
            BlockType::ShortToLong => {
                if i < SHORT_START {
                    0.0
                } else if i < SHORT_START + SHORT_LINES {
                    short_prev[i - SHORT_START]
                } else if i < LONG_LINES {
                    1.0
                } else {
                    long_curr[i]
                }
            }
            BlockType::OnlyLong | BlockType::OnlyShort => {
                if i < LONG_LINES {
                    long_prev[i]
                } else {
                    long_curr[i]
                }
            }
        };
        *dst = x * w;
    }
}

/// 构建正弦窗
pub fn build_sine_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| (PI / len as f64 * (i as f64 + 0.5)).sin())
        .collect()
}

/// 构建 KBD 窗 (ISO 14496-3 4.6.11.3.1)
///
/// 前半窗 W(n) = sqrt(sum_{j<=n} w(j) / sum_{j<=N/2} w(j)),
/// w(j) = I0(πα sqrt(1 - ((j - N/4) / (N/4))^2)), 后半窗对称.
pub fn build_kbd_window(len: usize, alpha: f64) -> Vec<f64> {
    if len < 2 || len % 2 != 0 {
        return build_sine_window(len);
    }

    let half = len / 2;
    let half_f = half as f64;
    let proto: Vec<f64> = (0..=half)
        .map(|j| {
            let x = (2.0 * j as f64) / half_f - 1.0;
            bessel_i0(alpha * PI * (1.0 - x * x).max(0.0).sqrt())
        })
        .collect();
    let total: f64 = proto.iter().sum::<f64>().max(f64::EPSILON);

    let mut window = vec![0.0f64; len];
    let mut running = 0.0f64;
    for i in 0..half {
        running += proto[i];
        let w = (running / total).sqrt();
        window[i] = w;
        window[len - 1 - i] = w;
    }
    window
}

/// 第一类修正贝塞尔函数 I0
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0f64;
    let mut term = 1.0f64;
    let half = x * 0.5;
    let mut k = 1.0f64;
    loop {
        term *= (half * half) / (k * k);
        sum += term;
        if term < 1e-14 * sum || k > 100.0 {
            break;
        }
        k += 1.0;
    }
    sum
}
