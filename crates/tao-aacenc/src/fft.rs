//! 快速傅里叶变换内核.
//!
//! 心理声学模型与滤波器组只依赖这里的两个定长变换:
//! - [`RealFft`]: 实数输入的正向变换 (rsfft), 输出 N/2+1 个复数频点
//! - [`SplitFft`]: 实部/虚部分离存放的复数正/逆变换 (srfft/srifft)
//!
//! 长度必须是 2 的幂, 创建时确定, 之后不再分配内存.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tao_core::{TaoError, TaoResult};

/// 实数 FFT (rsfft)
pub struct RealFft {
    len: usize,
    plan: Arc<dyn RealToComplex<f64>>,
    input: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl RealFft {
    /// 创建长度为 `1 << logm` 的实数变换
    pub fn new(logm: u32) -> Self {
        let len = 1usize << logm;
        let mut planner = RealFftPlanner::<f64>::new();
        let plan = planner.plan_fft_forward(len);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        Self {
            len,
            plan,
            input,
            spectrum,
            scratch,
        }
    }

    /// 变换长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 正向变换, 返回 `len / 2 + 1` 个频点 (未归一化)
    pub fn rsfft(&mut self, x: &[f64]) -> TaoResult<&[Complex<f64>]> {
        if x.len() != self.len {
            return Err(TaoError::Internal(format!(
                "rsfft 输入长度 {} 与变换长度 {} 不符",
                x.len(),
                self.len,
            )));
        }
        self.input.copy_from_slice(x);
        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|e| TaoError::Internal(format!("rsfft 失败: {e}")))?;
        Ok(&self.spectrum)
    }

    /// 计算功率谱 |X[k]|^2, k = 0..len/2 (写入 `out` 的前 len/2 个位置)
    pub fn power_spectrum(&mut self, x: &[f64], out: &mut [f64]) -> TaoResult<()> {
        let half = self.len / 2;
        let spectrum = self.rsfft(x)?;
        for (dst, bin) in out.iter_mut().zip(spectrum.iter().take(half)) {
            *dst = bin.norm_sqr();
        }
        Ok(())
    }
}

/// 实虚分离的复数 FFT (srfft / srifft)
pub struct SplitFft {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl SplitFft {
    /// 创建长度为 `1 << logm` 的复数变换
    pub fn new(logm: u32) -> Self {
        let len = 1usize << logm;
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            len,
            forward,
            inverse,
            buffer: vec![Complex::new(0.0, 0.0); len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// 变换长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 正向变换 (e^{-2πi nk/N}), 原地, 未归一化
    pub fn srfft(&mut self, xr: &mut [f64], xi: &mut [f64]) {
        self.run(xr, xi, true);
    }

    /// 逆向变换 (e^{+2πi nk/N}), 原地, 未归一化 (往返结果放大 N 倍)
    pub fn srifft(&mut self, xr: &mut [f64], xi: &mut [f64]) {
        self.run(xr, xi, false);
    }

    /// 直接对复数缓冲做正向变换, 供 MDCT 使用
    pub fn process(&mut self, data: &mut [Complex<f64>]) {
        debug_assert_eq!(data.len(), self.len);
        self.forward.process_with_scratch(data, &mut self.scratch);
    }

    fn run(&mut self, xr: &mut [f64], xi: &mut [f64], forward: bool) {
        debug_assert_eq!(xr.len(), self.len);
        debug_assert_eq!(xi.len(), self.len);
        for ((c, &re), &im) in self.buffer.iter_mut().zip(xr.iter()).zip(xi.iter()) {
            *c = Complex::new(re, im);
        }
        let plan = if forward {
            &self.forward
        } else {
            &self.inverse
        };
        plan.process_with_scratch(&mut self.buffer, &mut self.scratch);
        for ((c, re), im) in self.buffer.iter().zip(xr.iter_mut()).zip(xi.iter_mut()) {
            *re = c.re;
            *im = c.im;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_rsfft_正弦峰值位置() {
        let mut fft = RealFft::new(8);
        let n = fft.len();
        let x: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 16.0 * i as f64 / n as f64).cos())
            .collect();
        let mut power = vec![0.0; n / 2];
        fft.power_spectrum(&x, &mut power).unwrap();
        let peak = power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 16);
        // 单位余弦在 bin 16 的幅度为 N/2
        assert!((power[16].sqrt() - n as f64 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsfft_长度不符返回错误() {
        let mut fft = RealFft::new(6);
        assert!(fft.rsfft(&[0.0; 10]).is_err());
    }

    #[test]
    fn test_srfft_srifft_往返() {
        let mut fft = SplitFft::new(5);
        let n = fft.len();
        let orig_r: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let orig_i: Vec<f64> = (0..n).map(|i| ((i * 3) % 5) as f64 * 0.5).collect();
        let mut xr = orig_r.clone();
        let mut xi = orig_i.clone();
        fft.srfft(&mut xr, &mut xi);
        fft.srifft(&mut xr, &mut xi);
        for i in 0..n {
            assert!((xr[i] / n as f64 - orig_r[i]).abs() < 1e-9);
            assert!((xi[i] / n as f64 - orig_i[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_srfft_直流分量() {
        let mut fft = SplitFft::new(4);
        let mut xr = vec![1.0; 16];
        let mut xi = vec![0.0; 16];
        fft.srfft(&mut xr, &mut xi);
        assert!((xr[0] - 16.0).abs() < 1e-12);
        for k in 1..16 {
            assert!(xr[k].abs() < 1e-9 && xi[k].abs() < 1e-9);
        }
    }
}
