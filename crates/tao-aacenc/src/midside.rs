//! 中侧 (M/S) 立体声决策.
//!
//! 对每个 CPE 比较左右独立编码与和差编码的感知熵:
//! M = (L + R) / 2, S = (L - R) / 2, 和差阈值取左右阈值的较小者.
//! 仅当和差编码严格更省时才采用, 相等时保持独立编码.
//! 采用后频谱原地改写为 M/S, 两声道阈值同时改为和差阈值,
//! 感知熵按 M/S 各自的份额重分, 声道对的总感知熵不变.

use crate::channels::ChannelElement;
use crate::coder::CoderInfo;
use crate::psych::{PsyInfo, band_pe};

/// 对所有声道对做中侧决策, 返回采用中侧编码的声道对数
pub fn ms_encode(
    elements: &mut [ChannelElement],
    coders: &[CoderInfo],
    freq: &mut [Vec<f64>],
    psy: &mut [PsyInfo],
    allow_midside: bool,
) -> usize {
    let mut used = 0;
    for element in elements.iter_mut() {
        let ChannelElement::Pair {
            left,
            right,
            ms_used,
            ..
        } = element
        else {
            continue;
        };
        *ms_used = false;
        if !allow_midside {
            continue;
        }
        let (l, r) = (*left, *right);
        let coder = &coders[l];
        if coder.block_type != coders[r].block_type {
            continue;
        }

        let (freq_l, freq_r) = pair_mut(freq, l, r);
        let (psy_l, psy_r) = pair_mut(psy, l, r);
        let block_type = coder.block_type;
        let thr_l = psy_l.thresholds_mut(block_type);
        let thr_r = psy_r.thresholds_mut(block_type);

        let windows = coder.num_window_groups;
        let lines = coder.window_lines();
        let nsfb = coder.nr_of_sfb;

        let mut pe_lr = 0.0;
        let (mut pe_m, mut pe_s) = (0.0, 0.0);
        for w in 0..windows {
            for sfb in 0..nsfb {
                let start = w * lines + coder.sfb_offset[sfb];
                let end = w * lines + coder.sfb_offset[sfb + 1];
                let width = end - start;
                let (mut e_l, mut e_r, mut e_m, mut e_s) = (0.0, 0.0, 0.0, 0.0);
                for (&a, &b) in freq_l[start..end].iter().zip(freq_r[start..end].iter()) {
                    let m = (a + b) * 0.5;
                    let s = (a - b) * 0.5;
                    e_l += a * a;
                    e_r += b * b;
                    e_m += m * m;
                    e_s += s * s;
                }
                let idx = w * nsfb + sfb;
                let thr_ms = thr_l[idx].min(thr_r[idx]);
                pe_lr += band_pe(e_l, thr_l[idx], width) + band_pe(e_r, thr_r[idx], width);
                pe_m += band_pe(e_m, thr_ms, width);
                pe_s += band_pe(e_s, thr_ms, width);
            }
        }

        let pe_ms = pe_m + pe_s;
        if pe_ms < pe_lr {
            for (a, b) in freq_l.iter_mut().zip(freq_r.iter_mut()) {
                let m = (*a + *b) * 0.5;
                let s = (*a - *b) * 0.5;
                *a = m;
                *b = s;
            }
            for (tl, tr) in thr_l.iter_mut().zip(thr_r.iter_mut()) {
                let t = tl.min(*tr);
                *tl = t;
                *tr = t;
            }
            let pair_pe = psy_l.pe(block_type) + psy_r.pe(block_type);
            let scale = if pair_pe > 0.0 && pe_ms > 0.0 { pair_pe / pe_ms } else { 1.0 };
            *psy_l.pe_mut(block_type) = pe_m * scale;
            *psy_r.pe_mut(block_type) = pe_s * scale;
            *ms_used = true;
            used += 1;
        }
    }
    used
}

/// 同时可变借用切片中的两个不同元素 (`a < b`)
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert!(a < b);
    let (head, tail) = items.split_at_mut(b);
    (&mut head[a], &mut tail[0])
}
