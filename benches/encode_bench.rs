//! AAC-LC 编码器性能基准测试.
//!
//! 覆盖整帧编码、MDCT 与心理声学模型等核心路径.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tao_aac::aacenc::coder::CoderInfo;
use tao_aac::aacenc::filterbank::{FilterBank, Mdct};
use tao_aac::aacenc::psych::PsyModel;
use tao_aac::aacenc::sr_info;
use tao_aac::{AacEncoder, SessionState};

/// 生成交错正弦波帧
fn make_sine_frame(frame: usize, channels: usize) -> Vec<i16> {
    let mut pcm = Vec::with_capacity(1024 * channels);
    for i in 0..1024 {
        let t = (frame * 1024 + i) as f64 / 44100.0;
        let v = 6000.0 * (t * 440.0 * 2.0 * std::f64::consts::PI).sin()
            + 2000.0 * (t * 5300.0 * 2.0 * std::f64::consts::PI).sin();
        for _ in 0..channels {
            pcm.push(v as i16);
        }
    }
    pcm
}

fn bench_encode_stereo(c: &mut Criterion) {
    c.bench_function("aac_encode_stereo_44100_frame", |b| {
        let frames: Vec<Vec<i16>> = (0..16).map(|k| make_sine_frame(k, 2)).collect();
        let mut enc = AacEncoder::open(44100, 2).unwrap();
        let mut out = vec![0u8; enc.max_frame_bytes()];
        let mut k = 0;
        b.iter(|| {
            let n = enc.encode(black_box(&frames[k % frames.len()]), &mut out).unwrap();
            k += 1;
            n
        });
    });
}

fn bench_encode_session(c: &mut Criterion) {
    c.bench_function("aac_encode_mono_session_32_frames", |b| {
        let frames: Vec<Vec<i16>> = (0..32).map(|k| make_sine_frame(k, 1)).collect();
        b.iter(|| {
            let mut enc = AacEncoder::open(44100, 1).unwrap();
            let mut out = vec![0u8; enc.max_frame_bytes()];
            let mut total = 0;
            for frame in &frames {
                total += enc.encode(black_box(frame), &mut out).unwrap();
            }
            while enc.state() != SessionState::Terminated {
                total += enc.encode(&[], &mut out).unwrap();
            }
            total
        });
    });
}

fn bench_mdct(c: &mut Criterion) {
    c.bench_function("mdct_2048", |b| {
        let mut mdct = Mdct::new(2048);
        let input: Vec<f64> = (0..2048).map(|i| (i as f64 * 0.01).sin()).collect();
        let mut output = vec![0.0; 1024];
        b.iter(|| mdct.forward(black_box(&input), &mut output));
    });

    c.bench_function("filterbank_long_frame", |b| {
        let (_, info) = sr_info::lookup(44100);
        let mut filterbank = FilterBank::new();
        let mut coder = CoderInfo::new(info);
        let frame: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.05).sin() * 1000.0).collect();
        let mut freq = vec![0.0; 1024];
        b.iter(|| filterbank.transform(&mut coder, black_box(&frame), &mut freq));
    });
}

fn bench_psych(c: &mut Criterion) {
    c.bench_function("psych_stereo_frame", |b| {
        let (_, info) = sr_info::lookup(44100);
        let mut psy = PsyModel::new(44100, info, 2);
        let frame: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.07).sin() * 3000.0).collect();
        b.iter(|| {
            for ch in 0..2 {
                psy.buffer_update(ch, black_box(&frame)).unwrap();
            }
            psy.calculate();
        });
    });
}

criterion_group!(
    benches,
    bench_encode_stereo,
    bench_encode_session,
    bench_mdct,
    bench_psych,
);
criterion_main!(benches);
