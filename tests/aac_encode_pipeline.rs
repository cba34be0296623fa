//! AAC-LC 编码会话集成测试.
//!
//! 测试完整的编码管线:
//! 交错 PCM → AacEncoder (前瞻 / 心理声学 / 块切换 / MDCT / 中侧 / 量化)
//! → ADTS 帧 (内存)
//!
//! 覆盖填充与冲刷状态机、块切换序列、码率控制与 ADTS 帧头字段.

use tao_aac::core::TaoError;
use tao_aac::{AacEncoder, BlockType, EncoderConfig, SessionState};

// ============================================================
// 辅助函数
// ============================================================

const FRAME: usize = 1024;

/// 生成交错正弦波帧, `start` 为帧起始采样序号
fn sine_frame(
    sample_rate: u32,
    freq: f64,
    amplitude: f64,
    start: usize,
    channels: usize,
) -> Vec<i16> {
    let mut pcm = Vec::with_capacity(FRAME * channels);
    for i in 0..FRAME {
        let t = (start + i) as f64 / f64::from(sample_rate);
        let value = (amplitude * (t * freq * 2.0 * std::f64::consts::PI).sin()) as i16;
        for _ in 0..channels {
            pcm.push(value);
        }
    }
    pcm
}

/// 生成交错白噪声帧 (线性同余, 结果可复现), 各声道取相同样本
fn noise_frame(seed: &mut u32, amplitude: f64, channels: usize) -> Vec<i16> {
    let mut pcm = Vec::with_capacity(FRAME * channels);
    for _ in 0..FRAME {
        *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let unit = f64::from(*seed >> 8) / f64::from(1u32 << 24) * 2.0 - 1.0;
        let value = (amplitude * unit) as i16;
        for _ in 0..channels {
            pcm.push(value);
        }
    }
    pcm
}

/// 解析 ADTS 帧头, 返回 (采样率索引, 声道配置, 帧长度)
fn parse_adts_header(data: &[u8]) -> (u8, u8, usize) {
    assert!(data.len() >= 7, "ADTS 帧过短");
    assert_eq!(data[0], 0xFF, "同步字高 8 位错误");
    assert_eq!(data[1] & 0xF0, 0xF0, "同步字低 4 位错误");
    assert_eq!(data[1] & 0x08, 0, "ID 应为 MPEG-4");
    assert_eq!(data[1] & 0x01, 1, "protection_absent 应为 1");
    assert_eq!(data[2] >> 6, 1, "profile 应为 LC");
    let sr_index = (data[2] >> 2) & 0x0F;
    let channel_config = ((data[2] & 0x01) << 2) | (data[3] >> 6);
    let frame_len = (usize::from(data[3] & 0x03) << 11)
        | (usize::from(data[4]) << 3)
        | (usize::from(data[5]) >> 5);
    let fullness = (u16::from(data[5] & 0x1F) << 6) | u16::from(data[6] >> 2);
    assert_eq!(fullness, 0x7FF, "缓冲区满度应为 VBR");
    (sr_index, channel_config, frame_len)
}

// ============================================================
// 状态机
// ============================================================

#[test]
fn test_静音立体声前三帧无输出() {
    let mut enc = AacEncoder::open(44100, 2).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let pcm = vec![0i16; FRAME * 2];

    let mut sizes = Vec::new();
    let mut stats = Vec::new();
    for _ in 0..5 {
        sizes.push(enc.encode(&pcm, &mut out).unwrap());
        stats.push(enc.last_frame().cloned());
    }

    assert_eq!(&sizes[..3], &[0, 0, 0]);
    assert!(sizes[3] > 0);
    assert!(sizes[4] > 0);
    assert!(stats[2].is_none(), "填充阶段不应有帧统计");

    let fourth = stats[3].as_ref().unwrap();
    assert_eq!(fourth.block_types, vec![BlockType::OnlyLong; 2]);
    assert_eq!(fourth.ms_used, vec![false], "静音时中侧与独立编码代价相同, 应保持独立");
    assert_eq!(enc.state(), SessionState::Steady);
}

#[test]
fn test_静音帧结果确定() {
    let pcm = vec![0i16; FRAME * 2];
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let mut enc = AacEncoder::open(44100, 2).unwrap();
        let mut out = vec![0u8; enc.max_frame_bytes()];
        let mut frames = Vec::new();
        for _ in 0..5 {
            let n = enc.encode(&pcm, &mut out).unwrap();
            frames.push(out[..n].to_vec());
        }
        outputs.push(frames);
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_非零输入第四帧开始输出() {
    let mut enc = AacEncoder::open(48000, 1).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    for k in 0..4 {
        let pcm = sine_frame(48000, 440.0, 8000.0, k * FRAME, 1);
        let n = enc.encode(&pcm, &mut out).unwrap();
        if k < 3 {
            assert_eq!(n, 0, "第 {} 次调用应处于填充阶段", k + 1);
            assert_eq!(enc.state(), SessionState::Filling);
        } else {
            assert!(n > 0);
            assert_eq!(enc.state(), SessionState::Steady);
        }
    }
}

#[test]
fn test_连续四次空输入后终止() {
    let mut enc = AacEncoder::open(44100, 2).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    for _ in 0..4 {
        assert_eq!(enc.encode(&[], &mut out).unwrap(), 0);
    }
    assert_eq!(enc.state(), SessionState::Terminated);
    assert_eq!(enc.encode(&[], &mut out).unwrap(), 0);
    assert_eq!(enc.encode(&[0; 4], &mut out).unwrap(), 0);
}

#[test]
fn test_冲刷输出缓冲帧() {
    let mut enc = AacEncoder::open(44100, 1).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let mut produced = 0;
    for k in 0..6 {
        let pcm = sine_frame(44100, 1000.0, 6000.0, k * FRAME, 1);
        if enc.encode(&pcm, &mut out).unwrap() > 0 {
            produced += 1;
        }
    }
    assert_eq!(produced, 3);

    let mut flushed = Vec::new();
    while enc.state() != SessionState::Terminated {
        flushed.push(enc.encode(&[], &mut out).unwrap());
    }
    // 前三次空输入输出前瞻缓冲中剩余的三帧, 第四次终止
    assert_eq!(flushed.len(), 4);
    assert!(flushed[..3].iter().all(|&n| n > 0));
    assert_eq!(flushed[3], 0);
}

#[test]
fn test_不足一帧的输入补零() {
    let mut enc = AacEncoder::open(44100, 2).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let short = vec![100i16; 300 * 2];
    for _ in 0..3 {
        assert_eq!(enc.encode(&short, &mut out).unwrap(), 0);
    }
    assert!(enc.encode(&short, &mut out).unwrap() > 0);
}

// ============================================================
// 参数与错误
// ============================================================

#[test]
fn test_无效参数() {
    assert!(matches!(
        AacEncoder::open(0, 1),
        Err(TaoError::InvalidArgument(_))
    ));
    assert!(matches!(
        AacEncoder::open(44100, 0),
        Err(TaoError::InvalidArgument(_))
    ));
    assert!(matches!(
        AacEncoder::open(44100, 9),
        Err(TaoError::InvalidArgument(_))
    ));

    let mut enc = AacEncoder::open(44100, 2).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    assert!(matches!(
        enc.encode(&[0; 3], &mut out),
        Err(TaoError::InvalidArgument(_))
    ));
    assert!(matches!(
        enc.encode(&vec![0; FRAME * 2 + 2], &mut out),
        Err(TaoError::InvalidArgument(_))
    ));
    assert!(enc
        .set_configuration(EncoderConfig {
            bit_rate: 0,
            ..EncoderConfig::default()
        })
        .is_err());
}

#[test]
fn test_非标准采样率就近匹配() {
    let mut enc = AacEncoder::open(44000, 1).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let pcm = vec![0i16; FRAME];
    let mut n = 0;
    for _ in 0..4 {
        n = enc.encode(&pcm, &mut out).unwrap();
    }
    let (sr_index, channel_config, _) = parse_adts_header(&out[..n]);
    assert_eq!(sr_index, 4, "44000 Hz 应映射到 44100 Hz");
    assert_eq!(channel_config, 1);
}

#[test]
fn test_输出缓冲不足不写入() {
    let mut enc = AacEncoder::open(44100, 2).unwrap();
    let pcm = vec![0i16; FRAME * 2];
    let mut big = vec![0u8; enc.max_frame_bytes()];
    for _ in 0..3 {
        enc.encode(&pcm, &mut big).unwrap();
    }

    let mut small = [0xAAu8; 4];
    match enc.encode(&pcm, &mut small) {
        Err(TaoError::BufferTooSmall { needed, capacity }) => {
            assert!(needed > 4);
            assert_eq!(capacity, 4);
        }
        other => panic!("应返回 BufferTooSmall, 实际 {:?}", other),
    }
    assert_eq!(small, [0xAA; 4], "容量不足时不应写入任何数据");

    assert!(enc.encode(&pcm, &mut big).unwrap() > 0);
}

// ============================================================
// 码流
// ============================================================

#[test]
fn test_adts_帧头字段() {
    let mut enc = AacEncoder::open(48000, 2).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let mut n = 0;
    for k in 0..4 {
        let pcm = sine_frame(48000, 440.0, 4000.0, k * FRAME, 2);
        n = enc.encode(&pcm, &mut out).unwrap();
    }
    let (sr_index, channel_config, frame_len) = parse_adts_header(&out[..n]);
    assert_eq!(sr_index, 3);
    assert_eq!(channel_config, 2);
    assert_eq!(frame_len, n);
}

#[test]
fn test_多声道帧头与_lfe() {
    let mut enc = AacEncoder::open(48000, 6).unwrap();
    enc.set_configuration(EncoderConfig {
        use_lfe: true,
        ..enc.configuration()
    })
    .unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let mut n = 0;
    for k in 0..8 {
        let mut pcm = sine_frame(48000, 300.0, 3000.0, k * FRAME, 6);
        if k == 4 {
            for ch in 0..6 {
                pcm[700 * 6 + ch] = 30000;
            }
        }
        n = enc.encode(&pcm, &mut out).unwrap();
        if let Some(stats) = enc.last_frame() {
            assert_eq!(stats.block_types[5], BlockType::OnlyLong, "LFE 始终为长块");
            assert_eq!(stats.ms_used.len(), 2);
        }
    }
    let (_, channel_config, frame_len) = parse_adts_header(&out[..n]);
    assert_eq!(channel_config, 6);
    assert_eq!(frame_len, n);
}

#[test]
fn test_八声道映射为配置七() {
    let mut enc = AacEncoder::open(48000, 8).unwrap();
    enc.set_configuration(EncoderConfig {
        use_lfe: true,
        ..enc.configuration()
    })
    .unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let pcm = vec![0i16; FRAME * 8];
    let mut n = 0;
    for _ in 0..4 {
        n = enc.encode(&pcm, &mut out).unwrap();
    }
    let (_, channel_config, _) = parse_adts_header(&out[..n]);
    assert_eq!(channel_config, 7);
}

#[test]
fn test_无_lfe_的六声道写入_pce() {
    let mut enc = AacEncoder::open(48000, 6).unwrap();
    assert!(!enc.configuration().use_lfe);
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let pcm = vec![0i16; FRAME * 6];
    let mut n = 0;
    for _ in 0..4 {
        n = enc.encode(&pcm, &mut out).unwrap();
    }
    let (sr_index, channel_config, frame_len) = parse_adts_header(&out[..n]);
    assert_eq!(channel_config, 0, "布局不含 LFE, 不能声明配置 6");
    assert_eq!(frame_len, n);
    // raw_data_block 以 PCE (id_syn_ele = 5) 开头, 采样率索引与帧头一致
    assert_eq!(out[7] >> 5, 5);
    assert_eq!((out[8] >> 3) & 0x0F, sr_index);
    assert_eq!(((out[8] & 0x07) << 1) | (out[9] >> 7), 4, "四个前置元素");
}

// ============================================================
// 块切换与中侧
// ============================================================

#[test]
fn test_瞬态触发块切换序列() {
    let mut enc = AacEncoder::open(44100, 1).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let mut types = Vec::new();

    for k in 0..14 {
        let mut pcm = sine_frame(44100, 200.0, 100.0, k * FRAME, 1);
        if k == 6 {
            for s in &mut pcm[600..616] {
                *s = 20000;
            }
        }
        if enc.encode(&pcm, &mut out).unwrap() > 0 {
            types.push(enc.last_frame().unwrap().block_types[0]);
        }
    }

    assert_eq!(types[0], BlockType::OnlyLong);
    let start = types
        .iter()
        .position(|&t| t == BlockType::LongToShort)
        .expect("瞬态应触发 LongToShort");
    assert!(types[..start].iter().all(|&t| t == BlockType::OnlyLong));
    assert_eq!(types[start + 1], BlockType::OnlyShort);
    let end = types[start + 1..]
        .iter()
        .position(|&t| t == BlockType::ShortToLong)
        .map(|p| p + start + 1)
        .expect("瞬态之后应回到长块");
    assert!(types[start + 1..end].iter().all(|&t| t == BlockType::OnlyShort));
    for pair in types.windows(2) {
        let illegal = pair[0] == BlockType::OnlyLong && pair[1] == BlockType::OnlyShort;
        assert!(!illegal, "长块不能直接切换到短块: {:?}", types);
    }
}

#[test]
fn test_相关立体声使用中侧() {
    let mut enc = AacEncoder::open(44100, 2).unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let mut ms = Vec::new();
    for k in 0..8 {
        let pcm = sine_frame(44100, 1000.0, 8000.0, k * FRAME, 2);
        if enc.encode(&pcm, &mut out).unwrap() > 0 {
            ms.push(enc.last_frame().unwrap().ms_used[0]);
        }
    }
    assert!(ms.iter().all(|&m| m), "左右声道相同时应选择中侧编码: {:?}", ms);
}

#[test]
fn test_禁用中侧强制独立() {
    let mut enc = AacEncoder::open(44100, 2).unwrap();
    enc.set_configuration(EncoderConfig {
        allow_midside: false,
        ..enc.configuration()
    })
    .unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    for k in 0..8 {
        let pcm = sine_frame(44100, 1000.0, 8000.0, k * FRAME, 2);
        if enc.encode(&pcm, &mut out).unwrap() > 0 {
            assert_eq!(enc.last_frame().unwrap().ms_used, vec![false]);
        }
    }
}

// ============================================================
// 码率控制
// ============================================================

#[test]
fn test_稳态正弦不超预算() {
    let mut enc = AacEncoder::open(44100, 1).unwrap();
    let budget = enc.frame_budget_bits();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    for k in 0..10 {
        let pcm = sine_frame(44100, 1000.0, 8000.0, k * FRAME, 1);
        let n = enc.encode(&pcm, &mut out).unwrap();
        if n > 0 {
            let stats = enc.last_frame().unwrap();
            assert!(!stats.overrun, "第 {} 帧超出预算", stats.frame_number);
            assert!(n * 8 <= budget, "{} 字节超出 {} 位预算", n, budget);
            assert_eq!(stats.budget_bits, budget);
        }
    }
}

#[test]
fn test_中侧编码用满帧预算() {
    let mut enc = AacEncoder::open(44100, 2).unwrap();
    let budget = enc.frame_budget_bits();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let mut seed = 12345u32;
    let mut used = Vec::new();
    for _ in 0..20 {
        let pcm = noise_frame(&mut seed, 8000.0, 2);
        if enc.encode(&pcm, &mut out).unwrap() > 0 {
            let stats = enc.last_frame().unwrap();
            assert_eq!(stats.ms_used, vec![true], "左右相同的噪声应选择中侧编码");
            used.push(stats.used_bits);
        }
    }
    let average = used.iter().sum::<usize>() as f64 / used.len() as f64;
    assert!(
        average >= 0.9 * budget as f64,
        "中侧编码只用了 {:.0} / {} 位",
        average,
        budget,
    );
}

#[test]
fn test_极低码率报告超限() {
    let mut enc = AacEncoder::open(44100, 1).unwrap();
    enc.set_configuration(EncoderConfig {
        bit_rate: 1000,
        ..enc.configuration()
    })
    .unwrap();
    let mut out = vec![0u8; enc.max_frame_bytes()];
    let mut n = 0;
    for k in 0..4 {
        let pcm = sine_frame(44100, 1000.0, 8000.0, k * FRAME, 1);
        n = enc.encode(&pcm, &mut out).unwrap();
    }
    assert!(n > 0, "超出预算时仍应输出帧");
    let stats = enc.last_frame().unwrap();
    assert!(stats.overrun);
    assert!(stats.used_bits > stats.budget_bits);
}

#[test]
fn test_码率越高帧越大() {
    let mut totals = Vec::new();
    for bit_rate in [32000, 128000] {
        let mut enc = AacEncoder::open(44100, 1).unwrap();
        enc.set_configuration(EncoderConfig {
            bit_rate,
            ..enc.configuration()
        })
        .unwrap();
        let mut out = vec![0u8; enc.max_frame_bytes()];
        let mut total = 0;
        for k in 0..10 {
            // 宽带信号: 多个正弦叠加
            let mut pcm = vec![0i16; FRAME];
            for (i, s) in pcm.iter_mut().enumerate() {
                let t = (k * FRAME + i) as f64 / 44100.0;
                let v: f64 = [300.0, 1700.0, 4100.0, 9000.0]
                    .iter()
                    .map(|f| 3000.0 * (t * f * 2.0 * std::f64::consts::PI).sin())
                    .sum();
                *s = v as i16;
            }
            total += enc.encode(&pcm, &mut out).unwrap();
        }
        totals.push(total);
    }
    assert!(totals[1] > totals[0], "码率统计: {:?}", totals);
}

#[test]
fn test_配置_json_解析() {
    let config: EncoderConfig =
        serde_json::from_str(r#"{"allow_midside": false, "use_lfe": true, "bit_rate": 320000}"#)
            .unwrap();
    assert_eq!(
        config,
        EncoderConfig {
            allow_midside: false,
            use_lfe: true,
            bit_rate: 320000,
        }
    );
    let text = serde_json::to_string(&config).unwrap();
    assert!(text.contains("\"bit_rate\":320000"));
}
