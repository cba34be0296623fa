//! AAC-LC 码流写入: ADTS 帧头 + raw_data_block.
//!
//! 所有写入函数面向 [`BitSink`]: 码率控制用 [`BitCounter`] 统计位数,
//! 最终输出用 `BitWriter` 写入, 两条路径完全一致.
//!
//! raw_data_block 中元素顺序与 [`build_elements`](crate::channels::build_elements)
//! 给出的顺序一致, 以 END 结束并做字节对齐. 元素布局不符合任何标准
//! channel_configuration 时, 帧头写配置 0, 并在元素前写入 PCE 描述布局.

use tao_core::{BitCounter, BitSink};

use crate::channels::{ChannelElement, ID_END, ID_PCE};
use crate::coder::{BlockType, CoderInfo, ZERO_HCB};
use crate::huffman;

/// ADTS 帧头字节数 (protection_absent = 1)
pub const ADTS_HEADER_BYTES: usize = 7;
/// ADTS frame_length 字段上限 (13 位)
pub const MAX_ADTS_FRAME_BYTES: usize = (1 << 13) - 1;

const ADTS_SYNCWORD: u32 = 0xFFF;
/// profile = audio object type - 1, AAC LC
const PROFILE_LC: u32 = 1;
/// VBR 码流的 adts_buffer_fullness
const BUFFER_FULLNESS_VBR: u32 = 0x7FF;

/// 长块 section 长度字段位数
const SECT_BITS_LONG: u32 = 5;
/// 短块 section 长度字段位数
const SECT_BITS_SHORT: u32 = 3;

/// PCE 中的 object_type (AAC LC)
const PCE_OBJECT_TYPE_LC: u32 = 1;

/// ADTS channel_configuration
///
/// 布局与标准配置一致时返回 1..=7 (8 声道为 7), 否则返回 0.
/// 配置 6 与 7 要求末尾为 LFE, 其余配置不含 LFE.
pub fn channel_configuration(elements: &[ChannelElement]) -> u32 {
    let channels: usize = elements.iter().map(|e| e.channel_count()).sum();
    let has_lfe = elements
        .iter()
        .any(|e| matches!(e, ChannelElement::Lfe { .. }));
    match (channels, has_lfe) {
        (1..=5, false) => channels as u32,
        (6, true) => 6,
        (8, true) => 7,
        _ => 0,
    }
}

/// 写入 ADTS 帧头, `frame_bytes` 为包含帧头在内的整帧长度
pub fn write_adts_header<S: BitSink>(
    sink: &mut S,
    sr_index: usize,
    channel_config: u32,
    frame_bytes: usize,
) {
    sink.put_bits(ADTS_SYNCWORD, 12);
    sink.put_bit(false); // ID: MPEG-4
    sink.put_bits(0, 2); // layer
    sink.put_bit(true); // protection_absent
    sink.put_bits(PROFILE_LC, 2);
    sink.put_bits(sr_index as u32, 4);
    sink.put_bit(false); // private_bit
    sink.put_bits(channel_config, 3);
    sink.put_bit(false); // original_copy
    sink.put_bit(false); // home
    sink.put_bit(false); // copyright_identification_bit
    sink.put_bit(false); // copyright_identification_start
    sink.put_bits(frame_bytes as u32, 13);
    sink.put_bits(BUFFER_FULLNESS_VBR, 11);
    sink.put_bits(0, 2); // number_of_raw_data_blocks_in_frame - 1
}

/// ics_info
pub fn write_ics_info<S: BitSink>(sink: &mut S, coder: &CoderInfo) {
    sink.put_bit(false); // ics_reserved_bit
    sink.put_bits(coder.block_type.window_sequence(), 2);
    sink.put_bit(coder.window_shape.bit());
    match coder.block_type {
        BlockType::OnlyShort => {
            sink.put_bits(coder.max_sfb as u32, 4);
            sink.put_bits(coder.scale_factor_grouping(), 7);
        }
        BlockType::OnlyLong | BlockType::LongToShort | BlockType::ShortToLong => {
            sink.put_bits(coder.max_sfb as u32, 6);
            sink.put_bit(false); // predictor_data_present
        }
    }
}

/// section_data
pub fn write_section_data<S: BitSink>(sink: &mut S, coder: &CoderInfo) {
    let sect_bits = if coder.block_type.is_short() {
        SECT_BITS_SHORT
    } else {
        SECT_BITS_LONG
    };
    let esc = (1u32 << sect_bits) - 1;
    for section in &coder.sections {
        sink.put_bits(u32::from(section.book), 4);
        let mut len = section.len as u32;
        while len >= esc {
            sink.put_bits(esc, sect_bits);
            len -= esc;
        }
        sink.put_bits(len, sect_bits);
    }
}

/// scale_factor_data: 非零码本频带的缩放因子差分, 起点为 global_gain
pub fn write_scale_factor_data<S: BitSink>(sink: &mut S, coder: &CoderInfo) {
    let mut last = coder.global_gain;
    for g in 0..coder.num_window_groups {
        for sfb in 0..coder.max_sfb {
            let idx = g * coder.nr_of_sfb + sfb;
            if coder.book[idx] == ZERO_HCB {
                continue;
            }
            let sf = coder.scale_factor[idx];
            huffman::write_scalefactor(sink, sf - last);
            last = sf;
        }
    }
}

/// spectral_data: 按 窗组 -> 分段 -> 频带 -> 组内窗 的顺序写入
pub fn write_spectral_data<S: BitSink>(sink: &mut S, coder: &CoderInfo) {
    let lines = coder.window_lines();
    for section in &coder.sections {
        if section.book == ZERO_HCB {
            continue;
        }
        let first_window = coder.group_start_window(section.group);
        let windows = coder.window_group_length[section.group];
        for sfb in section.start..section.start + section.len {
            for w in first_window..first_window + windows {
                let start = w * lines + coder.sfb_offset[sfb];
                let end = w * lines + coder.sfb_offset[sfb + 1];
                huffman::write_band(sink, section.book, &coder.quantized[start..end]);
            }
        }
    }
}

/// 单声道可变部分 (section + scalefactor + spectral) 的位数
pub fn payload_bits(coder: &CoderInfo) -> usize {
    let mut counter = BitCounter::new();
    write_section_data(&mut counter, coder);
    write_scale_factor_data(&mut counter, coder);
    write_spectral_data(&mut counter, coder);
    counter.bits_written()
}

/// individual_channel_stream
fn write_ics<S: BitSink>(sink: &mut S, coder: &CoderInfo, common_window: bool, payload: bool) {
    sink.put_bits(coder.global_gain.clamp(0, 255) as u32, 8);
    if !common_window {
        write_ics_info(sink, coder);
    }
    if payload {
        write_section_data(sink, coder);
        write_scale_factor_data(sink, coder);
    }
    sink.put_bit(false); // pulse_data_present
    sink.put_bit(false); // tns_data_present
    sink.put_bit(false); // gain_control_data_present
    if payload {
        write_spectral_data(sink, coder);
    }
}

/// 声道对能否共用 ics_info
fn shares_window(left: &CoderInfo, right: &CoderInfo) -> bool {
    left.block_type == right.block_type
        && left.window_shape == right.window_shape
        && left.max_sfb == right.max_sfb
        && left.num_window_groups == right.num_window_groups
        && left.window_group_length == right.window_group_length
}

fn write_element_inner<S: BitSink>(
    sink: &mut S,
    element: &ChannelElement,
    coders: &[CoderInfo],
    payload: bool,
) {
    sink.put_bits(element.id(), 3);
    sink.put_bits(element.tag(), 4);
    match *element {
        ChannelElement::Single { channel, .. } | ChannelElement::Lfe { channel, .. } => {
            write_ics(sink, &coders[channel], false, payload);
        }
        ChannelElement::Pair {
            left,
            right,
            ms_used,
            ..
        } => {
            let common = shares_window(&coders[left], &coders[right]);
            sink.put_bit(common);
            if common {
                write_ics_info(sink, &coders[left]);
                // ms_mask_present: 2 = 所有频带使用 M/S
                sink.put_bits(if ms_used { 2 } else { 0 }, 2);
            }
            write_ics(sink, &coders[left], common, payload);
            write_ics(sink, &coders[right], common, payload);
        }
    }
}

/// 写入一个语法元素
pub fn write_element<S: BitSink>(sink: &mut S, element: &ChannelElement, coders: &[CoderInfo]) {
    write_element_inner(sink, element, coders, true);
}

/// program_config_element (含 id_syn_ele)
///
/// 非 LFE 元素全部列为前置声道, LFE 单独列出. 必须从字节边界开始写入,
/// 内部的 byte_alignment 按元素自身位数计算.
pub fn write_program_config<S: BitSink>(
    sink: &mut S,
    sr_index: usize,
    elements: &[ChannelElement],
) {
    let start = sink.bits_written();
    let front = elements
        .iter()
        .filter(|e| !matches!(e, ChannelElement::Lfe { .. }));
    let lfe = elements
        .iter()
        .filter(|e| matches!(e, ChannelElement::Lfe { .. }));

    sink.put_bits(ID_PCE, 3);
    sink.put_bits(0, 4); // element_instance_tag
    sink.put_bits(PCE_OBJECT_TYPE_LC, 2);
    sink.put_bits(sr_index as u32, 4);
    sink.put_bits(front.clone().count() as u32, 4);
    sink.put_bits(0, 4); // num_side_channel_elements
    sink.put_bits(0, 4); // num_back_channel_elements
    sink.put_bits(lfe.clone().count() as u32, 2);
    sink.put_bits(0, 3); // num_assoc_data_elements
    sink.put_bits(0, 4); // num_valid_cc_elements
    sink.put_bit(false); // mono_mixdown_present
    sink.put_bit(false); // stereo_mixdown_present
    sink.put_bit(false); // matrix_mixdown_idx_present
    for element in front {
        sink.put_bit(matches!(element, ChannelElement::Pair { .. }));
        sink.put_bits(element.tag(), 4);
    }
    for element in lfe {
        sink.put_bits(element.tag(), 4);
    }
    let pad = (8 - (sink.bits_written() - start) % 8) % 8;
    sink.put_bits(0, pad as u32);
    sink.put_bits(0, 8); // comment_field_bytes
}

/// 写入 raw_data_block (需要时的 PCE + 全部元素 + END + 字节对齐填充)
pub fn write_raw_data_block<S: BitSink>(
    sink: &mut S,
    sr_index: usize,
    elements: &[ChannelElement],
    coders: &[CoderInfo],
) {
    if channel_configuration(elements) == 0 {
        write_program_config(sink, sr_index, elements);
    }
    for element in elements {
        write_element(sink, element, coders);
    }
    sink.put_bits(ID_END, 3);
    let pad = (8 - sink.bits_written() % 8) % 8;
    sink.put_bits(0, pad as u32);
}

/// 写入完整 ADTS 帧
pub fn write_frame<S: BitSink>(
    sink: &mut S,
    sr_index: usize,
    elements: &[ChannelElement],
    coders: &[CoderInfo],
    frame_bytes: usize,
) {
    write_adts_header(sink, sr_index, channel_configuration(elements), frame_bytes);
    write_raw_data_block(sink, sr_index, elements, coders);
}

/// 整帧字节数 (含 ADTS 帧头)
pub fn frame_bytes(sr_index: usize, elements: &[ChannelElement], coders: &[CoderInfo]) -> usize {
    let mut counter = BitCounter::new();
    // 帧头占整数字节, 先计入以保证对齐位置一致
    for _ in 0..ADTS_HEADER_BYTES {
        counter.put_bits(0, 8);
    }
    write_raw_data_block(&mut counter, sr_index, elements, coders);
    counter.bits_written() / 8
}

/// 与频谱内容无关的固定开销位数: ADTS 帧头, PCE, 元素头, ics_info, 标志位,
/// END 以及最坏情况下的对齐填充
pub fn side_bits(elements: &[ChannelElement], coders: &[CoderInfo]) -> usize {
    let mut counter = BitCounter::new();
    if channel_configuration(elements) == 0 {
        // 位数与采样率索引的取值无关
        write_program_config(&mut counter, 0, elements);
    }
    for element in elements {
        write_element_inner(&mut counter, element, coders, false);
    }
    counter.put_bits(ID_END, 3);
    ADTS_HEADER_BYTES * 8 + counter.bits_written() + 7
}
