//! 声道到语法元素 (SCE / CPE / LFE) 的映射.
//!
//! 单声道为一个 SCE, 双声道为一个 CPE; 更多声道时先放中置 SCE,
//! 其余两两组成 CPE, 剩下的一个声道在启用 LFE 时作为 LFE, 否则作为 SCE.
//! 1..=5 声道不含 LFE, 6 与 8 声道含 LFE 时, 该布局与 ADTS
//! channel_configuration 1..=7 的默认排列一致; 其余组合由码流写入 PCE.

/// 单声道元素 (SCE) 的 id_syn_ele
pub const ID_SCE: u32 = 0;
/// 声道对元素 (CPE) 的 id_syn_ele
pub const ID_CPE: u32 = 1;
/// 低频效果元素 (LFE) 的 id_syn_ele
pub const ID_LFE: u32 = 3;
/// 节目配置元素 (PCE) 的 id_syn_ele
pub const ID_PCE: u32 = 5;
/// 结束标记 (END) 的 id_syn_ele
pub const ID_END: u32 = 7;

/// 一个语法元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelElement {
    /// 单声道
    Single { channel: usize, tag: u32 },
    /// 声道对, `ms_used` 为中侧编码决定
    Pair {
        left: usize,
        right: usize,
        tag: u32,
        ms_used: bool,
    },
    /// 低频效果声道
    Lfe { channel: usize, tag: u32 },
}

impl ChannelElement {
    /// id_syn_ele
    pub fn id(&self) -> u32 {
        match self {
            ChannelElement::Single { .. } => ID_SCE,
            ChannelElement::Pair { .. } => ID_CPE,
            ChannelElement::Lfe { .. } => ID_LFE,
        }
    }

    /// 元素包含的声道数
    pub fn channel_count(&self) -> usize {
        match self {
            ChannelElement::Pair { .. } => 2,
            ChannelElement::Single { .. } | ChannelElement::Lfe { .. } => 1,
        }
    }

    /// element_instance_tag
    pub fn tag(&self) -> u32 {
        match *self {
            ChannelElement::Single { tag, .. }
            | ChannelElement::Pair { tag, .. }
            | ChannelElement::Lfe { tag, .. } => tag,
        }
    }
}

/// 按声道数与 LFE 配置构建元素列表
pub fn build_elements(channels: usize, use_lfe: bool) -> Vec<ChannelElement> {
    let mut elements = Vec::with_capacity(channels / 2 + 2);
    let mut sce_tag = 0;
    let mut cpe_tag = 0;
    let mut next = 0;

    if channels != 2 && channels > 0 {
        elements.push(ChannelElement::Single {
            channel: 0,
            tag: sce_tag,
        });
        sce_tag += 1;
        next = 1;
    }

    while channels - next >= 2 {
        elements.push(ChannelElement::Pair {
            left: next,
            right: next + 1,
            tag: cpe_tag,
            ms_used: false,
        });
        cpe_tag += 1;
        next += 2;
    }

    if next < channels {
        elements.push(if use_lfe {
            ChannelElement::Lfe {
                channel: next,
                tag: 0,
            }
        } else {
            ChannelElement::Single {
                channel: next,
                tag: sce_tag,
            }
        });
    }

    elements
}

/// 每个声道是否为 LFE
pub fn lfe_mask(elements: &[ChannelElement], channels: usize) -> Vec<bool> {
    let mut mask = vec![false; channels];
    for element in elements {
        if let ChannelElement::Lfe { channel, .. } = *element {
            mask[channel] = true;
        }
    }
    mask
}
