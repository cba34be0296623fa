//! 四帧前瞻缓冲.
//!
//! 每个声道持有 4 个帧长的时域缓冲, 下标 0 为最旧 (本次编码的帧),
//! 下标 3 为最新送入的帧. 心理声学模型因此能在编码前看到后面 3 帧.
//!
//! 每次送入新帧时把 4 个槽位整体左移一位, 被淘汰的最旧槽位的存储
//! 直接复用为新的最新槽位, 稳态下不再分配内存.

use crate::sr_info::LONG_LINES;

/// 前瞻深度 (槽位数)
pub const LOOKAHEAD_SLOTS: usize = 4;

/// 单声道前瞻缓冲
#[derive(Debug, Clone)]
pub struct LookaheadBuffer {
    slots: [Vec<f64>; LOOKAHEAD_SLOTS],
}

impl LookaheadBuffer {
    /// 创建全零缓冲
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| vec![0.0; LONG_LINES]),
        }
    }

    /// 从交错 PCM 中取出第 `channel` 声道的一帧送入最新槽位
    ///
    /// 不足一帧的部分补零. 返回本次要编码的帧 (最旧槽位).
    pub fn ingest(&mut self, pcm: &[i16], channel: usize, channels: usize) -> &[f64] {
        let newest = self.rotate();
        let frame_samples = (pcm.len() / channels).min(LONG_LINES);
        for (dst, frame) in newest.iter_mut().zip(pcm.chunks_exact(channels)) {
            *dst = f64::from(frame[channel]);
        }
        newest[frame_samples..].fill(0.0);
        &self.slots[0]
    }

    /// 输入已耗尽: 最新槽位填充静音
    pub fn ingest_silence(&mut self) -> &[f64] {
        self.rotate().fill(0.0);
        &self.slots[0]
    }

    /// 本次编码的帧 (延迟 3 帧)
    pub fn current(&self) -> &[f64] {
        &self.slots[0]
    }

    /// 最新送入的帧
    pub fn newest(&self) -> &[f64] {
        &self.slots[LOOKAHEAD_SLOTS - 1]
    }

    fn rotate(&mut self) -> &mut [f64] {
        self.slots.rotate_left(1);
        &mut self.slots[LOOKAHEAD_SLOTS - 1]
    }
}

impl Default for LookaheadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(value: i16, channels: usize) -> Vec<i16> {
        vec![value; LONG_LINES * channels]
    }

    #[test]
    fn test_延迟三帧输出() {
        let mut buf = LookaheadBuffer::new();
        for v in 1..=3 {
            let current = buf.ingest(&frame_of(v, 1), 0, 1);
            assert!(current.iter().all(|&s| s == 0.0), "填充阶段当前帧应为初始静音");
        }
        let current = buf.ingest(&frame_of(4, 1), 0, 1);
        assert!(current.iter().all(|&s| s == 1.0));
        assert!(buf.newest().iter().all(|&s| s == 4.0));
        assert!(buf.slots[1].iter().all(|&s| s == 2.0));
    }

    #[test]
    fn test_交错输入拆分声道() {
        let mut buf_l = LookaheadBuffer::new();
        let mut buf_r = LookaheadBuffer::new();
        let pcm: Vec<i16> = (0..8).map(|i| if i % 2 == 0 { 100 } else { -100 }).collect();
        buf_l.ingest(&pcm, 0, 2);
        buf_r.ingest(&pcm, 1, 2);
        assert_eq!(&buf_l.newest()[..4], &[100.0; 4]);
        assert_eq!(&buf_r.newest()[..4], &[-100.0; 4]);
        // 不足一帧的部分补零
        assert!(buf_l.newest()[4..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_静音填充覆盖旧数据() {
        let mut buf = LookaheadBuffer::new();
        for _ in 0..4 {
            buf.ingest(&frame_of(7, 1), 0, 1);
        }
        // 最旧槽位的存储被复用为最新槽位, 必须被清零
        buf.ingest_silence();
        assert!(buf.newest().iter().all(|&s| s == 0.0));
        assert!(buf.current().iter().all(|&s| s == 7.0));
    }
}
