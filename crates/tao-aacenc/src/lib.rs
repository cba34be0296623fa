//! # tao-aacenc
//!
//! 心理声学 AAC-LC 编码器.
//!
//! 输入交错 16 位 PCM, 每次调用输出一个完整的 ADTS 帧.
//! 处理流程: 前瞻缓冲 -> 心理声学模型 -> 块切换 -> MDCT 滤波器组
//! -> 中侧立体声 -> 量化与码率控制 -> 码流写入.

pub mod bitstream;
pub mod channels;
pub mod coder;
pub mod encoder;
pub mod fft;
pub mod filterbank;
pub mod huffman;
pub mod lookahead;
pub mod midside;
pub mod psych;
pub mod quantize;
pub mod sr_info;

pub use coder::{BlockType, WindowShape};
pub use encoder::{AacEncoder, EncoderConfig, FRAME_LEN, FrameStats, SessionState};
