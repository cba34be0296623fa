//! # Tao AAC
//!
//! 纯 Rust 实现的心理声学 AAC-LC 编码器.
//!
//! 输入交错 16 位 PCM, 每帧 1024 个采样/声道, 输出 ADTS 封装的 AAC-LC 帧.
//! 编码器带 3 帧前瞻, 支持长短块切换、中侧立体声与逐帧码率控制.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tao_aac::{AacEncoder, SessionState};
//!
//! let mut encoder = AacEncoder::open(44100, 2)?;
//! let mut out = vec![0u8; encoder.max_frame_bytes()];
//! let pcm = vec![0i16; 1024 * 2];
//! let _ = encoder.encode(&pcm, &mut out)?;
//! // 输入结束后以空切片冲刷, 直到会话终止
//! while encoder.state() != SessionState::Terminated {
//!     let _ = encoder.encode(&[], &mut out)?;
//! }
//! # Ok::<(), tao_aac::core::TaoError>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 错误类型与比特流写入 |
//! | `tao-aacenc` | AAC-LC 编码器 |

pub mod logging;

/// 核心类型与工具
pub use tao_core as core;

/// AAC-LC 编码器
pub use tao_aacenc as aacenc;

pub use tao_aacenc::{
    AacEncoder, BlockType, EncoderConfig, FrameStats, SessionState, WindowShape,
};

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
