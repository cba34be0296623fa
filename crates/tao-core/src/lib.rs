//! # tao-core
//!
//! Tao AAC 编码器核心库, 提供错误类型与比特流写入基础设施.
//!
//! 编码器 crate 与门面 crate 共用这里的类型.

pub mod bitwriter;
pub mod error;

// 重导出常用类型
pub use bitwriter::{BitCounter, BitSink, BitWriter};
pub use error::{TaoError, TaoResult};
