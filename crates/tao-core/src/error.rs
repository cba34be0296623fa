//! 统一错误类型定义.
//!
//! 编码器各模块共用的错误类型, 支持跨 crate 传播.

use thiserror::Error;

/// Tao 编码器统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 输出缓冲区容量不足, 当前帧未写入任何数据
    #[error("输出缓冲区不足: 需要 {needed} 字节, 容量 {capacity} 字节")]
    BufferTooSmall {
        /// 本帧需要的字节数
        needed: usize,
        /// 调用方提供的容量
        capacity: usize,
    },

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Tao 编码器统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;

impl From<std::collections::TryReserveError> for TaoError {
    fn from(err: std::collections::TryReserveError) -> Self {
        TaoError::OutOfMemory(err.to_string())
    }
}
