//! 统一错误类型：覆盖缓冲、批量操作与缓冲池三个组件抛出的全部错误种类。
//!
//! # 设计背景（Why）
//! `spark-core` 为跨服务场景维护了一套带错误码的 `CoreError`；本 crate 不参与
//! 跨服务错误码体系，因此坍缩为单一扁平枚举，用 `thiserror` 生成
//! `Display`/`Error` 实现，字段保留足够上下文用于日志与测试断言。

use alloc::string::String;

/// 缓冲、批量操作与缓冲池统一抛出的错误类型。
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// 读取/`available` 所需字节数超过剩余（或可用）字节数。
    #[error("underflow: requested {requested} bytes but only {available} available")]
    Underflow {
        requested: usize,
        available: usize,
    },

    /// 写入超过 `limit` 或 `capacity`。
    #[error("overflow: writing {requested} bytes exceeds {limit} remaining capacity")]
    Overflow { requested: usize, limit: usize },

    /// 索引或长度参数越界。
    #[error("out of range: value {value} not in [{min}, {max}]")]
    OutOfRange {
        value: usize,
        min: usize,
        max: usize,
    },

    /// REPORT 策略下遇到非法 UTF-8 字节序列。
    #[error("malformed text at byte offset {offset}")]
    MalformedText { offset: usize },

    /// 压缩数据损坏、截断，或 gzip 魔数/标志位非法。
    #[error("malformed compressed data: {reason}")]
    MalformedCompressedData { reason: String },

    /// 编解码器要求预设字典，核心不支持。
    #[error("stream requires a preset dictionary, which is unsupported")]
    NeedDictionary,

    /// 补充回调在满足需求前报告了流结束。
    #[error("end of stream before demand of {demand} bytes was met")]
    EndOfStream { demand: usize },

    /// 挂起操作被取消。
    #[error("operation cancelled")]
    Cancelled,

    /// 对已释放/已关闭资源的操作。
    #[error("operation on a closed resource")]
    Closed,

    /// 当前存储类型不提供所请求的能力（例如对 Fragmented 缓冲取原始地址）。
    #[error("unsupported capability for this storage flavor: {capability}")]
    Unsupported { capability: &'static str },
}

pub type Result<T> = core::result::Result<T, BufferError>;
