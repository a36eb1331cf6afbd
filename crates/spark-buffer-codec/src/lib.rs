//! `spark-buffer-codec`: a push-style DEFLATE/Zlib/Gzip streaming codec
//! (spec §4.7).
//!
//! # 设计背景（Why）
//! 教师仓库的编解码 crate（`spark-codec-sip`）解决的是"定长/带长度前缀的
//! 消息帧"问题，不涉及真正的压缩算法；本 crate 转而围绕 `flate2`
//! 的底层推送式 API（`Compress`/`Decompress`）构建一套和教师仓库编码器
//! 同构的状态机（`Init → Running → Finishing/Draining → Done → Closed`），
//! 输出缓冲区经由可插拔的 [`format::Allocator`] 分配，呼应 §6.1 的"输出
//! 归属可配置"契约，也呼应 `spark-buffer::pool` 已经建立的"调用方决定缓冲
//! 来自哪里"的设计语言。
//!
//! # 模块
//! - [`format`]：wire 格式标签与 `Allocator` 分配器接口。
//! - [`encoder`]：`DeflateEncoder` 状态机（压缩侧）。
//! - [`decoder`]：`DeflateDecoder` 状态机与 gzip 头部逐字节解析器（解压侧）。
//! - [`sync_flush`]：sync-flush marker 的 strip/append 工具。
//! - [`suspending`]：把回调式输出收集为列表的 suspending 门面。

pub mod decoder;
pub mod encoder;
pub mod format;
pub mod suspending;
pub mod sync_flush;

pub use decoder::{DecoderOptions, DecoderState, DeflateDecoder};
pub use encoder::{DeflateEncoder, EncoderOptions, EncoderState};
pub use format::{Allocator, DirectAllocator, Format, HeapAllocator, PoolAllocator};
pub use spark_buffer::error::{BufferError, Result};
pub use suspending::{SuspendingDecoder, SuspendingEncoder};
pub use sync_flush::{append_sync_flush_marker, strip_sync_flush_marker, SYNC_FLUSH_MARKER};
