//! `spark-buffer-stream` 把 `spark-buffer` 的 `Buffer` 契约接到分片字节流上。
//!
//! # 模块定位（Why）
//! - `stream` 落地 `StreamProcessor`：一个惰性的分片聚合队列，允许跨块
//!   peek/read/slice，零拷贝路径优先。
//! - `refill` 在 `stream` 之上包一层自动补给：读取方只管声明自己需要多少
//!   字节，补给回调负责把更多分片塞进队列，直到需求满足或流结束。
//!
//! 两者都只依赖 `spark-buffer::Buffer` 这一个抽象，不关心分片背后是堆内存、
//! 池化缓冲还是原生地址——这正是分片流存在的意义：把"多段异构存储"统一成
//! 一条逻辑字节序列。

pub mod refill;
pub mod stream;

pub use refill::{AutoRefillStream, RefillOutcome, RefillSource};
pub use spark_buffer::error::{BufferError, Result};
pub use stream::{ReadBuffer, StreamProcessor};
