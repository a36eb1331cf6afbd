//! The compressor side of the DEFLATE/GZIP state machine (spec §4.7.1).
//!
//! # 设计背景（Why）
//! 语料库里没有现成的推送式压缩器，但 `rust-lang/flate2` 本身就在
//! `other_examples` 检索包里（`flate2-rs__src-gz-bufread.rs` 等），其
//! `Compress`/`Decompress` 底层 API 正是"喂一点输入、吐一点输出"的推送式
//! 形状，比 `flate2` 自带的 `Read`/`Write` 包装器更贴合 spec §4.7 的契约
//! （后者假定独占一整条流的所有权）。Gzip 的 10 字节头/8 字节尾都是手写的，
//! 因为 spec §4.7.2 要求头部解析能在任意分片边界处暂停续传，
//! `flate2::GzDecoder` 的同步 `Read` 式头部解析做不到这一点——但
//! `crc32fast`（本来就是 `flate2` 的直接依赖）可以照常复用来算运行 CRC32。

use std::sync::Arc;

use flate2::{Compress, Compression, FlushCompress, Status};

use spark_buffer::buf::Buffer;
use spark_buffer::error::{BufferError, Result};
use spark_buffer::order::ByteOrder;
use spark_buffer::SparkBuffer;

use crate::format::{Allocator, Format, HeapAllocator};

/// Encoder lifecycle (spec §4.7.1): `Init -> Running -> Finishing -> Done`,
/// with `Closed` reachable from any state via `close()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Init,
    Running,
    Finishing,
    Done,
    Closed,
}

/// Construction knobs (ambient config surface — ties to spec §6.1's
/// allocator seam and §4.7.1's "configurable: default 32 KiB").
pub struct EncoderOptions {
    pub format: Format,
    pub level: Compression,
    pub output_buffer_size: usize,
    pub allocator: Arc<dyn Allocator>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        EncoderOptions {
            format: Format::RawDeflate,
            level: Compression::default(),
            output_buffer_size: 32 * 1024,
            allocator: Arc::new(HeapAllocator),
        }
    }
}

/// A callback the encoder hands finished output buffers to. Matches spec
/// §4.7.1's "sync variant" (the suspending façade in `suspending.rs` adapts
/// this into a collected list).
pub type Emit<'a> = dyn FnMut(Box<dyn Buffer>) -> Result<()> + 'a;

/// Push-style DEFLATE/Zlib/Gzip compressor (spec §4.7.1).
pub struct DeflateEncoder {
    state: EncoderState,
    ctx: Compress,
    format: Format,
    allocator: Arc<dyn Allocator>,
    output_buffer_size: usize,
    crc: Option<crc32fast::Hasher>,
    total_in: u64,
}

impl DeflateEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        let zlib_header = options.format == Format::Zlib;
        DeflateEncoder {
            state: EncoderState::Init,
            ctx: Compress::new(options.level, zlib_header),
            format: options.format,
            allocator: options.allocator,
            output_buffer_size: options.output_buffer_size,
            crc: None,
            total_in: 0,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == EncoderState::Closed {
            return Err(BufferError::Closed);
        }
        Ok(())
    }

    fn enter_running(&mut self, emit: &mut Emit<'_>) -> Result<()> {
        if self.state == EncoderState::Init {
            if self.format == Format::Gzip {
                let mut header = self.allocator.allocate(10)?;
                write_gzip_header(header.as_mut())?;
                emit(header)?;
                self.crc = Some(crc32fast::Hasher::new());
                self.total_in = 0;
            }
            self.state = EncoderState::Running;
        }
        Ok(())
    }

    /// Feeds `input` to the codec, emitting output buffers as they fill
    /// (spec `compress(chunk)`).
    pub fn compress(&mut self, input: &mut dyn Buffer, emit: &mut Emit<'_>) -> Result<()> {
        self.ensure_open()?;
        self.enter_running(emit)?;
        self.drain_input(input, emit)
    }

    /// Forces a `Z_SYNC_FLUSH` block; output ends with `00 00 FF FF`
    /// (spec `flush()`).
    pub fn flush(&mut self, emit: &mut Emit<'_>) -> Result<()> {
        self.ensure_open()?;
        self.enter_running(emit)?;
        let mut empty = SparkBuffer::allocate(0);
        loop {
            let (consumed, produced, _status) =
                self.run_once(&mut empty, FlushCompress::Sync, emit)?;
            if consumed == 0 && produced == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Closes input and drains the codec; for Gzip, appends the 8-byte
    /// trailer once draining completes (spec `finish()`).
    pub fn finish(&mut self, emit: &mut Emit<'_>) -> Result<()> {
        self.ensure_open()?;
        self.enter_running(emit)?;
        self.state = EncoderState::Finishing;
        let mut empty = SparkBuffer::allocate(0);
        loop {
            let (consumed, produced, status) =
                self.run_once(&mut empty, FlushCompress::Finish, emit)?;
            if matches!(status, Status::StreamEnd) || (consumed == 0 && produced == 0) {
                break;
            }
        }
        if self.format == Format::Gzip {
            let crc = self.crc.take().map(|h| h.finalize()).unwrap_or(0);
            let mut trailer = self.allocator.allocate(8)?;
            write_gzip_trailer(trailer.as_mut(), crc, self.total_in)?;
            emit(trailer)?;
        }
        self.state = EncoderState::Done;
        Ok(())
    }

    /// Returns to `Init` without reallocating the codec context
    /// (spec `reset()`).
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.ctx.reset();
        self.state = EncoderState::Init;
        self.crc = None;
        self.total_in = 0;
        Ok(())
    }

    /// Releases the codec context; further operations fail `Closed`.
    pub fn close(&mut self) {
        self.state = EncoderState::Closed;
    }

    fn drain_input(&mut self, input: &mut dyn Buffer, emit: &mut Emit<'_>) -> Result<()> {
        while input.has_remaining() {
            let (consumed, produced, _status) =
                self.run_once(input, FlushCompress::None, emit)?;
            if consumed == 0 && produced == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Fills a single `output_buffer_size` buffer across as many
    /// `Compress::compress` calls as it takes, handing it off only once it
    /// is full, the codec stalls (no progress), reaches `StreamEnd`, or (for
    /// `flush == None`) `input` runs dry — matching spec §4.7.1's "handed
    /// off only when full OR when drain determines the codec is waiting on
    /// more input / finished", rather than emitting a fragment per
    /// `compress()` call.
    fn run_once(
        &mut self,
        input: &mut dyn Buffer,
        flush: FlushCompress,
        emit: &mut Emit<'_>,
    ) -> Result<(usize, usize, Status)> {
        let mut out = self.allocator.allocate(self.output_buffer_size)?;
        let mut total_consumed = 0usize;
        let mut total_produced = 0usize;
        let mut last_status = Status::Ok;
        loop {
            let in_bytes = input.chunk();
            let before_in = self.ctx.total_in();
            let before_out = self.ctx.total_out();
            let status = {
                let out_slice = out.chunk_mut()?;
                self.ctx
                    .compress(in_bytes, out_slice, flush)
                    .map_err(|e| BufferError::MalformedCompressedData {
                        reason: e.to_string(),
                    })?
            };
            let consumed = (self.ctx.total_in() - before_in) as usize;
            let produced = (self.ctx.total_out() - before_out) as usize;
            if self.format == Format::Gzip && consumed > 0 {
                if let Some(crc) = self.crc.as_mut() {
                    crc.update(&in_bytes[..consumed]);
                }
                self.total_in = self.total_in.wrapping_add(consumed as u64);
            }
            input.advance(consumed)?;
            out.advance(produced)?;
            total_consumed += consumed;
            total_produced += produced;
            last_status = status;

            if matches!(status, Status::StreamEnd) {
                break;
            }
            if consumed == 0 && produced == 0 {
                break;
            }
            if !out.has_remaining() {
                break;
            }
            if matches!(flush, FlushCompress::None) && !input.has_remaining() {
                break;
            }
        }
        if total_produced > 0 {
            out.reset_for_read()?;
            #[cfg(feature = "tracing-logs")]
            tracing::debug!(
                consumed = total_consumed,
                produced = total_produced,
                "spark-buffer-codec: encoder emitted buffer"
            );
            emit(out)?;
        }
        Ok((total_consumed, total_produced, last_status))
    }
}

fn write_gzip_header(buf: &mut dyn Buffer) -> Result<()> {
    buf.write_u8(0x1F)?;
    buf.write_u8(0x8B)?;
    buf.write_u8(0x08)?;
    buf.write_u8(0x00)?;
    buf.write_u32(0)?;
    buf.write_u8(0x00)?;
    buf.write_u8(0xFF)?;
    buf.reset_for_read()
}

fn write_gzip_trailer(buf: &mut dyn Buffer, crc: u32, total_in: u64) -> Result<()> {
    buf.set_order(ByteOrder::Little);
    buf.write_u32(crc)?;
    buf.write_u32((total_in & 0xFFFF_FFFF) as u32)?;
    buf.reset_for_read()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(f: impl FnOnce(&mut Emit<'_>) -> Result<()>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        f(&mut |mut b| {
            let n = b.remaining();
            out.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn gzip_stream_starts_with_magic_header_e4() {
        let mut enc = DeflateEncoder::new(EncoderOptions {
            format: Format::Gzip,
            ..EncoderOptions::default()
        });
        let out = collect(|emit| {
            let mut input = SparkBuffer::wrap(b"Hello, Buffer!".to_vec());
            enc.compress(&mut input, emit)?;
            enc.finish(emit)
        })
        .unwrap();
        assert_eq!(&out[0..2], &[0x1F, 0x8B]);
        assert_eq!(out[2], 0x08);
        assert_eq!(enc.state(), EncoderState::Done);
    }

    #[test]
    fn reset_returns_to_init() {
        let mut enc = DeflateEncoder::new(EncoderOptions::default());
        let _ = collect(|emit| {
            let mut input = SparkBuffer::wrap(b"abc".to_vec());
            enc.compress(&mut input, emit)?;
            enc.finish(emit)
        });
        enc.reset().unwrap();
        assert_eq!(enc.state(), EncoderState::Init);
    }

    #[test]
    fn closed_encoder_rejects_further_operations() {
        let mut enc = DeflateEncoder::new(EncoderOptions::default());
        enc.close();
        let mut input = SparkBuffer::allocate(0);
        let err = enc.compress(&mut input, &mut |_| Ok(())).unwrap_err();
        assert_eq!(err, BufferError::Closed);
    }

    #[test]
    fn output_buffers_are_coalesced_up_to_full_capacity() {
        let mut enc = DeflateEncoder::new(EncoderOptions {
            output_buffer_size: 16,
            level: Compression::none(),
            ..EncoderOptions::default()
        });
        let data = vec![0xABu8; 10_000];
        let mut sizes = Vec::new();
        let mut input = SparkBuffer::wrap(data);
        enc.compress(&mut input, &mut |mut b| {
            sizes.push(b.remaining());
            let n = b.remaining();
            let _ = b.read_byte_array(n)?;
            Ok(())
        })
        .unwrap();
        assert!(sizes.len() > 1, "expected more than one emitted buffer");
        for &size in &sizes[..sizes.len() - 1] {
            assert_eq!(size, 16, "every buffer but the last should be full");
        }
    }

    #[test]
    fn flush_emits_sync_marker_suffix() {
        let mut enc = DeflateEncoder::new(EncoderOptions::default());
        let out = collect(|emit| {
            let mut input = SparkBuffer::wrap(vec![0, 1, 2, 3, 4, 5]);
            enc.compress(&mut input, emit)?;
            enc.flush(emit)
        })
        .unwrap();
        assert!(out.ends_with(&[0x00, 0x00, 0xFF, 0xFF]));
    }
}
