//! The decompressor side of the DEFLATE/GZIP state machine (spec §4.7.1,
//! §4.7.2): a byte-at-a-time gzip header parser feeding a push-style
//! `flate2::Decompress`, with trailer validation once inflation ends.

use std::sync::Arc;

use flate2::{Decompress, FlushDecompress, Status};

use spark_buffer::buf::Buffer;
use spark_buffer::error::{BufferError, Result};
use spark_buffer::order::ByteOrder;
use spark_buffer::SparkBuffer;

use crate::format::{Allocator, Format, HeapAllocator};

/// Decoder lifecycle (spec §4.7.1): `Init -> Running -> Draining -> Done`,
/// with `Closed` reachable from any state via `close()`. Gzip streams pass
/// through an extra header-parsing phase folded into `Init`/`Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Init,
    Running,
    Draining,
    Done,
    Closed,
}

pub struct DecoderOptions {
    pub format: Format,
    pub output_buffer_size: usize,
    pub allocator: Arc<dyn Allocator>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            format: Format::RawDeflate,
            output_buffer_size: 32 * 1024,
            allocator: Arc::new(HeapAllocator),
        }
    }
}

pub type Emit<'a> = dyn FnMut(Box<dyn Buffer>) -> Result<()> + 'a;

/// Gzip header field currently being accumulated, one byte at a time so a
/// field may legally straddle a chunk boundary (spec §4.7.2 edge case).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderField {
    Id1,
    Id2,
    Cm,
    Flg,
    Mtime(u8),
    Xfl,
    Os,
    ExtraLenLo,
    ExtraLenHi,
    ExtraBody(u16),
    Name,
    Comment,
    HcrcLo,
    HcrcHi,
    Done,
}

/// Byte-at-a-time gzip header state machine (spec §4.7.2).
struct GzipHeaderParser {
    field: HeaderField,
    flg: u8,
    extra_remaining: u16,
}

const FLG_FHCRC: u8 = 0x02;
const FLG_FEXTRA: u8 = 0x04;
const FLG_FNAME: u8 = 0x08;
const FLG_FCOMMENT: u8 = 0x10;

impl GzipHeaderParser {
    fn new() -> Self {
        GzipHeaderParser {
            field: HeaderField::Id1,
            flg: 0,
            extra_remaining: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.field == HeaderField::Done
    }

    /// Consumes one byte, returning an error if the stream fails a magic or
    /// method check. Transitions `self.field` to the next field to expect.
    fn feed(&mut self, byte: u8) -> Result<()> {
        self.field = match self.field {
            HeaderField::Id1 => {
                if byte != 0x1F {
                    return Err(BufferError::MalformedCompressedData {
                        reason: format!("bad gzip id1 byte {byte:#04x}"),
                    });
                }
                HeaderField::Id2
            }
            HeaderField::Id2 => {
                if byte != 0x8B {
                    return Err(BufferError::MalformedCompressedData {
                        reason: format!("bad gzip id2 byte {byte:#04x}"),
                    });
                }
                HeaderField::Cm
            }
            HeaderField::Cm => {
                if byte != 0x08 {
                    return Err(BufferError::MalformedCompressedData {
                        reason: format!("unsupported gzip compression method {byte}"),
                    });
                }
                HeaderField::Flg
            }
            HeaderField::Flg => {
                self.flg = byte;
                HeaderField::Mtime(0)
            }
            HeaderField::Mtime(3) => HeaderField::Xfl,
            HeaderField::Mtime(n) => HeaderField::Mtime(n + 1),
            HeaderField::Xfl => HeaderField::Os,
            HeaderField::Os => self.after_os(),
            HeaderField::ExtraLenLo => {
                self.extra_remaining = byte as u16;
                HeaderField::ExtraLenHi
            }
            HeaderField::ExtraLenHi => {
                self.extra_remaining |= (byte as u16) << 8;
                self.advance_past_extra()
            }
            HeaderField::ExtraBody(remaining) => {
                let left = remaining - 1;
                if left == 0 {
                    self.after_extra()
                } else {
                    HeaderField::ExtraBody(left)
                }
            }
            HeaderField::Name => {
                if byte == 0 {
                    self.after_name()
                } else {
                    HeaderField::Name
                }
            }
            HeaderField::Comment => {
                if byte == 0 {
                    self.after_comment()
                } else {
                    HeaderField::Comment
                }
            }
            HeaderField::HcrcLo => HeaderField::HcrcHi,
            HeaderField::HcrcHi => HeaderField::Done,
            HeaderField::Done => HeaderField::Done,
        };
        Ok(())
    }

    fn after_os(&self) -> HeaderField {
        if self.flg & FLG_FEXTRA != 0 {
            HeaderField::ExtraLenLo
        } else {
            self.after_extra()
        }
    }

    fn advance_past_extra(&self) -> HeaderField {
        if self.extra_remaining == 0 {
            self.after_extra()
        } else {
            HeaderField::ExtraBody(self.extra_remaining)
        }
    }

    fn after_extra(&self) -> HeaderField {
        if self.flg & FLG_FNAME != 0 {
            HeaderField::Name
        } else {
            self.after_name()
        }
    }

    fn after_name(&self) -> HeaderField {
        if self.flg & FLG_FCOMMENT != 0 {
            HeaderField::Comment
        } else {
            self.after_comment()
        }
    }

    fn after_comment(&self) -> HeaderField {
        if self.flg & FLG_FHCRC != 0 {
            HeaderField::HcrcLo
        } else {
            HeaderField::Done
        }
    }
}

enum HeaderProgress {
    Header(GzipHeaderParser),
    None,
}

/// Push-style DEFLATE/Zlib/Gzip decompressor (spec §4.7.1).
pub struct DeflateDecoder {
    state: DecoderState,
    ctx: Decompress,
    format: Format,
    allocator: Arc<dyn Allocator>,
    output_buffer_size: usize,
    header: HeaderProgress,
    crc: Option<crc32fast::Hasher>,
    total_out: u64,
    trailer: [u8; 8],
    trailer_len: u8,
}

impl DeflateDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        let zlib_header = options.format == Format::Zlib;
        let header = if options.format == Format::Gzip {
            HeaderProgress::Header(GzipHeaderParser::new())
        } else {
            HeaderProgress::None
        };
        DeflateDecoder {
            state: DecoderState::Init,
            ctx: Decompress::new(zlib_header),
            format: options.format,
            allocator: options.allocator,
            output_buffer_size: options.output_buffer_size,
            header,
            crc: None,
            total_out: 0,
            trailer: [0; 8],
            trailer_len: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == DecoderState::Closed {
            return Err(BufferError::Closed);
        }
        Ok(())
    }

    /// Feeds `input`, emitting decompressed output buffers as they fill
    /// (spec `decompress(chunk)`).
    pub fn decompress(&mut self, input: &mut dyn Buffer, emit: &mut Emit<'_>) -> Result<()> {
        self.ensure_open()?;
        if self.state == DecoderState::Init {
            self.state = DecoderState::Running;
        }
        if let HeaderProgress::Header(parser) = &mut self.header {
            while !parser.is_done() && input.has_remaining() {
                let byte = input.read_u8()?;
                parser.feed(byte)?;
            }
            if !parser.is_done() {
                return Ok(());
            }
            self.crc = Some(crc32fast::Hasher::new());
        }
        self.drain_deflate(input, emit)
    }

    fn drain_deflate(&mut self, input: &mut dyn Buffer, emit: &mut Emit<'_>) -> Result<()> {
        while input.has_remaining() {
            let status = self.run_once(input, emit)?;
            if matches!(status, Status::StreamEnd) {
                self.state = DecoderState::Draining;
                self.consume_trailer(input)?;
                break;
            }
        }
        Ok(())
    }

    /// Fills a single `output_buffer_size` buffer across as many
    /// `Decompress::decompress` calls as it takes, handing it off only once
    /// it is full, the codec stalls, reaches `StreamEnd`, or `input` runs
    /// dry — matching spec §4.7.1's "handed off only when full OR when
    /// drain determines the codec is waiting on more input / finished",
    /// rather than emitting a fragment per `decompress()` call.
    fn run_once(&mut self, input: &mut dyn Buffer, emit: &mut Emit<'_>) -> Result<Status> {
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
                    .decompress(in_bytes, out_slice, FlushDecompress::None)
                    .map_err(|e| BufferError::MalformedCompressedData {
                        reason: e.to_string(),
                    })?
            };
            let consumed = (self.ctx.total_in() - before_in) as usize;
            let produced = (self.ctx.total_out() - before_out) as usize;
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
            if !input.has_remaining() {
                break;
            }
        }
        if total_produced > 0 {
            out.reset_for_read()?;
            if self.format == Format::Gzip {
                let bytes = out.chunk();
                if let Some(crc) = self.crc.as_mut() {
                    crc.update(bytes);
                }
                self.total_out = self.total_out.wrapping_add(total_produced as u64);
            }
            #[cfg(feature = "tracing-logs")]
            tracing::debug!(
                consumed = total_consumed,
                produced = total_produced,
                "spark-buffer-codec: decoder emitted buffer"
            );
            emit(out)?;
        }
        if total_consumed == 0 && total_produced == 0 && !matches!(last_status, Status::StreamEnd)
        {
            return Err(BufferError::MalformedCompressedData {
                reason: "decoder made no progress".into(),
            });
        }
        Ok(last_status)
    }

    fn consume_trailer(&mut self, input: &mut dyn Buffer) -> Result<()> {
        if self.format != Format::Gzip {
            self.state = DecoderState::Done;
            return Ok(());
        }
        while (self.trailer_len as usize) < 8 && input.has_remaining() {
            self.trailer[self.trailer_len as usize] = input.read_u8()?;
            self.trailer_len += 1;
        }
        if (self.trailer_len as usize) < 8 {
            return Ok(());
        }
        let mut view = SparkBuffer::wrap(self.trailer.to_vec());
        view.set_order(ByteOrder::Little);
        let expected_crc = view.read_u32()?;
        let expected_isize = view.read_u32()?;
        let actual_crc = self.crc.take().map(|h| h.finalize()).unwrap_or(0);
        if actual_crc != expected_crc {
            return Err(BufferError::MalformedCompressedData {
                reason: format!(
                    "gzip crc32 mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
                ),
            });
        }
        if (self.total_out & 0xFFFF_FFFF) as u32 != expected_isize {
            return Err(BufferError::MalformedCompressedData {
                reason: format!(
                    "gzip isize mismatch: expected {expected_isize}, got {}",
                    self.total_out & 0xFFFF_FFFF
                ),
            });
        }
        self.state = DecoderState::Done;
        Ok(())
    }

    /// Returns to `Init`, re-arming the gzip header parser if applicable
    /// (spec `reset()`).
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        let zlib_header = self.format == Format::Zlib;
        self.ctx.reset(zlib_header);
        self.state = DecoderState::Init;
        self.header = if self.format == Format::Gzip {
            HeaderProgress::Header(GzipHeaderParser::new())
        } else {
            HeaderProgress::None
        };
        self.crc = None;
        self.total_out = 0;
        self.trailer = [0; 8];
        self.trailer_len = 0;
        Ok(())
    }

    pub fn close(&mut self) {
        self.state = DecoderState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{DeflateEncoder, EncoderOptions};

    fn roundtrip(format: Format, data: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(EncoderOptions {
            format,
            ..EncoderOptions::default()
        });
        let mut compressed = Vec::new();
        let mut input = SparkBuffer::wrap(data.to_vec());
        enc.compress(&mut input, &mut |mut b| {
            let n = b.remaining();
            compressed.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })
        .unwrap();
        enc.finish(&mut |mut b| {
            let n = b.remaining();
            compressed.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })
        .unwrap();

        let mut dec = DeflateDecoder::new(DecoderOptions {
            format,
            ..DecoderOptions::default()
        });
        let mut decompressed = Vec::new();
        let mut compressed_buf = SparkBuffer::wrap(compressed);
        dec.decompress(&mut compressed_buf, &mut |mut b| {
            let n = b.remaining();
            decompressed.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })
        .unwrap();
        assert_eq!(dec.state(), DecoderState::Done);
        decompressed
    }

    #[test]
    fn raw_deflate_round_trips_e4() {
        let data = b"The quick brown fox jumps over the lazy dog, 10 times!";
        assert_eq!(roundtrip(Format::RawDeflate, data), data);
    }

    #[test]
    fn zlib_round_trips() {
        let data = b"zlib-wrapped payload with some repetition repetition repetition";
        assert_eq!(roundtrip(Format::Zlib, data), data);
    }

    #[test]
    fn gzip_round_trips_with_trailer_validation_e4() {
        let data = b"gzip payload validated against crc32 and isize trailer fields";
        assert_eq!(roundtrip(Format::Gzip, data), data);
    }

    #[test]
    fn gzip_header_parser_accepts_byte_at_a_time_feed() {
        let mut parser = GzipHeaderParser::new();
        for &b in &[0x1F, 0x8B, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xFF] {
            parser.feed(b).unwrap();
        }
        assert!(parser.is_done());
    }

    #[test]
    fn gzip_header_parser_rejects_bad_magic() {
        let mut parser = GzipHeaderParser::new();
        assert!(parser.feed(0x00).is_err());
    }

    #[test]
    fn corrupted_gzip_trailer_fails_crc_check_e5() {
        let data = b"data whose trailer we will corrupt after compressing it";
        let mut enc = DeflateEncoder::new(EncoderOptions {
            format: Format::Gzip,
            ..EncoderOptions::default()
        });
        let mut compressed = Vec::new();
        let mut input = SparkBuffer::wrap(data.to_vec());
        enc.compress(&mut input, &mut |mut b| {
            let n = b.remaining();
            compressed.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })
        .unwrap();
        enc.finish(&mut |mut b| {
            let n = b.remaining();
            compressed.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })
        .unwrap();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;

        let mut dec = DeflateDecoder::new(DecoderOptions {
            format: Format::Gzip,
            ..DecoderOptions::default()
        });
        let mut compressed_buf = SparkBuffer::wrap(compressed);
        let result = dec.decompress(&mut compressed_buf, &mut |_| Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn decoder_output_buffers_are_coalesced_up_to_full_capacity() {
        let data = vec![0xCDu8; 10_000];
        let mut enc = DeflateEncoder::new(EncoderOptions::default());
        let mut compressed = Vec::new();
        let mut input = SparkBuffer::wrap(data);
        enc.compress(&mut input, &mut |mut b| {
            let n = b.remaining();
            compressed.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })
        .unwrap();
        enc.finish(&mut |mut b| {
            let n = b.remaining();
            compressed.extend_from_slice(&b.read_byte_array(n)?);
            Ok(())
        })
        .unwrap();

        let mut dec = DeflateDecoder::new(DecoderOptions {
            output_buffer_size: 16,
            ..DecoderOptions::default()
        });
        let mut sizes = Vec::new();
        let mut compressed_buf = SparkBuffer::wrap(compressed);
        dec.decompress(&mut compressed_buf, &mut |mut b| {
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
    fn closed_decoder_rejects_further_operations() {
        let mut dec = DeflateDecoder::new(DecoderOptions::default());
        dec.close();
        let mut input = SparkBuffer::allocate(0);
        let err = dec.decompress(&mut input, &mut |_| Ok(())).unwrap_err();
        assert_eq!(err, BufferError::Closed);
    }
}
