//! Sync-flush marker utilities (spec §4.7.3), used by callers implementing
//! WebSocket permessage-deflate, which transmits payloads with the marker
//! stripped before framing and re-appends it before feeding the inflater.

use spark_buffer::buf::Buffer;
use spark_buffer::error::Result;
use spark_buffer::SparkBuffer;

/// The trailing bytes every `Z_SYNC_FLUSH` block ends with.
pub const SYNC_FLUSH_MARKER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// If the last 4 bytes of `buf`'s remaining span are the sync-flush marker,
/// narrows `buf`'s limit by 4; otherwise leaves `buf` unchanged.
pub fn strip_sync_flush_marker(buf: &mut dyn Buffer) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < SYNC_FLUSH_MARKER.len() {
        return Ok(());
    }
    let tail_start = buf.position() + remaining - SYNC_FLUSH_MARKER.len();
    let mut tail = [0u8; 4];
    buf.get_exact(tail_start, &mut tail)?;
    if tail == SYNC_FLUSH_MARKER {
        buf.set_limit(tail_start)?;
    }
    Ok(())
}

/// Produces a new buffer holding `buf`'s remaining bytes followed by the
/// sync-flush marker, ready for reading.
pub fn append_sync_flush_marker(buf: &mut dyn Buffer) -> Result<SparkBuffer> {
    let n = buf.remaining();
    let mut out = SparkBuffer::allocate(n + SYNC_FLUSH_MARKER.len());
    out.write_buffer(buf)?;
    out.write_bytes(&SYNC_FLUSH_MARKER)?;
    out.reset_for_read()?;
    Ok(out)
}
