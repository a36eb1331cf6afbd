//! `codec_contract` 集成测试：从外部 crate 视角验证编解码状态机、
//! gzip 头/尾校验与 sync-flush 工具的公开契约。

use spark_buffer::buf::Buffer;
use spark_buffer::SparkBuffer;
use spark_buffer_codec::{
    append_sync_flush_marker, strip_sync_flush_marker, DecoderOptions, DecoderState,
    DeflateDecoder, DeflateEncoder, EncoderOptions, EncoderState, Format,
};

fn compress_all(format: Format, data: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(EncoderOptions {
        format,
        ..EncoderOptions::default()
    });
    let mut out = Vec::new();
    let mut input = SparkBuffer::wrap(data.to_vec());
    let mut emit = |mut b: Box<dyn Buffer>| {
        let n = b.remaining();
        out.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    };
    enc.compress(&mut input, &mut emit).unwrap();
    enc.finish(&mut emit).unwrap();
    assert_eq!(enc.state(), EncoderState::Done);
    out
}

#[test]
fn gzip_round_trip_through_public_api_e4() {
    let data = b"the public-facing round trip through spark-buffer-codec";
    let compressed = compress_all(Format::Gzip, data);
    assert_eq!(&compressed[0..2], &[0x1F, 0x8B]);

    let mut dec = DeflateDecoder::new(DecoderOptions {
        format: Format::Gzip,
        ..DecoderOptions::default()
    });
    let mut out = Vec::new();
    let mut compressed_buf = SparkBuffer::wrap(compressed);
    dec.decompress(&mut compressed_buf, &mut |mut b| {
        let n = b.remaining();
        out.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();
    assert_eq!(out, data);
    assert_eq!(dec.state(), DecoderState::Done);
}

#[test]
fn reset_allows_encoder_reuse_across_independent_streams() {
    let mut enc = DeflateEncoder::new(EncoderOptions::default());
    let mut first = Vec::new();
    let mut input = SparkBuffer::wrap(b"first stream".to_vec());
    enc.compress(&mut input, &mut |mut b| {
        let n = b.remaining();
        first.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();
    enc.finish(&mut |mut b| {
        let n = b.remaining();
        first.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();

    enc.reset().unwrap();
    assert_eq!(enc.state(), EncoderState::Init);

    let mut second = Vec::new();
    let mut input2 = SparkBuffer::wrap(b"second stream".to_vec());
    enc.compress(&mut input2, &mut |mut b| {
        let n = b.remaining();
        second.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();
    enc.finish(&mut |mut b| {
        let n = b.remaining();
        second.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();

    let mut dec = DeflateDecoder::new(DecoderOptions::default());
    let mut decoded = Vec::new();
    let mut second_buf = SparkBuffer::wrap(second);
    dec.decompress(&mut second_buf, &mut |mut b| {
        let n = b.remaining();
        decoded.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();
    assert_eq!(decoded, b"second stream");
}

#[test]
fn sync_flush_marker_strips_cleanly_from_flushed_output() {
    let mut enc = DeflateEncoder::new(EncoderOptions::default());
    let mut out = Vec::new();
    let mut input = SparkBuffer::wrap(b"flush me".to_vec());
    enc.compress(&mut input, &mut |mut b| {
        let n = b.remaining();
        out.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();
    enc.flush(&mut |mut b| {
        let n = b.remaining();
        out.extend_from_slice(&b.read_byte_array(n)?);
        Ok(())
    })
    .unwrap();

    let mut buf = SparkBuffer::wrap(out.clone());
    strip_sync_flush_marker(&mut buf).unwrap();
    assert_eq!(buf.remaining(), out.len() - 4);

    let mut fresh = SparkBuffer::wrap(vec![1, 2, 3]);
    let appended = append_sync_flush_marker(&mut fresh).unwrap();
    assert_eq!(appended.remaining(), 7);
}
