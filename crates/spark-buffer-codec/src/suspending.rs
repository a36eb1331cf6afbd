//! Suspending façade over the sync encoder/decoder (spec §4.7.4).
//!
//! # 设计背景（Why）
//! spec 把"suspending"和"sync"两种变体的差异限定在输出的交付方式上：sync
//! 变体把每个攒满的输出缓冲通过回调交给调用方，suspending 变体把它们收集进
//! 一个列表再整体返回。核心没有内部线程（§4.7.4"Scheduling model"），所以在
//! 本仓库里两者的唯一差别就是"回调 vs Vec"，不需要引入
//! `async-trait`——真正跨越挂起点的异步只发生在 §4.5 的 `AutoRefillStream`
//! 里（由调用方驱动的 refill），编解码器本身永远是同步、单线程的。

use spark_buffer::buf::Buffer;
use spark_buffer::error::Result;

use crate::decoder::{DecoderOptions, DecoderState, DeflateDecoder};
use crate::encoder::{DeflateEncoder, EncoderOptions, EncoderState};

/// Collects a sync encoder's emissions into a list instead of a callback
/// (spec §4.7.4).
pub struct SuspendingEncoder {
    inner: DeflateEncoder,
}

impl SuspendingEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        SuspendingEncoder {
            inner: DeflateEncoder::new(options),
        }
    }

    pub fn state(&self) -> EncoderState {
        self.inner.state()
    }

    pub fn compress(&mut self, input: &mut dyn Buffer) -> Result<Vec<Box<dyn Buffer>>> {
        let mut out = Vec::new();
        self.inner.compress(input, &mut |b| {
            out.push(b);
            Ok(())
        })?;
        Ok(out)
    }

    pub fn flush(&mut self) -> Result<Vec<Box<dyn Buffer>>> {
        let mut out = Vec::new();
        self.inner.flush(&mut |b| {
            out.push(b);
            Ok(())
        })?;
        Ok(out)
    }

    pub fn finish(&mut self) -> Result<Vec<Box<dyn Buffer>>> {
        let mut out = Vec::new();
        self.inner.finish(&mut |b| {
            out.push(b);
            Ok(())
        })?;
        Ok(out)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    pub fn close(&mut self) {
        self.inner.close()
    }
}

/// Collects a sync decoder's emissions into a list instead of a callback
/// (spec §4.7.4).
pub struct SuspendingDecoder {
    inner: DeflateDecoder,
}

impl SuspendingDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        SuspendingDecoder {
            inner: DeflateDecoder::new(options),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.inner.state()
    }

    pub fn decompress(&mut self, input: &mut dyn Buffer) -> Result<Vec<Box<dyn Buffer>>> {
        let mut out = Vec::new();
        self.inner.decompress(input, &mut |b| {
            out.push(b);
            Ok(())
        })?;
        Ok(out)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    pub fn close(&mut self) {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use spark_buffer::SparkBuffer;

    #[test]
    fn collects_emissions_into_a_list() {
        let mut enc = SuspendingEncoder::new(EncoderOptions {
            format: Format::Gzip,
            ..EncoderOptions::default()
        });
        let mut input = SparkBuffer::wrap(b"suspending facade payload".to_vec());
        let mut chunks = enc.compress(&mut input).unwrap();
        chunks.extend(enc.finish().unwrap());
        assert!(!chunks.is_empty());
        assert_eq!(enc.state(), EncoderState::Done);

        let mut compressed = Vec::new();
        for mut c in chunks {
            let n = c.remaining();
            compressed.extend_from_slice(&c.read_byte_array(n).unwrap());
        }

        let mut dec = SuspendingDecoder::new(DecoderOptions {
            format: Format::Gzip,
            ..DecoderOptions::default()
        });
        let mut compressed_buf = SparkBuffer::wrap(compressed);
        let out_chunks = dec.decompress(&mut compressed_buf).unwrap();
        let mut decompressed = Vec::new();
        for mut c in out_chunks {
            let n = c.remaining();
            decompressed.extend_from_slice(&c.read_byte_array(n).unwrap());
        }
        assert_eq!(decompressed, b"suspending facade payload");
        assert_eq!(dec.state(), DecoderState::Done);
    }
}
