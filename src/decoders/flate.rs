//! FlateDecode (zlib/deflate) implementation.
//!
//! Uses the flate2 crate for zlib decompression with libflate as a second
//! opinion for streams flate2 rejects. Either decoder must reach the end of
//! the stream for the result to count.

use crate::decoders::{StreamDecoder, StreamEncoder};
use crate::error::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use libflate::zlib::Decoder as LibflateDecoder;
use std::io::{Read, Write};

const CHUNK: usize = 16 * 1024;

/// Run the inflater until it reports the end of the stream.
fn inflate_complete(input: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut inflater = Decompress::new(true);
    let mut output = Vec::with_capacity(input.len().saturating_mul(4).clamp(CHUNK, 4 * CHUNK));
    loop {
        if output.len() == output.capacity() {
            output.reserve(CHUNK);
        }
        let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
        let rest = input.get(in_before as usize..).unwrap_or(&[]);
        let status = inflater
            .decompress_vec(rest, &mut output, FlushDecompress::None)
            .map_err(|e| e.to_string())?;
        if status == Status::StreamEnd {
            return Ok(output);
        }
        let stalled = inflater.total_in() == in_before && inflater.total_out() == out_before;
        if stalled && output.len() < output.capacity() {
            return Err(format!(
                "stream truncated after {} input bytes ({} decoded)",
                in_before, out_before
            ));
        }
    }
}

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    /// Inflate a complete zlib stream.
    ///
    /// Input that ends before the end-of-stream marker, or that flate2
    /// rejects and libflate cannot read to its checksum, is an
    /// [`Error::Decode`]. No partial output is ever returned.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let zlib_err = match inflate_complete(input) {
            Ok(output) => return Ok(output),
            Err(e) => e,
        };

        log::debug!("Zlib decode failed ({}), trying libflate", zlib_err);
        let mut output = Vec::new();
        match LibflateDecoder::new(input) {
            Ok(mut libflate_decoder) => match libflate_decoder.read_to_end(&mut output) {
                Ok(_) => {
                    log::info!("Libflate recovery succeeded: {} bytes", output.len());
                    return Ok(output);
                },
                Err(e) => log::debug!("Libflate read failed: {}", e),
            },
            Err(e) => log::debug!("Libflate init failed: {}", e),
        }

        Err(Error::Decode(format!("FlateDecode failed: {}", zlib_err)))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

impl StreamEncoder for FlateDecoder {
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }
}
