//! Stream filters.
//!
//! Only FlateDecode is implemented; it covers content streams written by the
//! engine and the vast majority of streams in third-party files. Other filter
//! names are reported as unsupported rather than passed through.

use crate::error::{Error, Result};

mod flate;

pub use flate::FlateDecoder;

/// Default cap on decompressed output (decompression bomb protection).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Trait for filters that can also encode.
pub trait StreamEncoder {
    /// Encode the input data.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>>;
}

fn decoder_for(filter_name: &str) -> Result<Box<dyn StreamDecoder>> {
    match filter_name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        other => Err(Error::Unsupported(format!("stream filter /{}", other))),
    }
}

/// Decode stream data using a filter pipeline.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_limit(data, filters, DEFAULT_MAX_DECOMPRESSED_SIZE)
}

/// Decode stream data, failing if the output grows past `max_size` bytes
/// (`0` disables the check).
pub fn decode_stream_with_limit(data: &[u8], filters: &[String], max_size: usize) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder = decoder_for(filter_name)?;
        current = decoder.decode(&current)?;

        if max_size > 0 && current.len() > max_size {
            return Err(Error::Decode(format!(
                "Decompression bomb detected: decompressed size {} bytes exceeds limit {} bytes",
                current.len(),
                max_size
            )));
        }
    }

    Ok(current)
}

/// Compress data for a `/Filter /FlateDecode` stream.
pub fn encode_flate(data: &[u8]) -> Result<Vec<u8>> {
    FlateDecoder.encode(data)
}
