//! Writer and parser configuration.
//!
//! Both structs are plain data with builder helpers and serde support, so a
//! host application can keep them in its own configuration files.

use crate::decoders::DEFAULT_MAX_DECOMPRESSED_SIZE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for document serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// PDF version written in the header (e.g., "1.7")
    pub version: String,
    /// Compress content streams with FlateDecode
    pub compress: bool,
    /// Emit the binary marker comment after the header
    pub binary_marker: bool,
    /// Emit a trailer /ID array
    pub generate_id: bool,
    /// Producer recorded in the Info dictionary
    pub producer: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            version: "1.7".to_string(),
            compress: false,
            binary_marker: true,
            generate_id: true,
            producer: Some("pdf_forge".to_string()),
        }
    }
}

impl WriterConfig {
    /// Set the header version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Enable or disable stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Enable or disable the trailer /ID.
    pub fn with_generate_id(mut self, generate_id: bool) -> Self {
        self.generate_id = generate_id;
        self
    }

    /// Set or clear the producer.
    pub fn with_producer(mut self, producer: Option<String>) -> Self {
        self.producer = producer;
        self
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPdf(format!("writer config: {}", e)))
    }
}

/// Options controlling how tolerant the raw parser is.
///
/// ```
/// use pdf_forge::config::ParserOptions;
///
/// let strict = ParserOptions::strict();
/// assert!(strict.strict);
/// let lenient = ParserOptions::lenient();
/// assert!(!lenient.strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Fail on an object without `endobj` instead of skipping it
    pub strict: bool,
    /// Maximum page-tree depth before traversal gives up on a branch
    pub max_page_depth: usize,
    /// Maximum decompressed stream size in bytes (0 = unlimited)
    pub max_decompressed_size: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: structural defects are errors.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::lenient()
        }
    }

    /// Lenient mode: skip what cannot be recovered, use defaults elsewhere.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_page_depth: 64,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_config_defaults() {
        let config = WriterConfig::default();
        assert_eq!(config.version, "1.7");
        assert!(!config.compress);
        assert!(config.generate_id);
    }

    #[test]
    fn test_writer_config_builder() {
        let config = WriterConfig::default()
            .with_version("1.4")
            .with_compress(true)
            .with_producer(None);
        assert_eq!(config.version, "1.4");
        assert!(config.compress);
        assert!(config.producer.is_none());
    }

    #[test]
    fn test_writer_config_from_json_partial() {
        let config = WriterConfig::from_json(r#"{"compress": true}"#).unwrap();
        assert!(config.compress);
        assert_eq!(config.version, "1.7");
    }

    #[test]
    fn test_writer_config_from_json_invalid() {
        assert!(WriterConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_parser_options_default_is_lenient() {
        assert_eq!(ParserOptions::default(), ParserOptions::lenient());
        assert_eq!(ParserOptions::strict().max_page_depth, 64);
    }
}
