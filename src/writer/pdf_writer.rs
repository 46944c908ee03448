//! PDF document writer.
//!
//! Assembles complete PDF documents with proper structure:
//! header, body, xref table, and trailer.

use crate::buffer::GrowBuffer;
use crate::config::WriterConfig;
use crate::error::Result;
use crate::lexer;
use crate::store::{DocumentContext, ObjectStore, Serializable};
use crate::xref::{XrefTable, TOMBSTONE_GENERATION};
use sha2::{Digest, Sha256};

/// Binary marker comment following the header line.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Objects named by the trailer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrailerRefs {
    /// Catalog id
    pub root: u32,
    /// Information dictionary id
    pub info: Option<u32>,
    /// Encryption dictionary id
    pub encrypt: Option<u32>,
    /// `/ID` value text to carry over verbatim (e.g. `[<ab> <ab>]`)
    pub id: Option<String>,
}

impl TrailerRefs {
    /// Trailer naming only the catalog.
    pub fn new(root: u32) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Set the information dictionary.
    pub fn with_info(mut self, info: Option<u32>) -> Self {
        self.info = info;
        self
    }

    /// Carry an existing `/ID` value.
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Serializes an [`ObjectStore`] into a complete document.
#[derive(Debug, Clone, Default)]
pub struct DocumentWriter {
    config: WriterConfig,
}

impl DocumentWriter {
    /// Create a writer.
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Write every slot of `store`. Tombstones become free xref entries.
    ///
    /// Each object receives `init` with a context built once for the pass,
    /// so the store is borrowed mutably.
    pub fn write(&self, store: &mut ObjectStore, trailer: &TrailerRefs) -> Result<Vec<u8>> {
        let ctx = DocumentContext::from_store(store, self.config.compress, self.config.producer.clone());
        store.init_all(&ctx);

        let mut out = GrowBuffer::with_capacity(1024 + store.len() * 128);

        // PDF Header
        out.write_str(&format!("%PDF-{}\n", self.config.version));
        if self.config.binary_marker {
            out.write(BINARY_MARKER);
        }

        let mut xref = XrefTable::new();
        for (slot, obj) in store.iter() {
            if obj.is_null() {
                xref.push_free(TOMBSTONE_GENERATION);
                continue;
            }
            let id = ObjectStore::id_of(slot);
            let generation = obj.generation();
            xref.push_in_use(out.len() as u64, generation);

            out.write_str(&format!("{} {} obj\n", id, generation));
            obj.write(&mut out, id)?;
            out.write_str("\nendobj\n");
        }

        let xref_offset = out.len();
        xref.write_to(&mut out);
        self.write_trailer(&mut out, xref.len(), trailer, store.len());
        out.write_str(&format!("startxref\n{}\n%%EOF\n", xref_offset));

        log::debug!(
            "Wrote {} objects ({} live), {} bytes",
            store.len(),
            store.live_count(),
            out.len()
        );
        Ok(out.into_vec())
    }

    fn write_trailer(&self, out: &mut GrowBuffer, size: usize, trailer: &TrailerRefs, object_count: usize) {
        out.write_str(&format!("trailer\n<< /Size {} /Root {} 0 R", size, trailer.root));
        if let Some(info) = trailer.info {
            out.write_str(&format!(" /Info {} 0 R", info));
        }
        if let Some(encrypt) = trailer.encrypt {
            out.write_str(&format!(" /Encrypt {} 0 R", encrypt));
        }
        match &trailer.id {
            Some(id) => out.write(&lexer::text_bytes(&format!(" /ID {}", id))),
            None if self.config.generate_id => {
                let id = generate_file_id(object_count);
                out.write_str(&format!(" /ID [<{}> <{}>]", id, id));
            },
            None => {},
        }
        out.write_str(" >>\n");
    }
}

/// Generate a 16-byte file identifier as uppercase hex.
///
/// Mixes a random UUID with the current time and the object count.
pub fn generate_file_id(object_count: usize) -> String {
    let uuid = uuid::Uuid::new_v4();
    let now = chrono::Utc::now();

    let mut hasher = Sha256::new();
    hasher.update(uuid.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update((object_count as u64).to_le_bytes());
    let digest = hasher.finalize();

    digest[..16].iter().map(|b| format!("{:02X}", b)).collect()
}
