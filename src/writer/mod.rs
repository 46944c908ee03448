//! Document serialization.
//!
//! ## Architecture
//!
//! ```text
//! ObjectStore (DocObject slots)
//!     ↓  init(DocumentContext) once per pass
//! [DocumentWriter] (header, objects, xref, trailer into a GrowBuffer)
//!     ↓
//! [ObjectSerializer] (Object values → bytes)
//!     ↓
//! PDF bytes
//! ```
//!
//! ```
//! use pdf_forge::config::WriterConfig;
//! use pdf_forge::store::{Catalog, DocObject, MediaBox, ObjectStore, Page, PageTree};
//! use pdf_forge::writer::{DocumentWriter, TrailerRefs};
//!
//! let mut store = ObjectStore::new();
//! store.add(DocObject::Catalog(Catalog { pages: 2, names: None }));
//! store.add(DocObject::Pages(PageTree { kids: vec![3] }));
//! store.add(DocObject::Page(Page::new(MediaBox::LETTER)));
//!
//! let bytes = DocumentWriter::new(WriterConfig::default())
//!     .write(&mut store, &TrailerRefs::new(1))
//!     .unwrap();
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! ```

mod object_serializer;
mod pdf_writer;

pub use object_serializer::ObjectSerializer;
pub use pdf_writer::{generate_file_id, DocumentWriter, TrailerRefs};
