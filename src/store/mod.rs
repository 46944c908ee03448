//! Arena of document objects addressed by stable integer ids.
//!
//! Slot `i` always serializes as object id `i + 1`. Objects are never
//! physically removed: deletion writes a [`DocObject::Null`] tombstone in
//! place so every other id stays valid.
//!
//! The store also remembers which slots were touched since it was opened
//! (or since [`ObjectStore::reset_tracking`]) so an incremental save can
//! emit only what changed.

pub mod gc;
mod kinds;

pub use kinds::{
    pdf_date, Annotation, AnnotationFlags, Catalog, ContentStream, DocObject, DocumentInfo,
    EmbeddedFile, FileSpec, Font, Image, ImportedObject, MediaBox, NameTree, Page, PageTree,
};

use crate::buffer::GrowBuffer;
use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Read-only view of document-wide state handed to every object before a
/// serialization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentContext {
    /// Id of the catalog, if the store has one
    pub catalog_id: Option<u32>,
    /// Id of the page tree root
    pub pages_id: Option<u32>,
    /// Id of the information dictionary
    pub info_id: Option<u32>,
    /// Total number of slots
    pub object_count: usize,
    /// Whether content streams should be flate-compressed
    pub compress: bool,
    /// Producer to record in an Info dictionary that has none
    pub producer: Option<String>,
}

impl DocumentContext {
    /// Build the context for one pass over `store`.
    pub fn from_store(store: &ObjectStore, compress: bool, producer: Option<String>) -> Self {
        let mut ctx = Self {
            object_count: store.len(),
            compress,
            producer,
            ..Self::default()
        };
        for (slot, obj) in store.iter() {
            let id = ObjectStore::id_of(slot);
            match obj {
                DocObject::Catalog(_) if ctx.catalog_id.is_none() => ctx.catalog_id = Some(id),
                DocObject::Pages(_) if ctx.pages_id.is_none() => ctx.pages_id = Some(id),
                DocObject::Info(_) if ctx.info_id.is_none() => ctx.info_id = Some(id),
                _ => {},
            }
        }
        ctx
    }
}

/// The three-operation object protocol.
pub trait Serializable {
    /// Resolve deferred, document-wide state before writing.
    fn init(&mut self, ctx: &DocumentContext);

    /// Diagnostic label.
    fn type_tag(&self) -> &'static str;

    /// Emit the object body (no `obj`/`endobj` wrapper).
    fn write(&self, sink: &mut GrowBuffer, id: u32) -> Result<()>;
}

/// Ordered, stable-indexed collection of [`DocObject`]s.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: Vec<DocObject>,
    touched: BTreeSet<usize>,
    baseline: usize,
}

impl ObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object and return its 0-based slot. Its id is `slot + 1`.
    pub fn add(&mut self, obj: impl Into<DocObject>) -> usize {
        self.objects.push(obj.into());
        self.objects.len() - 1
    }

    /// Object id for a slot.
    pub fn id_of(slot: usize) -> u32 {
        slot as u32 + 1
    }

    /// Slot for an object id (`None` for id 0).
    pub fn slot_of(id: u32) -> Option<usize> {
        (id as usize).checked_sub(1)
    }

    /// Object in `slot`.
    pub fn get(&self, slot: usize) -> Option<&DocObject> {
        self.objects.get(slot)
    }

    /// Object with id `id`.
    pub fn get_by_id(&self, id: u32) -> Option<&DocObject> {
        Self::slot_of(id).and_then(|slot| self.objects.get(slot))
    }

    /// Mutable access; marks the slot touched.
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut DocObject> {
        let obj = self.objects.get_mut(slot)?;
        self.touched.insert(slot);
        Some(obj)
    }

    /// Replace the object in `slot`, returning the previous one.
    pub fn replace(&mut self, slot: usize, obj: impl Into<DocObject>) -> Result<DocObject> {
        let len = self.objects.len();
        let target = self
            .objects
            .get_mut(slot)
            .ok_or(Error::OutOfRange { index: slot, len })?;
        self.touched.insert(slot);
        Ok(std::mem::replace(target, obj.into()))
    }

    /// Free `slot` by writing a tombstone. Returns whether it was live.
    pub fn tombstone(&mut self, slot: usize) -> Result<bool> {
        let previous = self.replace(slot, DocObject::Null)?;
        Ok(!previous.is_null())
    }

    /// Total number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store has no slots.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Same as [`len`](Self::len).
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of non-tombstone slots.
    pub fn live_count(&self) -> usize {
        self.objects.iter().filter(|o| !o.is_null()).count()
    }

    /// `(slot, object)` pairs in store order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DocObject)> {
        self.objects.iter().enumerate()
    }

    /// Run `init` on every object. Does not count as touching.
    pub(crate) fn init_all(&mut self, ctx: &DocumentContext) {
        for obj in &mut self.objects {
            obj.init(ctx);
        }
    }

    /// Slots modified since the last reset, ascending.
    pub fn touched_slots(&self) -> Vec<usize> {
        self.touched.iter().copied().collect()
    }

    /// Whether `slot` was modified since the last reset.
    pub fn is_touched(&self, slot: usize) -> bool {
        self.touched.contains(&slot)
    }

    /// Number of slots present at the last reset; slots at or past this are new.
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    /// Forget all modifications and treat the current contents as original.
    pub fn reset_tracking(&mut self) {
        self.touched.clear();
        self.baseline = self.objects.len();
    }
}
