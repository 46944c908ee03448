//! Reclaiming unreachable and duplicate objects.
//!
//! Collection never renumbers: freed slots become tombstones and serialize
//! as free cross-reference entries, so every surviving id is stable.

use super::ObjectStore;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// What a collection pass removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GcMode {
    /// Leave the store untouched
    #[default]
    None,
    /// Tombstone everything unreachable from the roots
    Compact,
    /// Merge imported objects with identical serialized bodies, pages and
    /// page tree nodes excepted
    Dedup,
}

/// Run one pass over `store` and return how many objects were tombstoned.
///
/// `roots` are object ids (the catalog, and the Info dictionary which only
/// the trailer refers to).
///
/// ```
/// use pdf_forge::object::Object;
/// use pdf_forge::store::gc::{collect, GcMode};
/// use pdf_forge::store::ObjectStore;
///
/// let mut store = ObjectStore::new();
/// store.add(Object::Array(vec![Object::Reference(pdf_forge::object::ObjectRef::new(2, 0))]));
/// store.add(Object::Integer(1));
/// store.add(Object::Integer(2));
///
/// assert_eq!(collect(&mut store, &[1], GcMode::Compact), 1);
/// assert_eq!(collect(&mut store, &[1], GcMode::Compact), 0);
/// ```
pub fn collect(store: &mut ObjectStore, roots: &[u32], mode: GcMode) -> usize {
    let removed = match mode {
        GcMode::None => 0,
        GcMode::Compact => compact(store, roots),
        GcMode::Dedup => dedup(store),
    };
    log::info!("GC {:?}: removed {} objects, {} live", mode, removed, store.live_count());
    removed
}

fn mark(store: &ObjectStore, roots: &[u32]) -> HashSet<u32> {
    let mut visited = HashSet::new();
    let mut stack: Vec<u32> = roots.to_vec();
    while let Some(id) = stack.pop() {
        let Some(obj) = store.get_by_id(id) else {
            log::warn!("Reference to missing object {} ignored", id);
            continue;
        };
        if obj.is_null() || !visited.insert(id) {
            continue;
        }
        stack.extend(obj.references().into_iter().filter(|r| !visited.contains(r)));
    }
    visited
}

fn compact(store: &mut ObjectStore, roots: &[u32]) -> usize {
    let marked = mark(store, roots);
    let unreachable: Vec<usize> = store
        .iter()
        .filter(|(slot, obj)| !obj.is_null() && !marked.contains(&ObjectStore::id_of(*slot)))
        .map(|(slot, _)| slot)
        .collect();

    let mut removed = 0;
    for slot in unreachable {
        if let Ok(true) = store.tombstone(slot) {
            log::debug!("Tombstoned unreachable object {}", ObjectStore::id_of(slot));
            removed += 1;
        }
    }
    removed
}

fn dedup(store: &mut ObjectStore) -> usize {
    // digest -> ids whose bodies hash to it, first occurrence first
    let mut buckets: IndexMap<[u8; 32], Vec<(u32, Vec<u8>)>> = IndexMap::new();
    for (slot, obj) in store.iter() {
        if !obj.is_imported() || obj.is_page_tree_node() {
            continue;
        }
        let id = ObjectStore::id_of(slot);
        let body = match obj.to_body_bytes(id) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Skipping object {} in dedup: {}", id, e);
                continue;
            },
        };
        let digest: [u8; 32] = Sha256::digest(&body).into();
        buckets.entry(digest).or_default().push((id, body));
    }
    if buckets.is_empty() {
        return 0;
    }

    let mut mapping: HashMap<u32, u32> = HashMap::new();
    for group in buckets.values() {
        for (i, (id, body)) in group.iter().enumerate() {
            let keep = group[..i].iter().find(|(other, other_body)| {
                other_body == body && !mapping.contains_key(other)
            });
            if let Some((keep_id, _)) = keep {
                mapping.insert(*id, *keep_id);
            }
        }
    }
    if mapping.is_empty() {
        return 0;
    }

    let referrers: Vec<usize> = store
        .iter()
        .filter(|(slot, obj)| {
            !obj.is_null()
                && !mapping.contains_key(&ObjectStore::id_of(*slot))
                && obj.references().iter().any(|r| mapping.contains_key(r))
        })
        .map(|(slot, _)| slot)
        .collect();
    for slot in referrers {
        if let Some(obj) = store.get_mut(slot) {
            obj.remap_references(&mapping);
        }
    }

    let mut removed = 0;
    for &dup in mapping.keys() {
        if let Some(slot) = ObjectStore::slot_of(dup) {
            if let Ok(true) = store.tombstone(slot) {
                removed += 1;
            }
        }
    }
    removed
}
