//! PDF object values.
//!
//! [`Object`] is the in-memory value model used by typed store entries
//! ([`crate::store::DocObject::Raw`]) and by the serializer. Parsed input is
//! kept as raw text instead; see [`crate::parser`].

use std::collections::HashMap;

/// A direct PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Integer number
    Integer(i64),
    /// Real number
    Real(f64),
    /// String bytes, written as a literal or hex string
    String(Vec<u8>),
    /// Name without the leading slash
    Name(String),
    /// Array
    Array(Vec<Object>),
    /// Dictionary
    Dictionary(HashMap<String, Object>),
    /// Stream; `/Length` is computed when written
    Stream {
        /// Stream dictionary
        dict: HashMap<String, Object>,
        /// Stream payload
        data: bytes::Bytes,
    },
    /// `N G R`
    Reference(ObjectRef),
}

/// Indirect reference to an object in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Object id
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Reference to `id` at generation `gen`.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Ids of every indirect reference nested in this value, in traversal order.
    pub fn references(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<u32>) {
        match self {
            Object::Reference(r) => out.push(r.id),
            Object::Array(arr) => arr.iter().for_each(|o| o.collect_references(out)),
            Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                dict.values().for_each(|o| o.collect_references(out))
            },
            _ => {},
        }
    }

    /// Rewrite nested references (old id -> new id). Ids missing from
    /// `mapping` are left alone.
    pub fn remap_references(&mut self, mapping: &HashMap<u32, u32>) {
        match self {
            Object::Reference(r) => {
                if let Some(&id) = mapping.get(&r.id) {
                    r.id = id;
                }
            },
            Object::Array(arr) => arr.iter_mut().for_each(|o| o.remap_references(mapping)),
            Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                dict.values_mut().for_each(|o| o.remap_references(mapping))
            },
            _ => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectRef::new(10, 0).to_string(), "10 0 R");
    }

    #[test]
    fn test_references_nested() {
        let mut dict = HashMap::new();
        dict.insert(
            "Kids".to_string(),
            Object::Array(vec![
                Object::Reference(ObjectRef::new(3, 0)),
                Object::Reference(ObjectRef::new(4, 0)),
            ]),
        );
        dict.insert("Parent".to_string(), Object::Reference(ObjectRef::new(1, 0)));
        let obj = Object::Dictionary(dict);

        let mut refs = obj.references();
        refs.sort();
        assert_eq!(refs, vec![1, 3, 4]);
    }

    #[test]
    fn test_stream_dictionary_references() {
        let mut dict = HashMap::new();
        dict.insert("SMask".to_string(), Object::Reference(ObjectRef::new(8, 0)));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"\x00\x01"),
        };
        assert_eq!(obj.references(), vec![8]);
    }

    #[test]
    fn test_remap_references() {
        let mut obj = Object::Array(vec![
            Object::Reference(ObjectRef::new(5, 0)),
            Object::Reference(ObjectRef::new(6, 0)),
            Object::Integer(5),
        ]);
        let mapping: HashMap<u32, u32> = [(5, 9)].into_iter().collect();
        obj.remap_references(&mapping);
        assert_eq!(obj.references(), vec![9, 6]);
        assert_eq!(obj, Object::Array(vec![
            Object::Reference(ObjectRef::new(9, 0)),
            Object::Reference(ObjectRef::new(6, 0)),
            Object::Integer(5),
        ]));
    }
}
