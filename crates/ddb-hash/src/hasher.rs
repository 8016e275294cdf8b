use ddb_types::ContentHash;
use serde::Serialize;
use serde_json::Value;

use crate::error::HasherError;

// Type tags prepended to every node of the structural encoding.
const TAG_NULL: u8 = b'n';
const TAG_FALSE: u8 = b'f';
const TAG_TRUE: u8 = b't';
const TAG_UINT: u8 = b'u';
const TAG_INT: u8 = b'i';
const TAG_FLOAT: u8 = b'd';
const TAG_STRING: u8 = b's';
const TAG_ARRAY: u8 = b'a';
const TAG_OBJECT: u8 = b'o';

/// Domain-separated structural hasher.
///
/// The value is first lowered to a `serde_json::Value`, then walked in a
/// canonical order: every node carries a one-byte type tag, strings and
/// containers are length-prefixed, and object members are visited in
/// sorted key order. The walk feeds a BLAKE3 hasher seeded with the domain
/// tag, and the first eight bytes of the output become the digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructuralHasher {
    domain: &'static str,
}

impl StructuralHasher {
    /// Hasher used for tracked objects.
    pub const OBJECT: Self = Self {
        domain: "ddb-struct-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash a serializable value by its structure.
    pub fn hash<T: Serialize + ?Sized>(&self, value: &T) -> Result<ContentHash, HasherError> {
        let tree =
            serde_json::to_value(value).map_err(|e| HasherError::Unsupported(e.to_string()))?;
        Ok(self.hash_value(&tree))
    }

    /// Hash an already-lowered structural value.
    pub fn hash_value(&self, value: &Value) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        feed(&mut hasher, value);

        let mut digest = [0u8; ContentHash::LEN];
        digest.copy_from_slice(&hasher.finalize().as_bytes()[..ContentHash::LEN]);
        ContentHash::from_array(digest)
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for StructuralHasher {
    fn default() -> Self {
        Self::OBJECT
    }
}

fn feed_len(hasher: &mut blake3::Hasher, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

fn feed(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(&[TAG_NULL]);
        }
        Value::Bool(false) => {
            hasher.update(&[TAG_FALSE]);
        }
        Value::Bool(true) => {
            hasher.update(&[TAG_TRUE]);
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                hasher.update(&[TAG_UINT]);
                hasher.update(&u.to_le_bytes());
            } else if let Some(i) = n.as_i64() {
                hasher.update(&[TAG_INT]);
                hasher.update(&i.to_le_bytes());
            } else {
                // serde_json only admits finite floats; NaN and infinities
                // have already been lowered to null.
                let f = n.as_f64().unwrap_or_default();
                hasher.update(&[TAG_FLOAT]);
                hasher.update(&f.to_bits().to_le_bytes());
            }
        }
        Value::String(s) => {
            hasher.update(&[TAG_STRING]);
            feed_len(hasher, s.len());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(&[TAG_ARRAY]);
            feed_len(hasher, items.len());
            for item in items {
                feed(hasher, item);
            }
        }
        Value::Object(map) => {
            // `serde_json::Map` is only sorted when `preserve_order` is off
            // somewhere in the dependency graph, so sort explicitly.
            let mut members: Vec<(&String, &Value)> = map.iter().collect();
            members.sort_by(|(a, _), (b, _)| a.cmp(b));

            hasher.update(&[TAG_OBJECT]);
            feed_len(hasher, members.len());
            for (key, member) in members {
                feed_len(hasher, key.len());
                hasher.update(key.as_bytes());
                feed(hasher, member);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use proptest::prelude::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    use super::*;

    #[derive(Serialize)]
    struct Row {
        id: u32,
        name: String,
        tags: Vec<String>,
    }

    fn row(id: u32, name: &str) -> Row {
        Row {
            id,
            name: name.to_string(),
            tags: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let h1 = StructuralHasher::OBJECT.hash(&row(1, "alpha")).unwrap();
        let h2 = StructuralHasher::OBJECT.hash(&row(1, "alpha")).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_content_produces_different_hashes() {
        let h1 = StructuralHasher::OBJECT.hash(&row(1, "alpha")).unwrap();
        let h2 = StructuralHasher::OBJECT.hash(&row(1, "beta")).unwrap();
        let h3 = StructuralHasher::OBJECT.hash(&row(2, "alpha")).unwrap();
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn map_order_does_not_matter() {
        let mut hashed: HashMap<String, u32> = HashMap::new();
        let mut sorted: BTreeMap<String, u32> = BTreeMap::new();
        for (i, key) in ["zeta", "alpha", "mu", "beta"].iter().enumerate() {
            hashed.insert(key.to_string(), i as u32);
            sorted.insert(key.to_string(), i as u32);
        }
        assert_eq!(
            StructuralHasher::OBJECT.hash(&hashed).unwrap(),
            StructuralHasher::OBJECT.hash(&sorted).unwrap()
        );
    }

    #[test]
    fn type_tags_separate_lookalike_values() {
        let hasher = StructuralHasher::OBJECT;
        let int = hasher.hash(&1u64).unwrap();
        let neg = hasher.hash(&-1i64).unwrap();
        let float = hasher.hash(&1.0f64).unwrap();
        let string = hasher.hash("1").unwrap();
        let boolean = hasher.hash(&true).unwrap();
        let all = [int, neg, float, string, boolean];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn nesting_is_unambiguous() {
        let hasher = StructuralHasher::OBJECT;
        let flat = hasher.hash(&vec!["ab", "c"]).unwrap();
        let shifted = hasher.hash(&vec!["a", "bc"]).unwrap();
        let nested = hasher.hash(&vec![vec!["ab"], vec!["c"]]).unwrap();
        assert_ne!(flat, shifted);
        assert_ne!(flat, nested);
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let value = row(9, "same");
        let a = StructuralHasher::OBJECT.hash(&value).unwrap();
        let b = StructuralHasher::new("ddb-custom-v1").hash(&value).unwrap();
        assert_ne!(a, b);
        assert_eq!(StructuralHasher::default().domain(), "ddb-struct-v1");
    }

    #[test]
    fn compound_map_keys_are_unsupported() {
        let mut map: HashMap<(u8, u8), u8> = HashMap::new();
        map.insert((1, 2), 3);
        let err = StructuralHasher::OBJECT.hash(&map).unwrap_err();
        assert!(matches!(err, HasherError::Unsupported(_)));
    }

    #[test]
    fn failing_serialize_impl_is_unsupported() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("cannot serialize"))
            }
        }
        let err = StructuralHasher::OBJECT.hash(&Broken).unwrap_err();
        assert_eq!(err, HasherError::Unsupported("cannot serialize".into()));
    }

    proptest! {
        #[test]
        fn equal_maps_hash_equal(entries in proptest::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..16)) {
            let forward: HashMap<String, i64> = entries.iter().cloned().collect();
            let sorted: BTreeMap<String, i64> = forward.iter().map(|(k, v)| (k.clone(), *v)).collect();
            // Same contents inserted back to front.
            let mut backwards: HashMap<String, i64> = HashMap::new();
            for (k, v) in sorted.iter().rev() {
                backwards.insert(k.clone(), *v);
            }
            let expected = StructuralHasher::OBJECT.hash(&sorted).unwrap();
            prop_assert_eq!(StructuralHasher::OBJECT.hash(&forward).unwrap(), expected);
            prop_assert_eq!(StructuralHasher::OBJECT.hash(&backwards).unwrap(), expected);
        }

        #[test]
        fn distinct_strings_hash_distinct(a in ".{0,32}", b in ".{0,32}") {
            prop_assume!(a != b);
            prop_assert_ne!(
                StructuralHasher::OBJECT.hash(&a).unwrap(),
                StructuralHasher::OBJECT.hash(&b).unwrap()
            );
        }
    }
}
