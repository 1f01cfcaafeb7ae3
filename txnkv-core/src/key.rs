use core::{borrow::Borrow, fmt};

/// Values are opaque byte strings.
pub type Value = Vec<u8>;

/// An opaque key, ordered lexicographically by byte value.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    pub const EMPTY: Key = Key(Vec::new());

    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0.escape_ascii())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Key {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(bytes: &[u8; N]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

#[cfg(feature = "bytes")]
impl From<bytes::Bytes> for Key {
    fn from(bytes: bytes::Bytes) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Key> for Vec<u8> {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// A key and the value stored under it.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct KvPair(pub Key, pub Value);

impl KvPair {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self(key.into(), value.into())
    }

    pub fn key(&self) -> &Key {
        &self.0
    }

    pub fn value(&self) -> &[u8] {
        &self.1
    }

    pub fn into_key(self) -> Key {
        self.0
    }

    pub fn into_value(self) -> Value {
        self.1
    }
}

impl fmt::Debug for KvPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KvPair({}, {})", self.0, self.1.escape_ascii())
    }
}

impl<K, V> From<(K, V)> for KvPair
where
    K: Into<Key>,
    V: Into<Value>,
{
    fn from((key, value): (K, V)) -> Self {
        Self(key.into(), value.into())
    }
}

impl From<KvPair> for (Key, Value) {
    fn from(pair: KvPair) -> Self {
        (pair.0, pair.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_by_bytes() {
        let mut keys: Vec<Key> = vec!["b".into(), "a".into(), "ab".into(), b"\x00".into()];
        keys.sort();
        assert_eq!(
            keys,
            vec![Key::from(b"\x00"), "a".into(), "ab".into(), "b".into()]
        );
    }

    #[test]
    fn debug_escapes_non_printable_bytes() {
        assert_eq!(format!("{:?}", Key::from(b"k\x01")), "Key(k\\x01)");
    }
}
