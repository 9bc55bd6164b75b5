//! Reversible mapping between on-disk file names and wire-safe upload tokens.
//!
//! # Design
//! - Tokens are the percent-encoding of the name's raw bytes, so they are ASCII,
//!   whitespace-free and safe as a multipart filename or a path component.
//! - The token → name table lives for the whole process and is shared by every
//!   session; collision resolution happens under one lock so two racing sessions
//!   can never both claim the same token.
//! - `decode` is a table lookup. It never reconstructs bytes from the token, which
//!   keeps the round trip exact for names that are not valid UTF-8.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ffi::{OsStr, OsString};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-wide bidirectional table of wire tokens and the names they stand for.
#[derive(Debug, Default)]
pub struct FilenameCodec {
    names: Mutex<HashMap<String, OsString>>,
}

impl FilenameCodec {
    /// Create an empty codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the wire token for `name`, registering it for later [`Self::decode`].
    ///
    /// The same name always yields the same token. When the natural token is
    /// already bound to a different name, the smallest free `token_N` suffix is
    /// claimed instead and the existing binding is left untouched.
    pub fn encode(&self, name: &OsStr) -> String {
        let base = natural_token(name);
        let mut names = self.lock();

        if let Entry::Vacant(slot) = names.entry(base.clone()) {
            slot.insert(name.to_os_string());
            return base;
        }
        if names.get(&base).is_some_and(|bound| bound == name) {
            return base;
        }

        let mut suffix: u64 = 1;
        loop {
            let candidate = format!("{base}_{suffix}");
            match names.get(&candidate) {
                None => {
                    names.insert(candidate.clone(), name.to_os_string());
                    tracing::debug!(token = %candidate, base = %base, "wire token collision resolved");
                    return candidate;
                }
                Some(bound) if bound == name => return candidate,
                Some(_) => suffix += 1,
            }
        }
    }

    /// Resolve a token previously returned by [`Self::encode`] back to the original name.
    #[must_use]
    pub fn decode(&self, token: &str) -> Option<OsString> {
        self.lock().get(token).cloned()
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no name has been encoded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    fn bind(&self, token: &str, name: &OsStr) {
        self.lock().insert(token.to_string(), name.to_os_string());
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OsString>> {
        // The table is only ever mutated by single inserts, so a poisoned guard still holds a consistent map.
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn natural_token(name: &OsStr) -> String {
    urlencoding::encode_binary(name.as_encoded_bytes()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn is_wire_safe(token: &str) -> bool {
        token
            .bytes()
            .all(|byte| byte.is_ascii() && !byte.is_ascii_whitespace() && !byte.is_ascii_control())
    }

    #[test]
    fn simple_names_round_trip() {
        let codec = FilenameCodec::new();
        let token = codec.encode(OsStr::new("simple.txt"));
        assert_eq!(token, "simple.txt");
        assert_eq!(codec.decode(&token), Some(OsString::from("simple.txt")));
    }

    #[test]
    fn spaces_and_unicode_are_escaped() {
        let codec = FilenameCodec::new();
        let original = OsStr::new("quarterly report – ünïcode.pdf");
        let token = codec.encode(original);
        assert!(is_wire_safe(&token));
        assert!(!token.contains(' '));
        assert_ne!(token.as_str(), "quarterly report – ünïcode.pdf");
        assert_eq!(codec.decode(&token).as_deref(), Some(original));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_bytes_round_trip_exactly() {
        use std::os::unix::ffi::OsStrExt;

        let codec = FilenameCodec::new();
        let original = OsStr::from_bytes(b"weird\xffname with space");
        let token = codec.encode(original);
        assert!(is_wire_safe(&token));
        assert_eq!(token, "weird%FFname%20with%20space");
        assert_eq!(codec.decode(&token).as_deref(), Some(original));
    }

    #[test]
    fn encode_is_deterministic() {
        let codec = FilenameCodec::new();
        let first = codec.encode(OsStr::new("a b.doc"));
        let second = codec.encode(OsStr::new("a b.doc"));
        assert_eq!(first, second);
        assert_eq!(codec.len(), 1);
    }

    #[test]
    fn collision_claims_smallest_free_suffix() {
        let codec = FilenameCodec::new();
        codec.bind("foo", OsStr::new("bar"));

        let token = codec.encode(OsStr::new("foo"));
        assert_eq!(token, "foo_1");
        assert_eq!(codec.decode("foo"), Some(OsString::from("bar")));
        assert_eq!(codec.decode("foo_1"), Some(OsString::from("foo")));

        assert_eq!(codec.encode(OsStr::new("foo")), "foo_1");
    }

    #[test]
    fn collision_skips_suffixes_owned_by_other_names() {
        let codec = FilenameCodec::new();
        codec.bind("foo", OsStr::new("first"));
        codec.bind("foo_1", OsStr::new("second"));

        let token = codec.encode(OsStr::new("foo"));
        assert_eq!(token, "foo_2");
        assert_eq!(codec.decode("foo_1"), Some(OsString::from("second")));
    }

    #[test]
    fn natural_token_equal_to_a_suffixed_token_stays_injective() {
        let codec = FilenameCodec::new();
        codec.bind("foo", OsStr::new("other"));
        assert_eq!(codec.encode(OsStr::new("foo")), "foo_1");

        let token = codec.encode(OsStr::new("foo_1"));
        assert_eq!(token, "foo_1_1");
        assert_eq!(codec.decode("foo_1"), Some(OsString::from("foo")));
        assert_eq!(codec.decode("foo_1_1"), Some(OsString::from("foo_1")));
    }

    #[test]
    fn unknown_tokens_do_not_decode() {
        let codec = FilenameCodec::new();
        assert!(codec.is_empty());
        assert_eq!(codec.decode("never-issued"), None);
    }

    #[test]
    fn concurrent_encoders_never_share_a_token() {
        let codec = Arc::new(FilenameCodec::new());
        codec.bind("foo", OsStr::new("seed"));

        // "foo" must fall back to a suffix while the other names naturally want those suffixes.
        let contenders = ["foo", "foo_1", "foo_2", "foo_1_1", "foo_3", "foo_2_1"];
        let handles: Vec<_> = contenders
            .iter()
            .map(|name| {
                let codec = Arc::clone(&codec);
                let name = OsString::from(name);
                thread::spawn(move || (codec.encode(&name), name))
            })
            .collect();

        let mut tokens = Vec::new();
        for handle in handles {
            let (token, name) = handle.join().expect("encoder thread panicked");
            assert!(is_wire_safe(&token));
            assert_eq!(codec.decode(&token), Some(name));
            tokens.push(token);
        }
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), contenders.len());
        assert_eq!(codec.decode("foo"), Some(OsString::from("seed")));
    }
}
