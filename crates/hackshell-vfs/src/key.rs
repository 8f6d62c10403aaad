//! Reversible storage keys for file payloads.
//!
//! A payload key is the virtual path `dir/.../name` with every byte outside
//! `[A-Za-z0-9._-]` percent-escaped, `/` included. The result is a single
//! filesystem-safe token; escaping is injective, so distinct paths never
//! share a key, and decoding restores the (directory, filename) pair.

use std::fmt::Write as _;

/// Directory (relative to the machine directory) holding file payloads.
pub const FILES_DIR: &str = "files";

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

/// Encode a (directory segments, filename) pair into a payload key.
pub fn encode<S: AsRef<str>>(dir: &[S], name: &str) -> String {
    let mut out = String::new();
    for seg in dir.iter().map(AsRef::as_ref).chain(std::iter::once(name)) {
        if !out.is_empty() {
            out.push_str("%2F");
        }
        for &b in seg.as_bytes() {
            if is_plain(b) {
                out.push(b as char);
            } else {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

/// Decode a payload key back into (directory segments, filename).
pub fn decode(key: &str) -> Option<(Vec<String>, String)> {
    let bytes = key.as_bytes();
    let mut raw = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = key.get(i + 1..i + 3)?;
                raw.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            },
            b if is_plain(b) => {
                raw.push(b);
                i += 1;
            },
            _ => return None,
        }
    }
    let path = String::from_utf8(raw).ok()?;
    let mut segments: Vec<String> = path.split('/').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return None;
    }
    let name = segments.pop()?;
    Some((segments, name))
}

/// Content reference stored in the tree for a file payload.
pub fn content_ref<S: AsRef<str>>(dir: &[S], name: &str) -> String {
    format!("{FILES_DIR}/{}", encode(dir, name))
}

/// Content reference for a file at absolute `segments`, or `None` for root.
pub fn content_ref_for(segments: &[String]) -> Option<String> {
    let (name, dir) = segments.split_last()?;
    Some(content_ref(dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_stay_readable() {
        assert_eq!(encode(&["home", "alice"], "notes.txt"), "home%2Falice%2Fnotes.txt");
        assert_eq!(encode::<&str>(&[], "readme"), "readme");
    }

    #[test]
    fn separator_lookalikes_do_not_collide() {
        // A name containing the encoded separator must differ from a real
        // nested path.
        let nested = encode(&["a"], "b");
        let flat = encode::<&str>(&[], "a%2Fb");
        assert_ne!(nested, flat);
        let legacy = encode::<&str>(&[], "a__DIR__b");
        assert_ne!(legacy, encode(&["a"], "b"));
    }

    #[test]
    fn escapes_unsafe_bytes() {
        let key = encode(&["my docs"], "r\u{e9}sum\u{e9}?.txt");
        assert!(key.bytes().all(|b| is_plain(b) || b == b'%'));
        let (dir, name) = decode(&key).unwrap();
        assert_eq!(dir, vec!["my docs"]);
        assert_eq!(name, "r\u{e9}sum\u{e9}?.txt");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("a%2").is_none());
        assert!(decode("a%ZZ").is_none());
        assert!(decode("a/b").is_none());
        assert!(decode("%2Fx").is_none());
        assert!(decode("").is_none());
    }

    #[test]
    fn content_ref_lives_under_files() {
        let segs = vec!["d".to_string(), "f.txt".to_string()];
        assert_eq!(content_ref_for(&segs).unwrap(), "files/d%2Ff.txt");
        assert!(content_ref_for(&[]).is_none());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn encoding_is_invertible(
                dir in proptest::collection::vec("[^/]{1,8}", 0..4),
                name in "[^/]{1,12}",
            ) {
                let key = encode(&dir, &name);
                prop_assert_eq!(decode(&key), Some((dir, name)));
            }

            #[test]
            fn distinct_paths_get_distinct_keys(
                a in proptest::collection::vec("[a-z%_]{1,4}", 1..4),
                b in proptest::collection::vec("[a-z%_]{1,4}", 1..4),
            ) {
                let split = |v: &Vec<String>| {
                    let (name, dir) = v.split_last().unwrap();
                    encode(dir, name)
                };
                if a != b {
                    prop_assert_ne!(split(&a), split(&b));
                }
            }
        }
    }
}
