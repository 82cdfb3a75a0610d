//! Fingerprint/Hasher — stable content-addressed digests over bytes, files,
//! and canonical JSON.
//!
//! All outputs are lowercase 40-hex-character SHA-1 digests. The object
//! hasher canonicalizes maps by sorting keys lexicographically before
//! marshaling so that two calls with semantically-identical-but-differently-
//! ordered input produce the same digest — the load-bearing property behind
//! key determinism.

use std::io::Read;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::{Result, ZimError};

/// Read buffer size for streaming file hashes.
const READ_CHUNK: usize = 64 * 1024;

/// SHA-1 hex digest of a string's UTF-8 bytes.
pub fn hash_str(s: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(s.as_bytes());
    hex(hasher)
}

/// SHA-1 hex digest of a file's contents, stream-read so large files never
/// need to be loaded whole into memory.
///
/// Symlinks are followed (the same as a plain `fs::File::open`, which
/// resolves symlinks transparently) rather than hashing the link target
/// path or treating the link itself as content. This is a deliberate
/// choice, documented here rather than silently "fixed".
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(ZimError::IoError)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(ZimError::IoError)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(hasher))
}

/// SHA-1 hex digest of a value's canonical-JSON serialization: maps sorted
/// lexicographically by key, numbers/strings/booleans in `serde_json`'s
/// stable form. Any `Serialize` value works; objects nested inside are
/// canonicalized recursively.
pub fn hash_value<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value)
        .map_err(|e| ZimError::EncodingError { node_id: String::new(), reason: e.to_string() })?;
    let canonical = canonicalize(&raw);
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| ZimError::EncodingError { node_id: String::new(), reason: e.to_string() })?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex(hasher))
}

/// Recursively rebuild a `Value` with every object's keys sorted. JSON
/// arrays keep their order (order is itself semantic for e.g. `inputs`);
/// only maps are reordered, since JSON objects have no inherent order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::with_capacity(map.len());
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn hex(hasher: Sha1) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(40);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
