// src/checksum/fingerprint.rs

use std::collections::BTreeMap;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// Content-derived identity of a (workspace, target) pair's inputs.
///
/// `files` maps each matched source path (relative, forward slashes) to its
/// content hash; `deps` maps each direct dependency name to that
/// dependency's aggregate digest, which is how an upstream change reaches
/// every downstream fingerprint. `digest` is the aggregate over both maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub files: BTreeMap<String, String>,
    pub deps: BTreeMap<String, String>,
    pub digest: String,
}

impl Fingerprint {
    /// Build a fingerprint, deriving the aggregate digest from the maps.
    ///
    /// `BTreeMap` iteration is already sorted by key, which is what keeps the
    /// digest stable across filesystem iteration order.
    pub fn new(files: BTreeMap<String, String>, deps: BTreeMap<String, String>) -> Self {
        let mut hasher = Hasher::new();
        for (path, hash) in files.iter() {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(hash.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&[0xff]);
        for (dep, digest) in deps.iter() {
            hasher.update(dep.as_bytes());
            hasher.update(&[0]);
            hasher.update(digest.as_bytes());
            hasher.update(&[0]);
        }

        let digest = hasher.finalize().to_hex().to_string();
        Self {
            files,
            deps,
            digest,
        }
    }

    /// A fingerprint carrying only an aggregate digest, no per-key maps.
    /// Remote index records store this reduced form.
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self {
            files: BTreeMap::new(),
            deps: BTreeMap::new(),
            digest: digest.into(),
        }
    }

    /// `true` = changed / cache miss.
    ///
    /// A `None` previous is always a miss. Otherwise the per-key comparison
    /// is authoritative: a miss if the key sets differ or any shared key's
    /// hash differs, regardless of the aggregate digests.
    pub fn changed(previous: Option<&Fingerprint>, current: &Fingerprint) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        maps_differ(&previous.files, &current.files)
            || maps_differ(&previous.deps, &current.deps)
    }

    /// Source paths whose hash differs between two fingerprints, including
    /// paths present on only one side. Used for change reporting.
    pub fn changed_paths(previous: &Fingerprint, current: &Fingerprint) -> Vec<String> {
        let mut changed = Vec::new();
        for (path, hash) in current.files.iter() {
            if previous.files.get(path) != Some(hash) {
                changed.push(path.clone());
            }
        }
        for path in previous.files.keys() {
            if !current.files.contains_key(path) {
                changed.push(path.clone());
            }
        }
        changed.sort();
        changed.dedup();
        changed
    }
}

fn maps_differ(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> bool {
    if a.len() != b.len() {
        return true;
    }
    for (key, value) in a.iter() {
        match b.get(key) {
            Some(other) if other == value => {}
            _ => return true,
        }
    }
    false
}
