//! Record of fully indexed documents.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use passage_core::persist::write_json_atomic;
use passage_core::{Fingerprint, Result};

/// `{indexed_files, fingerprints}`. A name is in `indexed_files` only after both
/// indexes hold its chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub indexed_files: BTreeSet<String>,
    #[serde(default)]
    pub fingerprints: BTreeMap<String, Fingerprint>,
}

impl Manifest {
    /// Missing file means nothing indexed yet. An unreadable manifest is treated the
    /// same way, which forces every document to be re-indexed.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "manifest unreadable, starting from scratch");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Indexed and unchanged since.
    pub fn is_current(&self, name: &str, fingerprint: &Fingerprint) -> bool {
        self.indexed_files.contains(name) && self.fingerprints.get(name) == Some(fingerprint)
    }

    pub fn mark_indexed(&mut self, name: &str, fingerprint: Fingerprint) {
        self.indexed_files.insert(name.to_string());
        self.fingerprints.insert(name.to_string(), fingerprint);
    }

    pub fn forget(&mut self, name: &str) -> bool {
        self.fingerprints.remove(name);
        self.indexed_files.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_tolerates_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");
        assert_eq!(Manifest::load(&path).unwrap(), Manifest::default());

        let mut manifest = Manifest::default();
        manifest.mark_indexed("a.txt", Fingerprint::of(b"hello"));
        manifest.save(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();
        assert!(loaded.is_current("a.txt", &Fingerprint::of(b"hello")));
        assert!(!loaded.is_current("a.txt", &Fingerprint::of(b"hello!")));

        fs::write(&path, "{ truncated").unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), Manifest::default());
    }
}
