//! Store manifest: records which row format a database was created with.

use serde::{Deserialize, Serialize};

use super::rocks::StoreError;

/// Key of the manifest record inside the `meta` column family.
pub const MANIFEST_KEY: &[u8] = b"manifest";

/// Persisted description of a row store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Row codec version every stored value uses
    pub format_version: u8,
    /// Grace period the store was last opened with
    pub gc_grace_period_seconds: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
}

impl StoreManifest {
    pub fn new(format_version: u8, gc_grace_period_seconds: u64, created_at: u64) -> Self {
        Self {
            format_version,
            gc_grace_period_seconds,
            created_at,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Manifest(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (manifest, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| StoreError::Manifest(e.to_string()))?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_roundtrip() {
        let manifest = StoreManifest::new(1, 864_000, 1_700_000_000);
        let bytes = manifest.encode().unwrap();
        assert_eq!(StoreManifest::decode(&bytes).unwrap(), manifest);
    }

    #[test]
    fn test_manifest_garbage_rejected() {
        assert!(matches!(
            StoreManifest::decode(&[]),
            Err(StoreError::Manifest(_))
        ));
    }
}
