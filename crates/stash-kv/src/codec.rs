//! Value compression.
//!
//! Values are compressed with zstd when the bucket asks for it, but only kept
//! compressed when that actually saves space.

use bytes::Bytes;
use tracing::trace;

use crate::error::Result;

/// A value as held by a bucket.
#[derive(Debug, Clone)]
pub(crate) struct StoredValue {
    data: Bytes,
    compressed: bool,
}

impl StoredValue {
    /// Encode `raw` for storage.
    pub(crate) fn encode(raw: &Bytes, compression: bool) -> Result<Self> {
        if !compression || raw.is_empty() {
            return Ok(Self {
                data: raw.clone(),
                compressed: false,
            });
        }

        let compressed = zstd::encode_all(raw.as_ref(), zstd::DEFAULT_COMPRESSION_LEVEL)?;
        trace!(
            raw_len = raw.len(),
            compressed_len = compressed.len(),
            "Compressed value"
        );

        if compressed.len() < raw.len() {
            Ok(Self {
                data: Bytes::from(compressed),
                compressed: true,
            })
        } else {
            Ok(Self {
                data: raw.clone(),
                compressed: false,
            })
        }
    }

    /// Recover the raw value.
    pub(crate) fn decode(&self) -> Result<Bytes> {
        if self.compressed {
            Ok(Bytes::from(zstd::decode_all(self.data.as_ref())?))
        } else {
            Ok(self.data.clone())
        }
    }

    /// Bytes charged against the bucket limit.
    pub(crate) fn stored_len(&self) -> u64 {
        self.data.len() as u64
    }

    #[cfg(test)]
    pub(crate) fn is_compressed(&self) -> bool {
        self.compressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressible_value_shrinks() {
        let raw = Bytes::from(vec![b'a'; 64 * 1024]);
        let stored = StoredValue::encode(&raw, true).unwrap();
        assert!(stored.is_compressed());
        assert!(stored.stored_len() < raw.len() as u64);
        assert_eq!(stored.decode().unwrap(), raw);
    }

    #[test]
    fn test_tiny_value_kept_raw() {
        let raw = Bytes::from_static(b"hi");
        let stored = StoredValue::encode(&raw, true).unwrap();
        assert!(!stored.is_compressed());
        assert_eq!(stored.stored_len(), 2);
        assert_eq!(stored.decode().unwrap(), raw);
    }

    #[test]
    fn test_compression_disabled() {
        let raw = Bytes::from(vec![0u8; 4096]);
        let stored = StoredValue::encode(&raw, false).unwrap();
        assert!(!stored.is_compressed());
        assert_eq!(stored.stored_len(), 4096);
    }

    #[test]
    fn test_empty_value() {
        let stored = StoredValue::encode(&Bytes::new(), true).unwrap();
        assert_eq!(stored.stored_len(), 0);
        assert!(stored.decode().unwrap().is_empty());
    }
}
