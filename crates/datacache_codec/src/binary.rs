//! Checksummed binary storage for cached tables.
//!
//! Each artifact is a little-endian `u32` header length, a bincode header
//! holding magic bytes, format version, table shape and payload checksum,
//! followed by the bincode-encoded table.

use datacache_common::{ContentHash, Shape, Table};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::options::DecodeOptions;
use crate::text::decode_delimited;
use crate::TabularCodec;

/// Magic bytes identifying a datacache table artifact.
const ARTIFACT_MAGIC: [u8; 4] = *b"DCTB";

/// Current artifact format version. Increment on breaking changes to
/// the header or payload format.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// File extension of cache entries written by [`ColumnarCodec`].
pub const ARTIFACT_EXTENSION: &str = "dcache";

/// Header prepended to every artifact for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"DCTB"`.
    pub magic: [u8; 4],

    /// Artifact format version.
    pub format_version: u32,

    /// Number of rows in the stored table.
    pub rows: u64,

    /// Number of columns in the stored table.
    pub columns: u64,

    /// Content hash of the payload bytes.
    pub checksum: ContentHash,
}

/// Default codec: delimited text in, checksummed bincode tables out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnarCodec;

impl ColumnarCodec {
    /// Creates the codec.
    pub fn new() -> Self {
        Self
    }
}

impl TabularCodec for ColumnarCodec {
    fn extension(&self) -> &str {
        ARTIFACT_EXTENSION
    }

    fn decode_text(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Table, CodecError> {
        decode_delimited(bytes, options)
    }

    fn encode_binary(&self, table: &Table) -> Result<Vec<u8>, CodecError> {
        let payload = bincode::serde::encode_to_vec(table, bincode::config::standard())
            .map_err(|e| CodecError::Serialization {
                reason: e.to_string(),
            })?;

        let shape = table.shape();
        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            rows: shape.rows as u64,
            columns: shape.columns as u64,
            checksum: ContentHash::from_bytes(&payload),
        };

        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CodecError::Serialization {
                reason: e.to_string(),
            })?;

        let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
            CodecError::Serialization {
                reason: "artifact header exceeds 4 GiB".to_string(),
            }
        })?;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);
        Ok(output)
    }

    fn decode_binary(&self, bytes: &[u8]) -> Result<Table, CodecError> {
        let (header, payload) = split_artifact(bytes)?;

        if header.magic != ARTIFACT_MAGIC {
            return Err(corrupt("bad magic bytes"));
        }
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} (expected {ARTIFACT_FORMAT_VERSION})",
                header.format_version
            )));
        }

        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(corrupt(format!(
                "checksum mismatch: expected {}, got {actual}",
                header.checksum
            )));
        }

        let (table, _): (Table, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .map_err(|e| corrupt(format!("payload: {e}")))?;

        let expected = Shape::new(header.rows as usize, header.columns as usize);
        if table.shape() != expected {
            return Err(corrupt(format!(
                "decoded shape {} differs from header shape {expected}",
                table.shape()
            )));
        }

        Ok(table)
    }
}

/// Splits raw bytes into a decoded header and the payload slice.
fn split_artifact(bytes: &[u8]) -> Result<(ArtifactHeader, &[u8]), CodecError> {
    let len_bytes: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| corrupt("truncated header length"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;

    let header_end = 4usize
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| corrupt("truncated header"))?;

    let (header, _): (ArtifactHeader, usize) =
        bincode::serde::decode_from_slice(&bytes[4..header_end], bincode::config::standard())
            .map_err(|e| corrupt(format!("header: {e}")))?;

    Ok((header, &bytes[header_end..]))
}

fn corrupt(reason: impl Into<String>) -> CodecError {
    CodecError::Corrupt {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacache_common::{Column, ColumnData};

    fn sample() -> Table {
        Table::new(vec![
            Column::new("id", ColumnData::Int(vec![Some(1), None, Some(3)])),
            Column::new(
                "score",
                ColumnData::Float(vec![Some(0.5), Some(1.25), None]),
            ),
            Column::new(
                "label",
                ColumnData::Text(vec![Some("a".into()), Some("b".into()), None]),
            ),
        ])
        .unwrap()
    }

    fn artifact_with(header: &ArtifactHeader, payload: &[u8]) -> Vec<u8> {
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut output = Vec::new();
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        output
    }

    fn payload_of(table: &Table) -> Vec<u8> {
        bincode::serde::encode_to_vec(table, bincode::config::standard()).unwrap()
    }

    #[test]
    fn encode_then_decode_preserves_table() {
        let codec = ColumnarCodec::new();
        let bytes = codec.encode_binary(&sample()).unwrap();
        assert_eq!(codec.decode_binary(&bytes).unwrap(), sample());
    }

    #[test]
    fn empty_table_survives() {
        let codec = ColumnarCodec::new();
        let bytes = codec.encode_binary(&Table::empty()).unwrap();
        assert_eq!(codec.decode_binary(&bytes).unwrap(), Table::empty());
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = ColumnarCodec::new().decode_binary(b"garbage data").unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn truncated_length_is_corrupt() {
        let err = ColumnarCodec::new().decode_binary(b"AB").unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn wrong_magic_is_corrupt() {
        let payload = payload_of(&sample());
        let header = ArtifactHeader {
            magic: *b"BAAD",
            format_version: ARTIFACT_FORMAT_VERSION,
            rows: 3,
            columns: 3,
            checksum: ContentHash::from_bytes(&payload),
        };
        let err = ColumnarCodec::new()
            .decode_binary(&artifact_with(&header, &payload))
            .unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn wrong_version_is_corrupt() {
        let payload = payload_of(&sample());
        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: 999,
            rows: 3,
            columns: 3,
            checksum: ContentHash::from_bytes(&payload),
        };
        let err = ColumnarCodec::new()
            .decode_binary(&artifact_with(&header, &payload))
            .unwrap_err();
        assert!(err.to_string().contains("format version 999"));
    }

    #[test]
    fn tampered_payload_is_corrupt() {
        let codec = ColumnarCodec::new();
        let mut bytes = codec.encode_binary(&sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = codec.decode_binary(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn header_shape_mismatch_is_corrupt() {
        let payload = payload_of(&sample());
        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            rows: 7,
            columns: 3,
            checksum: ContentHash::from_bytes(&payload),
        };
        let err = ColumnarCodec::new()
            .decode_binary(&artifact_with(&header, &payload))
            .unwrap_err();
        assert!(err.to_string().contains("header shape"));
    }

    #[test]
    fn huge_header_length_is_corrupt() {
        let mut bytes = u32::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        assert!(ColumnarCodec::new().decode_binary(&bytes).unwrap_err().is_corrupt());
    }

    #[test]
    fn text_to_binary_pipeline() {
        let codec = ColumnarCodec::new();
        let table = codec
            .decode_text(b"a,b\n1,x\n2,y\n", &DecodeOptions::default())
            .unwrap();
        let bytes = codec.encode_binary(&table).unwrap();
        assert_eq!(codec.decode_binary(&bytes).unwrap().shape(), Shape::new(2, 2));
        assert_eq!(codec.extension(), "dcache");
    }
}
