//! Options controlling delimited text decoding.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// How to split and interpret source text.
///
/// Options are serializable so they can take part in in-memory cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Field delimiter. `None` picks one from the source file extension.
    pub delimiter: Option<u8>,
    /// Whether the first record holds column names.
    pub has_header: bool,
    /// Quote character.
    pub quote: u8,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_header: true,
            quote: b'"',
        }
    }
}

impl DecodeOptions {
    /// Uses an explicit delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Treats the first record as data; columns are named `column_<n>`.
    pub fn without_header(mut self) -> Self {
        self.has_header = false;
        self
    }

    /// Fills in a missing delimiter from the source extension: tab for
    /// `.tsv` and `.tab`, comma otherwise.
    pub fn resolved_for(&self, source: &Path) -> Self {
        let mut resolved = self.clone();
        if resolved.delimiter.is_none() {
            let ext = source
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            resolved.delimiter = Some(match ext.as_deref() {
                Some("tsv") | Some("tab") => b'\t',
                _ => b',',
            });
        }
        resolved
    }

    /// The delimiter to use, defaulting to a comma.
    pub fn effective_delimiter(&self) -> u8 {
        self.delimiter.unwrap_or(b',')
    }
}
