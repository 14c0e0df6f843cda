// THEORY:
// The manifest is the store's claim about what should be on the shelf: one
// product per line, whitespace separated, `SKU PRICE SECTION [extra ...]`.
//
// The parser is deliberately tolerant. A line that is blank or carries fewer
// than three tokens is not an error, it is simply not a product, and it is
// dropped. Tokens are kept verbatim: prices are not parsed as numbers, sections
// are not checked against a vocabulary and duplicate SKUs are allowed. Line
// order is preserved because it is the only link between a manifest row and a
// shelf position.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuditError;

const MIN_TOKENS_PER_ITEM: usize = 3;

/// One product row of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredItem {
    pub sku: String,
    /// The raw price token; never validated as a number.
    pub price: String,
    pub section: String,
    /// Any tokens after the section, in their original order.
    pub additional_info: Vec<String>,
}

impl DeclaredItem {
    /// Builds an item from one line's tokens, or `None` if the line is too short.
    fn from_tokens(tokens: &[&str]) -> Option<Self> {
        if tokens.len() < MIN_TOKENS_PER_ITEM {
            return None;
        }
        Some(Self {
            sku: tokens[0].to_string(),
            price: tokens[1].to_string(),
            section: tokens[2].to_string(),
            additional_info: tokens[MIN_TOKENS_PER_ITEM..].iter().map(|t| t.to_string()).collect(),
        })
    }
}

/// Parses manifest text into declared items, in line order.
pub fn parse_manifest(text: &str) -> Vec<DeclaredItem> {
    let mut items = Vec::new();
    let mut skipped = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match DeclaredItem::from_tokens(&tokens) {
            Some(item) => items.push(item),
            None => skipped += 1,
        }
    }

    debug!(items = items.len(), skipped, "parsed manifest");
    items
}

/// Parses raw manifest bytes. Invalid UTF-8 sequences are replaced rather than
/// rejected, so this never fails.
pub fn parse_manifest_bytes(bytes: &[u8]) -> Vec<DeclaredItem> {
    parse_manifest(&String::from_utf8_lossy(bytes))
}

/// Reads and parses a manifest file. Only an I/O failure is an error.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<DeclaredItem>, AuditError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| AuditError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_manifest_bytes(&bytes))
}
