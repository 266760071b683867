//! Record and attachment types

use serde::{Deserialize, Serialize};

use crate::{CustomerId, Timestamp};

/// Customer - the durable record owned by the primary store.
///
/// The cache only ever holds a JSON snapshot of this struct; field names
/// in the snapshot are camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Customer {
    /// Apply an update in place, returning true if any field changed.
    pub fn apply(&mut self, update: &CustomerUpdate, now: Timestamp) -> bool {
        let mut changed = false;
        for (slot, value) in [
            (&mut self.first_name, &update.first_name),
            (&mut self.last_name, &update.last_name),
            (&mut self.email, &update.email),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                if *slot != value {
                    *slot = value.to_string();
                    changed = true;
                }
            }
        }
        if changed {
            self.updated_at = now;
        }
        changed
    }
}

/// Attributes supplied when creating a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl NewCustomer {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        }
    }
}

/// Update payload for customers.
///
/// `None` and empty strings leave the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerUpdate {
    /// New first name
    pub first_name: Option<String>,
    /// New last name
    pub last_name: Option<String>,
    /// New email
    pub email: Option<String>,
}

impl CustomerUpdate {
    pub fn is_empty(&self) -> bool {
        [&self.first_name, &self.last_name, &self.email]
            .iter()
            .all(|v| v.as_deref().map_or(true, str::is_empty))
    }
}

/// A binary attachment supplied alongside a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";

    /// Create an attachment whose content type is sniffed from `bytes`.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: sniff_content_type(&bytes).to_string(),
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Leading-byte signatures, checked in order.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"OggS\x00", "application/ogg"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
];

/// Guess a MIME type from the first bytes of `bytes`.
///
/// Only the first 512 bytes are inspected. Unrecognized binary data is
/// `application/octet-stream`; UTF-8 text without control bytes is
/// `text/plain; charset=utf-8`.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    let head = &bytes[..bytes.len().min(512)];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| head.starts_with(sig)) {
        return *mime;
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        return "image/webp";
    }

    let trimmed = match head.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => &head[start..],
        None => return TEXT_PLAIN,
    };
    let lower: Vec<u8> = trimmed.iter().take(14).map(u8::to_ascii_lowercase).collect();
    if lower.starts_with(b"<!doctype html") || lower.starts_with(b"<html") {
        return "text/html; charset=utf-8";
    }
    if lower.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    let is_binary = head
        .iter()
        .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | 0x1B));
    // A multi-byte char may be cut at the 512-byte boundary.
    let is_utf8 = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    if is_binary || !is_utf8 {
        Attachment::DEFAULT_CONTENT_TYPE
    } else {
        TEXT_PLAIN
    }
}

/// Metadata for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHandle {
    /// Record id the blob belongs to.
    pub id: CustomerId,
    /// Original file name.
    pub name: String,
    pub content_type: String,
    pub size: u64,
    /// Hex SHA-256 of the content.
    pub checksum: String,
    pub uploaded_at: Timestamp,
}
