//! Files, recognized documents and signing credentials.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A raw input file: a name and its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    content: Bytes,
}

impl File {
    /// Creates a file from its name and content.
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// The file name, as given by the caller.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw file content.
    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

/// A file a [`Recognizer`](super::Recognizer) understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    content: Bytes,
    created: DateTime<Utc>,
    format: String,
}

impl Document {
    /// Creates a document from its parts.
    pub fn new(
        name: impl Into<String>,
        content: impl Into<Bytes>,
        created: DateTime<Utc>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            created,
            format: format.into(),
        }
    }

    /// Builds a document that carries `file`'s name and content.
    pub fn from_file(file: &File, created: DateTime<Utc>, format: impl Into<String>) -> Self {
        Self::new(file.name(), file.content().clone(), created, format)
    }

    /// The name of the file the document was recognized from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload that gets signed and sent.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// When the document was created.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// The document format version, e.g. `"4.0"`.
    pub fn format(&self) -> &str {
        &self.format
    }
}

/// An opaque signing credential handed to the [`Signer`](super::Signer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    subject: String,
    raw: Bytes,
}

impl Certificate {
    /// Creates a certificate from its subject and encoded form.
    pub fn new(subject: impl Into<String>, raw: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            raw: raw.into(),
        }
    }

    /// The certificate subject, e.g. `CN=example`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The encoded certificate as supplied by the caller.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}
