//! Collaborators injected into a [`FileSender`](super::FileSender).
//!
//! Each stage of the pipeline is a trait so callers (and tests) decide how
//! files are recognized, signed and transported. All collaborators must be
//! `Send + Sync` because one sender may serve many tasks.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{Certificate, Document, File};
use crate::BoxFuture;

/// Turns a raw file into a structured document.
pub trait Recognizer: Send + Sync {
    /// Returns `None` if the file is not a document this recognizer understands.
    fn recognize(&self, file: &File) -> Option<Document>;
}

/// Signs document content with a certificate.
pub trait Signer: Send + Sync {
    /// Returns the signed form of `content`.
    fn sign(&self, content: &Bytes, certificate: &Certificate) -> Bytes;
}

/// Errors reported by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The receiving side refused the payload.
    #[error("payload rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivers signed content to its destination.
pub trait Transport: Send + Sync {
    /// Sends `signed`. Any error makes the pipeline skip the file.
    fn send(&self, signed: Bytes) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Source of the current time, used by the freshness check.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
