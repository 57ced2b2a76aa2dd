//! File dispatch pipeline — recognize, validate, sign and send.
//!
//! [`FileSender`] runs every input file through the same short-circuiting
//! sequence of stages:
//!
//! 1. recognize the file as a [`Document`] ([`Recognizer`]),
//! 2. check its format against the [`DispatchPolicy`],
//! 3. check it is younger than the policy's maximum age ([`Clock`]),
//! 4. sign its content ([`Signer`]),
//! 5. hand the signed bytes to a [`Transport`].
//!
//! A file that fails any stage is *skipped*. Skips never abort the batch: each
//! file's outcome is independent of every other file's.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

mod document;
mod policy;
mod ports;

pub use document::{Certificate, Document, File};
pub use policy::DispatchPolicy;
pub use ports::{Clock, Recognizer, Signer, SystemClock, Transport, TransportError};

/// Why a file was not sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("file was not recognized as a document")]
    Unrecognized,

    #[error("unsupported document format `{format}`")]
    UnsupportedFormat { format: String },

    #[error("document created at {created} is too old")]
    Stale { created: DateTime<Utc> },

    #[error("transport failed: {0}")]
    SendFailed(String),
}

/// A file that was skipped, borrowed from the caller's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped<'a> {
    file: &'a File,
    reason: SkipReason,
}

impl<'a> Skipped<'a> {
    /// The original input file.
    pub fn file(&self) -> &'a File {
        self.file
    }

    /// The first stage the file failed.
    pub fn reason(&self) -> &SkipReason {
        &self.reason
    }
}

/// The result of one [`FileSender::send_files`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport<'a> {
    skipped: Vec<Skipped<'a>>,
    sent: usize,
}

impl<'a> SendReport<'a> {
    /// Skipped files in input order.
    pub fn skipped(&self) -> &[Skipped<'a>] {
        &self.skipped
    }

    /// Just the skipped files, in input order.
    pub fn skipped_files(&self) -> Vec<&'a File> {
        self.skipped.iter().map(|s| s.file).collect()
    }

    /// Number of files delivered by the transport.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Returns `true` if every file was sent.
    pub fn all_sent(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Validates, signs and sends batches of files.
///
/// All collaborators are injected through the constructor; the clock and the
/// acceptance policy have defaults that can be replaced with
/// [`with_clock`](Self::with_clock) and [`with_policy`](Self::with_policy).
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use readthru::dispatch::{Certificate, File, FileSender, Recognizer, Signer, Transport};
///
/// async fn send_all(
///     recognizer: Arc<dyn Recognizer>,
///     signer: Arc<dyn Signer>,
///     transport: Arc<dyn Transport>,
/// ) {
///     let sender = FileSender::new(recognizer, signer, transport);
///     let files = vec![File::new("report.xml", "<report/>")];
///     let certificate = Certificate::new("CN=example", vec![0x30, 0x82]);
///
///     let report = sender.send_files(&files, &certificate).await;
///     for skipped in report.skipped() {
///         eprintln!("{}: {}", skipped.file().name(), skipped.reason());
///     }
/// }
/// ```
pub struct FileSender {
    recognizer: Arc<dyn Recognizer>,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: DispatchPolicy,
}

impl FileSender {
    /// Creates a sender using the wall clock and the default [`DispatchPolicy`].
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        signer: Arc<dyn Signer>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            recognizer,
            signer,
            transport,
            clock: Arc::new(SystemClock),
            policy: DispatchPolicy::default(),
        }
    }

    /// Replaces the wall clock used by the freshness check.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the acceptance policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the acceptance policy in use.
    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Sends every file that passes all stages and reports the ones that did not.
    ///
    /// Files are processed one at a time in input order. A failure at any
    /// stage skips that file only.
    pub async fn send_files<'a>(
        &self,
        files: &'a [File],
        certificate: &Certificate,
    ) -> SendReport<'a> {
        let mut report = SendReport::default();

        for file in files {
            match self.send_file(file, certificate).await {
                Ok(()) => {
                    debug!(file = file.name(), "file sent");
                    report.sent += 1;
                }
                Err(reason) => {
                    warn!(file = file.name(), reason = %reason, "file skipped");
                    report.skipped.push(Skipped { file, reason });
                }
            }
        }

        info!(
            total = files.len(),
            sent = report.sent,
            skipped = report.skipped.len(),
            "batch dispatched"
        );
        report
    }

    async fn send_file(&self, file: &File, certificate: &Certificate) -> Result<(), SkipReason> {
        let document = self
            .recognizer
            .recognize(file)
            .ok_or(SkipReason::Unrecognized)?;
        self.policy.check(&document, self.clock.now())?;

        let signed = self.signer.sign(document.content(), certificate);
        self.transport
            .send(signed)
            .await
            .map_err(|e| SkipReason::SendFailed(e.to_string()))
    }
}

impl std::fmt::Debug for FileSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSender")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
