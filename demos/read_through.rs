//! Read-through cache and file dispatch, end to end.
//!
//! Run with:
//!
//! ```sh
//! RUST_LOG=debug cargo run --example read_through
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use readthru::cache::{BoxFuture, CacheConfig, Fetched, ReadThroughCache, Upstream};
use readthru::dispatch::{
    Certificate, Document, File, FileSender, Recognizer, Signer, Transport, TransportError,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Thing {
    name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("catalogue offline")]
struct Offline;

/// A slow in-memory catalogue standing in for a remote service.
struct Catalogue {
    things: HashMap<String, Thing>,
}

impl Upstream for Catalogue {
    type Value = Thing;
    type Error = Offline;

    fn try_fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Fetched<Thing>, Offline>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(self.things.get(key).cloned().into())
        })
    }
}

/// Treats every `.xml` file as a fresh format 4.0 document.
struct XmlRecognizer;

impl Recognizer for XmlRecognizer {
    fn recognize(&self, file: &File) -> Option<Document> {
        file.name()
            .ends_with(".xml")
            .then(|| Document::from_file(file, Utc::now(), "4.0"))
    }
}

struct PrefixSigner;

impl Signer for PrefixSigner {
    fn sign(&self, content: &Bytes, certificate: &Certificate) -> Bytes {
        let mut signed = certificate.raw().to_vec();
        signed.extend_from_slice(content);
        Bytes::from(signed)
    }
}

struct StdoutTransport;

impl Transport for StdoutTransport {
    fn send(&self, signed: Bytes) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            println!("sent {} bytes", signed.len());
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Cache ────────────────────────────────────────────────────────────────
    let catalogue = Catalogue {
        things: HashMap::from([
            ("TheDress".to_owned(), Thing { name: "The Dress".to_owned() }),
            ("CoolBoots".to_owned(), Thing { name: "Cool Boots".to_owned() }),
        ]),
    };
    let config = CacheConfig::new().fetch_timeout(Duration::from_secs(1));
    let cache = Arc::new(ReadThroughCache::with_config(catalogue, config));

    let lookups: Vec<_> = ["TheDress", "TheDress", "CoolBoots", "Unknown"]
        .into_iter()
        .map(|key| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { (key, cache.get(key).await) })
        })
        .collect();
    for lookup in lookups {
        let (key, result) = lookup.await?;
        match result? {
            Some(thing) => println!("{key} -> {}", thing.name),
            None => println!("{key} -> not available"),
        }
    }
    println!("{}", serde_json::to_string_pretty(&cache.stats())?);

    // ── Dispatch ─────────────────────────────────────────────────────────────
    let sender = FileSender::new(
        Arc::new(XmlRecognizer),
        Arc::new(PrefixSigner),
        Arc::new(StdoutTransport),
    );
    let files = vec![
        File::new("invoice.xml", "<invoice/>"),
        File::new("notes.txt", "not a document"),
    ];
    let certificate = Certificate::new("CN=demo", vec![0xde, 0xad]);

    let report = sender.send_files(&files, &certificate).await;
    for skipped in report.skipped() {
        println!("skipped {}: {}", skipped.file().name(), skipped.reason());
    }

    Ok(())
}
