//! Ingestion pipeline: decode, normalize, resolve, store.
//!
//! The first three stages are pure and run on a bounded pool of blocking
//! workers. The store serializes its own aggregate writes, so workers never
//! coordinate with each other.

use chrono::Utc;
use email_cleaner::Normalizer;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::adapters::mime::{decode, RawMessage};
use crate::config::AppConfig;
use crate::error::{MailweaveError, Result};
use crate::services::resolver::ThreadResolver;
use crate::store::{open_store, ThreadStore};
use crate::types::{NewMessage, ThreadInfo};

/// Where one message ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ingested {
    pub message_id: String,
    pub thread_id: String,
    pub is_reply: bool,
}

/// Result for one input of a batch, in input order.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Stored(Ingested),
    Failed { error: MailweaveError },
}

impl IngestOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, IngestOutcome::Stored(_))
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<IngestOutcome>,
    pub ingested: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Ingestor {
    normalizer: Arc<Normalizer>,
    resolver: Arc<ThreadResolver>,
    store: Arc<dyn ThreadStore>,
    workers: usize,
}

impl Ingestor {
    pub fn new(
        normalizer: Normalizer,
        resolver: ThreadResolver,
        store: Arc<dyn ThreadStore>,
        workers: usize,
    ) -> Self {
        Self {
            normalizer: Arc::new(normalizer),
            resolver: Arc::new(resolver),
            store,
            workers: workers.max(1),
        }
    }

    /// Build every stage from configuration and open the configured store.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.store)?;
        Ok(Self::new(
            config.normalizer.build()?,
            config.resolver.build(),
            store,
            config.ingest.workers,
        ))
    }

    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    /// Run the pure stages on one message. Never fails: every stage
    /// degrades instead.
    pub fn prepare(&self, raw: &RawMessage) -> (NewMessage, ThreadInfo) {
        let decoded = decode(raw);
        if decoded.is_degraded() {
            warn!(
                fingerprint = %decoded.fingerprint,
                "No decodable text parts, falling back to raw body"
            );
        }

        let cleaned = self
            .normalizer
            .clean_or_fallback(&decoded.fragments, &decoded.body_raw);
        let info = self.resolver.resolve(&decoded);

        let headers = decoded.headers;
        let message = NewMessage {
            sender: headers.from,
            recipients: headers.to,
            cc: headers.cc,
            subject: headers.subject,
            body_raw: decoded.body_raw,
            body_cleaned: cleaned.text,
            received_at: headers.date.unwrap_or_else(Utc::now),
        };
        (message, info)
    }

    pub fn ingest(&self, raw: &RawMessage) -> Result<Ingested> {
        let started = Instant::now();
        let (message, info) = self.prepare(raw);
        let message_id = self.store.insert(&message, &info)?;

        let ingested = Ingested {
            message_id,
            thread_id: info.storage_thread_id().to_string(),
            is_reply: info.is_reply,
        };
        debug!(
            message_id = %ingested.message_id,
            thread_id = %ingested.thread_id,
            is_reply = ingested.is_reply,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingested message"
        );
        Ok(ingested)
    }

    pub fn ingest_bytes(&self, bytes: &[u8]) -> Result<Ingested> {
        self.ingest(&RawMessage::parse(bytes))
    }

    /// Ingest independent raw messages on at most `workers` blocking tasks.
    /// A failing message is reported and never stops the rest.
    pub async fn ingest_batch(&self, inputs: Vec<Vec<u8>>) -> BatchReport {
        let started = Instant::now();
        let total = inputs.len();
        let permits = Arc::new(Semaphore::new(self.workers));

        let mut handles = Vec::with_capacity(total);
        for bytes in inputs {
            let permits = Arc::clone(&permits);
            let ingestor = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| MailweaveError::InvalidInput(format!("Worker pool closed: {}", e)))?;
                tokio::task::spawn_blocking(move || ingestor.ingest_bytes(&bytes))
                    .await
                    .map_err(|e| MailweaveError::InvalidInput(format!("Ingest worker failed: {}", e)))?
            }));
        }

        let mut report = BatchReport::default();
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(MailweaveError::InvalidInput(format!("Ingest task failed: {}", e))),
            };
            match result {
                Ok(ingested) => {
                    report.ingested += 1;
                    report.outcomes.push(IngestOutcome::Stored(ingested));
                }
                Err(error) => {
                    warn!(index, "Failed to ingest message: {}", error);
                    report.failed += 1;
                    report.outcomes.push(IngestOutcome::Failed { error });
                }
            }
        }

        info!(
            total,
            ingested = report.ingested,
            failed = report.failed,
            workers = self.workers,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch ingest complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryThreadStore;
    use crate::adapters::mime::RawPart;
    use crate::types::{AnnotationRequest, Message, NewCalendarLink, ProcessedAnnotation};
    use crate::types::{ThreadHistory, ThreadSummary};

    fn ingestor(store: Arc<dyn ThreadStore>) -> Ingestor {
        Ingestor::new(Normalizer::default(), ThreadResolver::default(), store, 4)
    }

    fn memory_ingestor() -> Ingestor {
        ingestor(Arc::new(MemoryThreadStore::new()))
    }

    const ROOT: &[u8] = b"Message-ID: <root@x.com>\r\n\
From: Ann <a@x.com>\r\n\
To: team@x.com\r\n\
Subject: Budget Review\r\n\
Date: Mon, 2 Mar 2026 09:00:00 +0000\r\n\
\r\n\
Please review the attached budget numbers.\r\n";

    const REPLY: &[u8] = b"Message-ID: <reply@x.com>\r\n\
In-Reply-To: <root@x.com>\r\n\
From: Bob <b@x.com>\r\n\
To: a@x.com\r\n\
Subject: Re: Budget Review\r\n\
Date: Mon, 2 Mar 2026 10:00:00 +0000\r\n\
\r\n\
Looks good to me, approved.\r\n\
\r\n\
On Mon, Mar 2, 2026 at 9:00 AM Ann <a@x.com> wrote:\r\n\
> Please review the attached budget numbers.\r\n";

    #[test]
    fn test_reply_joins_thread() {
        let ingestor = memory_ingestor();
        let root = ingestor.ingest_bytes(ROOT).expect("ingest root");
        let reply = ingestor.ingest_bytes(REPLY).expect("ingest reply");

        assert_eq!(root.thread_id, "root@x.com");
        assert!(!root.is_reply);
        assert_eq!(reply.thread_id, "root@x.com");
        assert!(reply.is_reply);

        let summary = ingestor
            .store()
            .get_thread_summary("root@x.com")
            .expect("query")
            .expect("thread");
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.participants, ["a@x.com", "b@x.com"]);
        assert_eq!(summary.subject_root, "budget review");

        let stored = ingestor
            .store()
            .get_message(&reply.message_id)
            .expect("query")
            .expect("message");
        assert_eq!(stored.body_cleaned, "Looks good to me, approved.");
        assert_eq!(stored.in_reply_to.as_deref(), Some("root@x.com"));
        assert_eq!(stored.participants, ["a@x.com", "b@x.com"]);
        assert_eq!(stored.received_at.to_rfc3339(), "2026-03-02T10:00:00+00:00");
    }

    #[test]
    fn test_invalid_cleaned_text_keeps_raw_body() {
        let ingestor = memory_ingestor();
        let raw = RawMessage::new()
            .header("Message-ID", "<dots@x.com>")
            .header("From", "a@x.com")
            .header("Subject", "Signature only")
            .part(RawPart::new("text/plain", "...---"));

        let (message, _) = ingestor.prepare(&raw);
        assert_eq!(message.body_raw, "...---");
        assert_eq!(message.body_cleaned, message.body_raw);
    }

    #[test]
    fn test_html_and_plain_parts_join() {
        let ingestor = memory_ingestor();
        let raw = RawMessage::new()
            .header("Message-ID", "<mixed@x.com>")
            .header("From", "a@x.com")
            .header("Subject", "=?UTF-8?B?UXVhcnRlcmx5IHBsYW4=?=")
            .part(RawPart::new("text/plain", "Agenda for the quarterly planning"))
            .part(RawPart::new(
                "text/html",
                "<html><body><p>Room 4 at noon</p></body></html>",
            ))
            .part(RawPart::new("image/png", vec![0x89, 0x50, 0x4e, 0x47]))
            .part(
                RawPart::new("text/plain", "attachment text")
                    .with_disposition("attachment"),
            );

        let (message, info) = ingestor.prepare(&raw);
        assert_eq!(message.subject, "Quarterly plan");
        assert_eq!(info.subject_root, "quarterly plan");
        assert_eq!(
            message.body_cleaned,
            "Agenda for the quarterly planning Room 4 at noon"
        );
    }

    #[test]
    fn test_malformed_identity_degrades() {
        let ingestor = memory_ingestor();
        let raw = RawMessage::new()
            .header("Message-ID", "<bad\u{7}id@x.com>")
            .header("In-Reply-To", "<root@x.com>")
            .header("From", "a@x.com")
            .header("Subject", "Re: Broken")
            .part(RawPart::new("text/plain", "Body that is long enough"));

        let ingested = ingestor.ingest(&raw).expect("ingest");
        assert!(!ingested.is_reply);
        assert!(ingested.thread_id.starts_with("synthetic-"));

        let summary = ingestor
            .store()
            .get_thread_summary(&ingested.thread_id)
            .expect("query")
            .expect("thread");
        assert_eq!(summary.subject_root, "Re: Broken");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_threads_concurrent_replies() {
        let ingestor = memory_ingestor();
        ingestor.ingest_bytes(ROOT).expect("ingest root");

        let inputs: Vec<Vec<u8>> = (0..24)
            .map(|i| {
                format!(
                    "Message-ID: <r{i}@x.com>\r\n\
                     References: <root@x.com>\r\n\
                     From: user{n}@x.com\r\n\
                     Subject: Re: Budget Review\r\n\
                     \r\n\
                     Reply number {i} with some words.\r\n",
                    i = i,
                    n = i % 6
                )
                .into_bytes()
            })
            .collect();

        let report = ingestor.ingest_batch(inputs).await;
        assert_eq!(report.ingested, 24);
        assert_eq!(report.failed, 0);
        assert_eq!(report.outcomes.len(), 24);
        assert!(report.outcomes.iter().all(IngestOutcome::is_stored));

        let summary = ingestor
            .store()
            .get_thread_summary("root@x.com")
            .expect("query")
            .expect("thread");
        assert_eq!(summary.message_count, 25);
        assert_eq!(summary.participants.len(), 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_sqlite_backend() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = AppConfig::default();
        config.store = crate::config::StoreConfig::sqlite(dir.path().join("threads.db"));
        config.ingest.workers = 3;
        let ingestor = Ingestor::from_config(&config).expect("ingestor");

        let report = ingestor
            .ingest_batch(vec![ROOT.to_vec(), REPLY.to_vec(), b"garbage without headers".to_vec()])
            .await;
        assert_eq!(report.ingested, 3);

        let history = ingestor
            .store()
            .get_thread_history("root@x.com")
            .expect("history");
        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.messages[0].message.sender, "Ann <a@x.com>");
    }

    /// Fails inserts for one sender so batch isolation can be observed.
    struct FlakyStore {
        inner: MemoryThreadStore,
    }

    impl ThreadStore for FlakyStore {
        fn insert(&self, message: &NewMessage, info: &ThreadInfo) -> Result<String> {
            if message.sender_address() == "broken@x.com" {
                return Err(MailweaveError::Database("disk full".into()));
            }
            self.inner.insert(message, info)
        }
        fn link_reply(&self, reply_id: &str, original_id: &str) -> Result<()> {
            self.inner.link_reply(reply_id, original_id)
        }
        fn get_message(&self, id: &str) -> Result<Option<Message>> {
            self.inner.get_message(id)
        }
        fn get_thread_history(&self, thread_id: &str) -> Result<ThreadHistory> {
            self.inner.get_thread_history(thread_id)
        }
        fn get_thread_participants(&self, thread_id: &str) -> Result<Vec<String>> {
            self.inner.get_thread_participants(thread_id)
        }
        fn get_thread_summary(&self, thread_id: &str) -> Result<Option<ThreadSummary>> {
            self.inner.get_thread_summary(thread_id)
        }
        fn search_threads(&self, query: &str) -> Result<Vec<ThreadSummary>> {
            self.inner.search_threads(query)
        }
        fn get_recent_threads(&self, limit: usize) -> Result<Vec<ThreadSummary>> {
            self.inner.get_recent_threads(limit)
        }
        fn save_annotation(&self, annotation: &ProcessedAnnotation) -> Result<()> {
            self.inner.save_annotation(annotation)
        }
        fn save_calendar_link(&self, link: &NewCalendarLink) -> Result<String> {
            self.inner.save_calendar_link(link)
        }
        fn get_unannotated(&self, limit: usize) -> Result<Vec<AnnotationRequest>> {
            self.inner.get_unannotated(limit)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_message_does_not_abort_batch() {
        let ingestor = ingestor(Arc::new(FlakyStore {
            inner: MemoryThreadStore::new(),
        }));
        let broken = b"From: broken@x.com\r\nSubject: x\r\n\r\nThis one cannot be stored.\r\n";

        let report = ingestor
            .ingest_batch(vec![ROOT.to_vec(), broken.to_vec(), REPLY.to_vec()])
            .await;

        assert_eq!(report.ingested, 2);
        assert_eq!(report.failed, 1);
        assert!(report.outcomes[0].is_stored());
        assert!(matches!(
            &report.outcomes[1],
            IngestOutcome::Failed {
                error: MailweaveError::Database(_)
            }
        ));
        assert!(report.outcomes[2].is_stored());

        let json = serde_json::to_value(&report.outcomes[1]).expect("serialize");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Database error: disk full");
    }
}
