//! In-memory thread store
//!
//! Each thread aggregate sits behind its own mutex, so writers to different
//! threads never wait on each other. Lock order is always: aggregates (sorted
//! by thread id), then messages, then annotations, then calendar links. The
//! thread map lock is never held while an aggregate is locked.
//!
//! Every aggregate keeps the ids of its messages, so per-thread reads never
//! scan the whole message map.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MailweaveError, Result};
use crate::store::ThreadStore;
use crate::types::{
    AnnotationRequest, CalendarLink, HistoryEntry, LatestMessage, Message, NewCalendarLink,
    NewMessage, ProcessedAnnotation, ThreadHistory, ThreadInfo, ThreadSummary,
};

type Messages = HashMap<String, StoredMessage>;
type Annotations = HashMap<String, ProcessedAnnotation>;

struct StoredMessage {
    /// Insertion order, the tie-breaker for equal `received_at`.
    seq: u64,
    message: Message,
}

impl StoredMessage {
    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.message.received_at, self.seq)
    }
}

struct ThreadAggregate {
    subject_root: String,
    senders: BTreeSet<String>,
    message_count: u64,
    last_updated: DateTime<Utc>,
    message_ids: Vec<String>,
}

impl ThreadAggregate {
    fn new(subject_root: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            subject_root: subject_root.to_string(),
            senders: BTreeSet::new(),
            message_count: 0,
            last_updated: received_at,
            message_ids: Vec::new(),
        }
    }

    fn record(&mut self, message: &Message, subject_root: &str) {
        if self.subject_root.is_empty() {
            self.subject_root = subject_root.to_string();
        }
        self.senders.insert(message.sender_address());
        self.message_count += 1;
        self.last_updated = self.last_updated.max(message.received_at);
        self.message_ids.push(message.id.clone());
    }

    fn members<'s, 'a>(
        &'s self,
        messages: &'a Messages,
    ) -> impl Iterator<Item = &'a StoredMessage> + use<'s, 'a> {
        self.message_ids.iter().filter_map(move |id| messages.get(id))
    }

    /// Recount from the message index after it changed.
    fn refresh(&mut self, messages: &Messages) {
        let current: Vec<&Message> = self.members(messages).map(|stored| &stored.message).collect();
        self.message_count = current.len() as u64;
        self.senders = current.iter().map(|m| m.sender_address()).collect();
        if let Some(latest) = current.iter().map(|m| m.received_at).max() {
            self.last_updated = self.last_updated.max(latest);
        }
    }
}

/// Most recently active first, thread id breaks ties.
fn recency(a: (DateTime<Utc>, &str), b: (DateTime<Utc>, &str)) -> std::cmp::Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[derive(Default)]
pub struct MemoryThreadStore {
    threads: RwLock<HashMap<String, Arc<Mutex<ThreadAggregate>>>>,
    messages: RwLock<Messages>,
    annotations: RwLock<Annotations>,
    calendar_links: RwLock<HashMap<String, Vec<CalendarLink>>>,
    next_seq: AtomicU64,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn aggregate(&self, thread_id: &str) -> Result<Option<Arc<Mutex<ThreadAggregate>>>> {
        let threads = self.threads.read()?;
        Ok(threads.get(thread_id).cloned())
    }

    fn aggregate_or_create(
        &self,
        thread_id: &str,
        subject_root: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Arc<Mutex<ThreadAggregate>>> {
        if let Some(entry) = self.aggregate(thread_id)? {
            return Ok(entry);
        }
        let mut threads = self.threads.write()?;
        let entry = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ThreadAggregate::new(subject_root, received_at))));
        Ok(Arc::clone(entry))
    }

    /// Build a summary from an already locked aggregate.
    fn summarize(
        thread_id: &str,
        aggregate: &ThreadAggregate,
        messages: &Messages,
        annotations: &Annotations,
    ) -> Option<ThreadSummary> {
        if aggregate.message_count == 0 {
            return None;
        }
        let first = aggregate.members(messages).map(|s| s.message.received_at).min()?;
        let latest = aggregate.members(messages).max_by_key(|s| s.order_key())?;
        let annotation = annotations.get(&latest.message.id);

        Some(ThreadSummary {
            thread_id: thread_id.to_string(),
            subject_root: aggregate.subject_root.clone(),
            participants: aggregate.senders.iter().cloned().collect(),
            message_count: aggregate.message_count,
            first_message_at: first,
            last_message_at: latest.message.received_at,
            last_updated: aggregate.last_updated,
            latest: Some(LatestMessage {
                message_id: latest.message.id.clone(),
                subject: latest.message.subject.clone(),
                sender: latest.message.sender.clone(),
                summary: annotation.and_then(|a| a.summary.clone()),
                intent: annotation.and_then(|a| a.intent.clone()),
            }),
        })
    }

    fn summary(&self, thread_id: &str) -> Result<Option<ThreadSummary>> {
        let Some(entry) = self.aggregate(thread_id)? else {
            return Ok(None);
        };
        let aggregate = entry.lock()?;
        let messages = self.messages.read()?;
        let annotations = self.annotations.read()?;
        Ok(Self::summarize(thread_id, &aggregate, &messages, &annotations))
    }

    /// Summaries of `ids`, skipping empty threads, most recently active first.
    fn ranked_summaries(&self, ids: impl IntoIterator<Item = String>) -> Result<Vec<ThreadSummary>> {
        let mut summaries = Vec::new();
        for id in ids {
            if let Some(summary) = self.summary(&id)? {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| {
            recency(
                (a.last_updated, a.thread_id.as_str()),
                (b.last_updated, b.thread_id.as_str()),
            )
        });
        Ok(summaries)
    }

    fn ensure_message(&self, id: &str) -> Result<()> {
        if self.messages.read()?.contains_key(id) {
            Ok(())
        } else {
            Err(MailweaveError::MessageNotFound(id.to_string()))
        }
    }

    fn thread_ids_of(&self, reply_id: &str, original_id: &str) -> Result<(String, String)> {
        let messages = self.messages.read()?;
        let reply = messages
            .get(reply_id)
            .ok_or_else(|| MailweaveError::MessageNotFound(reply_id.to_string()))?;
        let original = messages
            .get(original_id)
            .ok_or_else(|| MailweaveError::MessageNotFound(original_id.to_string()))?;
        Ok((reply.message.thread_id.clone(), original.message.thread_id.clone()))
    }
}

impl ThreadStore for MemoryThreadStore {
    fn insert(&self, message: &NewMessage, info: &ThreadInfo) -> Result<String> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let stored = Message::assemble(Uuid::new_v4().to_string(), message, info);
        let id = stored.id.clone();
        let thread_id = stored.thread_id.clone();

        let entry = self.aggregate_or_create(&thread_id, &info.subject_root, stored.received_at)?;
        let mut aggregate = entry.lock()?;
        let mut messages = self.messages.write()?;
        aggregate.record(&stored, &info.subject_root);
        messages.insert(id.clone(), StoredMessage { seq, message: stored });

        debug!(message_id = %id, thread_id = %thread_id, "Stored message in memory");
        Ok(id)
    }

    fn link_reply(&self, reply_id: &str, original_id: &str) -> Result<()> {
        if reply_id == original_id {
            return Err(MailweaveError::InvalidInput(format!(
                "Cannot link message {} to itself",
                reply_id
            )));
        }

        loop {
            let (from_thread, to_thread) = self.thread_ids_of(reply_id, original_id)?;

            let mut ids = vec![from_thread.clone(), to_thread.clone()];
            ids.sort();
            ids.dedup();
            let mut entries = Vec::with_capacity(ids.len());
            for id in &ids {
                let entry = self.aggregate(id)?.ok_or_else(|| {
                    MailweaveError::Database(format!("Missing aggregate for thread {}", id))
                })?;
                entries.push(entry);
            }
            let mut guards = Vec::with_capacity(entries.len());
            for entry in &entries {
                guards.push(entry.lock()?);
            }
            let mut messages = self.messages.write()?;

            // Another writer may have moved either message before we locked.
            let (identity, mut chain) = match (messages.get(reply_id), messages.get(original_id)) {
                (Some(reply), Some(original))
                    if reply.message.thread_id == from_thread
                        && original.message.thread_id == to_thread =>
                {
                    (
                        original.message.message_identity.clone(),
                        original.message.reference_chain.clone(),
                    )
                }
                _ => continue,
            };
            chain.push(identity.clone());

            if let Some(reply) = messages.get_mut(reply_id) {
                reply.message.thread_id = to_thread.clone();
                reply.message.in_reply_to = Some(identity);
                reply.message.reference_chain = chain;
            }
            if from_thread != to_thread {
                for (id, guard) in ids.iter().zip(guards.iter_mut()) {
                    if *id == from_thread {
                        guard.message_ids.retain(|m| m != reply_id);
                    } else {
                        guard.message_ids.push(reply_id.to_string());
                    }
                    guard.refresh(&messages);
                }
            }

            info!(
                reply_id,
                original_id, from_thread = %from_thread, to_thread = %to_thread, "Linked reply"
            );
            return Ok(());
        }
    }

    fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let messages = self.messages.read()?;
        Ok(messages.get(id).map(|stored| stored.message.clone()))
    }

    fn get_thread_history(&self, thread_id: &str) -> Result<ThreadHistory> {
        let not_found = || MailweaveError::ThreadNotFound(thread_id.to_string());
        let entry = self.aggregate(thread_id)?.ok_or_else(not_found)?;

        let aggregate = entry.lock()?;
        let messages = self.messages.read()?;
        let annotations = self.annotations.read()?;
        let calendar_links = self.calendar_links.read()?;

        let summary =
            Self::summarize(thread_id, &aggregate, &messages, &annotations).ok_or_else(not_found)?;

        let mut ordered: Vec<&StoredMessage> = aggregate.members(&messages).collect();
        ordered.sort_by_key(|stored| stored.order_key());
        let entries = ordered
            .into_iter()
            .map(|stored| HistoryEntry {
                message: stored.message.clone(),
                annotation: annotations.get(&stored.message.id).cloned(),
                calendar_links: calendar_links
                    .get(&stored.message.id)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();

        Ok(ThreadHistory {
            summary,
            messages: entries,
        })
    }

    fn get_thread_participants(&self, thread_id: &str) -> Result<Vec<String>> {
        let Some(entry) = self.aggregate(thread_id)? else {
            return Ok(Vec::new());
        };
        let aggregate = entry.lock()?;
        let messages = self.messages.read()?;
        let mut first_seen: HashMap<String, (DateTime<Utc>, u64)> = HashMap::new();
        for stored in aggregate.members(&messages) {
            let key = stored.order_key();
            first_seen
                .entry(stored.message.sender_address())
                .and_modify(|seen| *seen = (*seen).min(key))
                .or_insert(key);
        }

        let mut senders: Vec<(String, (DateTime<Utc>, u64))> = first_seen.into_iter().collect();
        senders.sort_by_key(|(_, seen)| *seen);
        Ok(senders.into_iter().map(|(sender, _)| sender).collect())
    }

    fn get_thread_summary(&self, thread_id: &str) -> Result<Option<ThreadSummary>> {
        self.summary(thread_id)
    }

    fn search_threads(&self, query: &str) -> Result<Vec<ThreadSummary>> {
        let needle = query.to_lowercase();
        let hits: BTreeSet<String> = {
            let messages = self.messages.read()?;
            let annotations = self.annotations.read()?;
            messages
                .values()
                .map(|stored| &stored.message)
                .filter(|m| {
                    contains_ignore_case(&m.subject, &needle)
                        || contains_ignore_case(&m.body_cleaned, &needle)
                        || annotations
                            .get(&m.id)
                            .and_then(|a| a.summary.as_deref())
                            .is_some_and(|s| contains_ignore_case(s, &needle))
                })
                .map(|m| m.thread_id.clone())
                .collect()
        };

        let summaries = self.ranked_summaries(hits)?;
        debug!(query, hits = summaries.len(), "Searched threads");
        Ok(summaries)
    }

    fn get_recent_threads(&self, limit: usize) -> Result<Vec<ThreadSummary>> {
        let entries: Vec<(String, Arc<Mutex<ThreadAggregate>>)> = self
            .threads
            .read()?
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        // Rank on the aggregates alone, then summarize only the top `limit`.
        let mut ranked = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            let aggregate = entry.lock()?;
            if aggregate.message_count > 0 {
                ranked.push((aggregate.last_updated, id));
            }
        }
        ranked.sort_by(|a, b| recency((a.0, a.1.as_str()), (b.0, b.1.as_str())));
        ranked.truncate(limit);

        self.ranked_summaries(ranked.into_iter().map(|(_, id)| id))
    }

    fn save_annotation(&self, annotation: &ProcessedAnnotation) -> Result<()> {
        self.ensure_message(&annotation.message_id)?;
        let mut annotations = self.annotations.write()?;
        annotations.insert(annotation.message_id.clone(), annotation.clone());
        Ok(())
    }

    fn save_calendar_link(&self, link: &NewCalendarLink) -> Result<String> {
        self.ensure_message(&link.message_id)?;
        let id = Uuid::new_v4().to_string();
        let mut links = self.calendar_links.write()?;
        links
            .entry(link.message_id.clone())
            .or_default()
            .push(CalendarLink::from_new(id.clone(), link));
        Ok(id)
    }

    fn get_unannotated(&self, limit: usize) -> Result<Vec<AnnotationRequest>> {
        let pending: Vec<Message> = {
            let messages = self.messages.read()?;
            let annotations = self.annotations.read()?;
            let mut pending: Vec<&StoredMessage> = messages
                .values()
                .filter(|stored| !annotations.contains_key(&stored.message.id))
                .collect();
            pending.sort_by_key(|stored| stored.order_key());
            pending
                .into_iter()
                .take(limit)
                .map(|stored| stored.message.clone())
                .collect()
        };

        let mut requests = Vec::with_capacity(pending.len());
        for message in pending {
            let subject_root = match self.aggregate(&message.thread_id)? {
                Some(entry) => entry.lock()?.subject_root.clone(),
                None => String::new(),
            };
            requests.push(AnnotationRequest::for_message(&message, &subject_root));
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_insert_and_aggregate() {
        conformance::insert_and_aggregate(&MemoryThreadStore::new());
    }

    #[test]
    fn test_history_order_and_joins() {
        conformance::history_order_and_joins(&MemoryThreadStore::new());
    }

    #[test]
    fn test_participants_first_appearance() {
        conformance::participants_first_appearance(&MemoryThreadStore::new());
    }

    #[test]
    fn test_summary_unknown_thread() {
        conformance::summary_unknown_thread(&MemoryThreadStore::new());
    }

    #[test]
    fn test_search_threads() {
        conformance::search_threads(&MemoryThreadStore::new());
    }

    #[test]
    fn test_recent_threads() {
        conformance::recent_threads(&MemoryThreadStore::new());
    }

    #[test]
    fn test_link_reply_moves_aggregates() {
        conformance::link_reply_moves_aggregates(&MemoryThreadStore::new());
    }

    #[test]
    fn test_link_reply_errors() {
        conformance::link_reply_errors(&MemoryThreadStore::new());
    }

    #[test]
    fn test_annotation_queue() {
        conformance::annotation_queue(&MemoryThreadStore::new());
    }

    #[test]
    fn test_last_updated_monotonic() {
        conformance::last_updated_monotonic(&MemoryThreadStore::new());
    }

    #[test]
    fn test_degraded_thread_filed_under_identity() {
        conformance::degraded_thread_filed_under_identity(&MemoryThreadStore::new());
    }

    #[test]
    fn test_concurrent_inserts() {
        conformance::concurrent_inserts(&MemoryThreadStore::new());
    }

    #[test]
    fn test_recent_threads_out_of_many() {
        let store = MemoryThreadStore::new();
        for i in 0..200 {
            // minutes go up and down so insertion order is not recency order
            let minutes = (i * 37) % 200;
            store
                .insert(
                    &conformance::message("a@x.com", "s", "some body text", minutes),
                    &conformance::info(&format!("T{:03}", minutes), &format!("m{}", i)),
                )
                .expect("insert");
        }
        let recent: Vec<String> = store
            .get_recent_threads(3)
            .expect("recent")
            .into_iter()
            .map(|s| s.thread_id)
            .collect();
        assert_eq!(recent, ["T199", "T198", "T197"]);
        assert_eq!(store.get_recent_threads(500).expect("recent").len(), 200);
        assert!(store.get_recent_threads(0).expect("recent").is_empty());
    }

    #[test]
    fn test_message_index_follows_link_reply() {
        let store = MemoryThreadStore::new();
        let original = store
            .insert(&conformance::message("a@x.com", "Plan", "original", 0), &conformance::info("T1", "m1"))
            .expect("insert");
        let orphan = store
            .insert(&conformance::message("b@x.com", "Re: Plan", "orphan", 5), &conformance::info("T2", "m2"))
            .expect("insert");
        store.link_reply(&orphan, &original).expect("link");

        let history = store.get_thread_history("T1").expect("history");
        let ids: Vec<&str> = history.messages.iter().map(|e| e.message.id.as_str()).collect();
        assert_eq!(ids, [original.as_str(), orphan.as_str()]);
        assert_eq!(store.get_thread_participants("T1").expect("participants"), ["a@x.com", "b@x.com"]);
        assert!(store.get_thread_participants("T2").expect("participants").is_empty());
        assert!(store.get_recent_threads(10).expect("recent").iter().all(|s| s.thread_id == "T1"));
    }

    #[test]
    fn test_concurrent_link_and_insert() {
        let store = MemoryThreadStore::new();
        let original = store
            .insert(
                &conformance::message("a@x.com", "Plan", "original body", 0),
                &conformance::info("T1", "m1"),
            )
            .expect("insert");
        let orphans: Vec<String> = (0..10)
            .map(|i| {
                store
                    .insert(
                        &conformance::message(&format!("o{}@x.com", i), "Re: Plan", "orphan", i + 1),
                        &conformance::info(&format!("T-orphan-{}", i), &format!("o{}", i)),
                    )
                    .expect("insert orphan")
            })
            .collect();

        std::thread::scope(|scope| {
            for orphan in &orphans {
                let store = &store;
                let original = &original;
                scope.spawn(move || store.link_reply(orphan, original).expect("link"));
            }
            scope.spawn(|| {
                for i in 0..10 {
                    store
                        .insert(
                            &conformance::message("a@x.com", "Re: Plan", "follow-up", 20 + i),
                            &conformance::info("T1", &format!("f{}", i)),
                        )
                        .expect("insert follow-up");
                }
            });
        });

        let summary = store.get_thread_summary("T1").expect("query").expect("thread");
        assert_eq!(summary.message_count, 21);
        assert_eq!(summary.participants.len(), 11);
        assert_eq!(store.get_recent_threads(50).expect("recent").len(), 1);
    }
}
