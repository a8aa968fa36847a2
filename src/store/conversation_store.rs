//! Conversation record store.
//!
//! Summaries for identified patients are handed to a [`ConversationStore`].
//! The in-memory implementation keeps records per patient in a `DashMap`; a
//! document-database implementation plugs in behind the same trait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ids::{PatientId, RecordId};
use crate::summary::SummaryReport;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The patient already has the maximum number of stored records.
    #[error("patient {patient_id} already has {max} stored conversations")]
    CapacityExceeded {
        /// Patient whose record was rejected.
        patient_id: PatientId,
        /// Configured limit.
        max: usize,
    },
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A summarized conversation kept for a patient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Patient the conversation belongs to.
    pub patient_id: PatientId,
    /// Original transcript.
    pub conversation_text: String,
    /// Summary produced for it.
    pub summary: SummaryReport,
    /// When the conversation was recorded.
    pub conversation_date: DateTime<Utc>,
}

impl ConversationRecord {
    /// Create a record dated now.
    #[must_use]
    pub fn new(patient_id: PatientId, conversation_text: String, summary: SummaryReport) -> Self {
        Self {
            id: RecordId::new(),
            patient_id,
            conversation_text,
            summary,
            conversation_date: Utc::now(),
        }
    }
}

/// Persistence collaborator for summarized conversations.
pub trait ConversationStore: Send + Sync {
    /// Save a record.
    ///
    /// # Errors
    /// Returns an error if the record cannot be stored.
    fn save(&self, record: ConversationRecord) -> StoreFuture<'_, StoreResult<RecordId>>;

    /// Records for a patient, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_for_patient<'a>(
        &'a self,
        patient_id: &'a PatientId,
    ) -> StoreFuture<'a, StoreResult<Vec<ConversationRecord>>>;
}

/// Process-local store. Records are lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    records: Arc<DashMap<PatientId, Vec<ConversationRecord>>>,
    max_per_patient: Option<usize>,
}

impl InMemoryConversationStore {
    /// Create an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit how many records each patient may have.
    #[must_use]
    pub const fn with_max_per_patient(mut self, max: usize) -> Self {
        self.max_per_patient = Some(max);
        self
    }

    /// Total records across all patients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    /// No records stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn save(&self, record: ConversationRecord) -> StoreFuture<'_, StoreResult<RecordId>> {
        Box::pin(async move {
            let mut entry = self.records.entry(record.patient_id.clone()).or_default();
            if let Some(max) = self.max_per_patient {
                if entry.len() >= max {
                    return Err(StoreError::CapacityExceeded {
                        patient_id: record.patient_id,
                        max,
                    });
                }
            }
            let id = record.id;
            debug!(record_id = %id, patient_id = %record.patient_id, "Conversation record stored");
            entry.push(record);
            Ok(id)
        })
    }

    fn list_for_patient<'a>(
        &'a self,
        patient_id: &'a PatientId,
    ) -> StoreFuture<'a, StoreResult<Vec<ConversationRecord>>> {
        Box::pin(async move {
            let mut records = self
                .records
                .get(patient_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default();
            // Insertion order breaks ties between identical timestamps.
            records.reverse();
            records.sort_by(|a, b| b.conversation_date.cmp(&a.conversation_date));
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{ParseStrategy, ProcessingMetadata, StructuredSummary};

    fn report(text: &str) -> SummaryReport {
        SummaryReport {
            summary: StructuredSummary {
                summary: text.to_string(),
                ..StructuredSummary::default()
            },
            metadata: ProcessingMetadata {
                processed_at: Utc::now(),
                model_used: "scripted".to_string(),
                conversation_length: 10,
                thinking_process: String::new(),
                parse_strategy: ParseStrategy::Json,
                processing_time_seconds: 0.1,
                raw_response: None,
            },
        }
    }

    fn patient(raw: &str) -> PatientId {
        PatientId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_per_patient() {
        let store = InMemoryConversationStore::new();
        let alice = patient("pt-001");
        let bob = patient("pt-002");

        let mut older = ConversationRecord::new(alice.clone(), "first".into(), report("first"));
        older.conversation_date -= chrono::TimeDelta::minutes(5);
        store.save(older).await.unwrap();
        store
            .save(ConversationRecord::new(alice.clone(), "second".into(), report("second")))
            .await
            .unwrap();
        store
            .save(ConversationRecord::new(bob.clone(), "other".into(), report("other")))
            .await
            .unwrap();

        let records = store.list_for_patient(&alice).await.unwrap();
        let texts: Vec<&str> = records.iter().map(|r| r.conversation_text.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(store.list_for_patient(&bob).await.unwrap().len(), 1);
        assert!(
            store
                .list_for_patient(&patient("pt-unknown"))
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_capacity_limit_rejects_extra_records() {
        let store = InMemoryConversationStore::new().with_max_per_patient(1);
        let id = patient("pt-001");

        store
            .save(ConversationRecord::new(id.clone(), "a".into(), report("a")))
            .await
            .unwrap();
        let err = store
            .save(ConversationRecord::new(id.clone(), "b".into(), report("b")))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::CapacityExceeded { max: 1, .. }));
        assert_eq!(store.list_for_patient(&id).await.unwrap().len(), 1);
    }
}
