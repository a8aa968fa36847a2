//! Domain types for conversation summarization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient::{self, LooseRecord};
use crate::error::{SummarizeError, SummarizeResult};
use crate::ids::PatientId;

/// A transcript submitted for summarization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationInput {
    /// Speaker-labelled transcript text.
    pub conversation: String,
    /// Patient the transcript belongs to, for downstream persistence.
    pub patient_id: Option<PatientId>,
}

impl ConversationInput {
    /// Create an input without a patient reference.
    #[must_use]
    pub fn new(conversation: impl Into<String>) -> Self {
        Self {
            conversation: conversation.into(),
            patient_id: None,
        }
    }

    /// Attach a patient reference.
    #[must_use]
    pub fn with_patient(mut self, patient_id: PatientId) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    /// Reject empty or whitespace-only transcripts.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the transcript has no visible text.
    pub fn validate(&self) -> SummarizeResult<()> {
        if self.conversation.trim().is_empty() {
            return Err(SummarizeError::InvalidInput(
                "Conversation text cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Transcript length in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.conversation.chars().count()
    }
}

/// Symptoms reported during the conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Symptoms {
    /// Symptoms mentioned, primary complaint first.
    #[serde(deserialize_with = "lenient::string_list", alias = "symptoms")]
    pub current_symptoms: Vec<String>,
    /// How long the symptoms have been present.
    #[serde(deserialize_with = "lenient::string", alias = "duration")]
    pub symptom_duration: String,
    /// Reported severity.
    #[serde(deserialize_with = "lenient::string", alias = "severity")]
    pub symptom_severity: String,
    /// Pain level, usually on a 1-10 scale.
    #[serde(deserialize_with = "lenient::string", alias = "pain_level")]
    pub pain_scale: String,
}

impl Symptoms {
    /// No symptom information at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_symptoms.is_empty()
            && self.symptom_duration.is_empty()
            && self.symptom_severity.is_empty()
            && self.pain_scale.is_empty()
    }
}

impl LooseRecord for Symptoms {
    fn from_items(items: Vec<String>) -> Self {
        Self {
            current_symptoms: items,
            ..Self::default()
        }
    }
}

/// Medication, allergy and condition history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicalHistory {
    /// Medications the patient currently takes.
    #[serde(deserialize_with = "lenient::string_list", alias = "medications")]
    pub current_medications: Vec<String>,
    /// Known allergies.
    #[serde(deserialize_with = "lenient::string_list")]
    pub allergies: Vec<String>,
    /// Known or previous conditions.
    #[serde(
        deserialize_with = "lenient::string_list",
        alias = "conditions",
        alias = "known_conditions"
    )]
    pub previous_conditions: Vec<String>,
    /// Recent procedures.
    #[serde(deserialize_with = "lenient::string_list", alias = "procedures")]
    pub recent_procedures: Vec<String>,
}

impl MedicalHistory {
    /// No history information at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_medications.is_empty()
            && self.allergies.is_empty()
            && self.previous_conditions.is_empty()
            && self.recent_procedures.is_empty()
    }
}

impl LooseRecord for MedicalHistory {
    fn from_items(items: Vec<String>) -> Self {
        Self {
            previous_conditions: items,
            ..Self::default()
        }
    }
}

/// The fixed-shape record derived from a transcript.
///
/// Every field is always serialized, empty or not.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredSummary {
    /// Vital sign name to observed value.
    #[serde(deserialize_with = "lenient::string_map")]
    pub vitals: BTreeMap<String, String>,
    /// Reported symptoms.
    #[serde(deserialize_with = "lenient::record")]
    pub symptoms: Symptoms,
    /// Medications, allergies, conditions.
    #[serde(deserialize_with = "lenient::record")]
    pub medical_history: MedicalHistory,
    /// Concerns or questions raised by the patient.
    #[serde(deserialize_with = "lenient::string_list")]
    pub patient_concerns: Vec<String>,
    /// Observations made by the nurse.
    #[serde(deserialize_with = "lenient::string_list")]
    pub nurse_observations: Vec<String>,
    /// Auxiliary observations (mobility, mental state, ...).
    #[serde(deserialize_with = "lenient::string_map")]
    pub additional_characteristics: BTreeMap<String, String>,
    /// Short synopsis for clinician review.
    #[serde(deserialize_with = "lenient::string")]
    pub summary: String,
}

impl StructuredSummary {
    /// Top-level keys of the structured shape.
    pub const FIELDS: [&'static str; 7] = [
        "vitals",
        "symptoms",
        "medical_history",
        "patient_concerns",
        "nurse_observations",
        "additional_characteristics",
        "summary",
    ];

    /// Nothing was extracted into any field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vitals.is_empty()
            && self.symptoms.is_empty()
            && self.medical_history.is_empty()
            && self.patient_concerns.is_empty()
            && self.nurse_observations.is_empty()
            && self.additional_characteristics.is_empty()
            && self.summary.is_empty()
    }
}

/// Which parsing path produced a summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// A JSON object was found and parsed.
    Json,
    /// Labelled sections were extracted from prose.
    Sections,
}

/// Processing details attached to every result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// When parsing finished.
    pub processed_at: DateTime<Utc>,
    /// Model that produced the raw text.
    pub model_used: String,
    /// Transcript length in characters.
    pub conversation_length: usize,
    /// Reasoning the model emitted around its answer.
    pub thinking_process: String,
    /// How the summary was extracted.
    pub parse_strategy: ParseStrategy,
    /// Wall time from request start to parsed result.
    pub processing_time_seconds: f64,
    /// Unmodified backend output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// A structured summary plus how it was produced.
///
/// Serializes as the seven summary fields next to a `metadata` object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// The parsed summary.
    #[serde(flatten)]
    pub summary: StructuredSummary,
    /// Processing details.
    pub metadata: ProcessingMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_transcripts() {
        assert!(ConversationInput::new("").validate().is_err());
        assert!(matches!(
            ConversationInput::new(" \n\t ").validate(),
            Err(SummarizeError::InvalidInput(_))
        ));
        assert!(ConversationInput::new("Nurse: Hello").validate().is_ok());
    }

    #[test]
    fn test_empty_summary_serializes_every_field() {
        let value = serde_json::to_value(StructuredSummary::default()).unwrap();
        let object = value.as_object().unwrap();
        for field in StructuredSummary::FIELDS {
            assert!(object.contains_key(field), "missing {field}");
        }
        assert!(object["symptoms"].get("current_symptoms").is_some());
        assert!(object["medical_history"].get("allergies").is_some());
    }

    #[test]
    fn test_lenient_shapes_are_normalized() {
        let summary: StructuredSummary = serde_json::from_value(serde_json::json!({
            "vitals": {"heart_rate": 88, "temperature": "not mentioned", "weight": null},
            "symptoms": ["cough", "fatigue"],
            "medical_history": {"medications": "lisinopril", "allergies": ["penicillin"]},
            "patient_concerns": "Is the fever concerning?",
            "nurse_observations": null,
            "summary": "Persistent dry cough for one week."
        }))
        .unwrap();

        assert_eq!(summary.vitals.get("heart_rate").map(String::as_str), Some("88"));
        assert!(!summary.vitals.contains_key("temperature"));
        assert!(!summary.vitals.contains_key("weight"));
        assert_eq!(summary.symptoms.current_symptoms, vec!["cough", "fatigue"]);
        assert_eq!(summary.medical_history.current_medications, vec!["lisinopril"]);
        assert_eq!(summary.patient_concerns, vec!["Is the fever concerning?"]);
        assert!(summary.nurse_observations.is_empty());
        assert!(summary.additional_characteristics.is_empty());
    }

    #[test]
    fn test_report_flattens_summary_next_to_metadata() {
        let report = SummaryReport {
            summary: StructuredSummary {
                summary: "Headache since morning.".to_string(),
                ..StructuredSummary::default()
            },
            metadata: ProcessingMetadata {
                processed_at: Utc::now(),
                model_used: "qwen3:8b".to_string(),
                conversation_length: 42,
                thinking_process: String::new(),
                parse_strategy: ParseStrategy::Json,
                processing_time_seconds: 0.5,
                raw_response: None,
            },
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"], "Headache since morning.");
        assert_eq!(value["metadata"]["parse_strategy"], "json");
        assert!(value["metadata"].get("raw_response").is_none());

        let back: SummaryReport = serde_json::from_value(value).unwrap();
        assert_eq!(back.summary, report.summary);
    }
}
