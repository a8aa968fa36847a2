//! Forgiving parser turning raw model text into a [`StructuredSummary`].
//!
//! Parsing order:
//! 1. Reasoning blocks (`<think>` and friends) are split off.
//! 2. Candidate JSON spans are located: fenced code blocks, then balanced
//!    top-level objects, then the first-`{`-to-last-`}` slice.
//! 3. Each candidate is parsed strictly (with one trailing-comma repair). The
//!    object carrying the most summary keys wins.
//! 4. Otherwise labelled sections (`Summary:`, `## Symptoms`, bullets, vital
//!    sign labels) are extracted line by line.
//! 5. If nothing was extracted, the output is rejected.
//!
//! The parser holds only compiled patterns; parsing the same text twice yields
//! the same result.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::lenient;
use super::types::{ParseStrategy, StructuredSummary};
use crate::error::{SummarizeError, SummarizeResult};

/// Reported when the model gave no reasoning of its own.
pub const NO_THINKING: &str = "No explicit thinking process captured";

/// Prose longer than this before the first `{` counts as reasoning.
const THINKING_PREFIX_MIN_CHARS: usize = 100;

/// Tags models use to wrap their reasoning.
const THINKING_TAGS: [&str; 4] = ["think", "thinking", "reasoning", "analysis"];

/// Result of a successful parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedOutput {
    /// The extracted summary.
    pub summary: StructuredSummary,
    /// Reasoning found around the answer.
    pub thinking_process: String,
    /// Which path produced the summary.
    pub strategy: ParseStrategy,
}

/// Field a labelled line feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Summary,
    Vitals,
    Vital(&'static str),
    Symptoms,
    SymptomDuration,
    SymptomSeverity,
    PainScale,
    History,
    Medications,
    Allergies,
    Conditions,
    Procedures,
    Concerns,
    Observations,
    Additional,
}

impl Slot {
    /// Section that following unlabelled lines belong to.
    const fn section(self) -> Self {
        match self {
            Self::Vital(_) => Self::Vitals,
            other => other,
        }
    }
}

/// A label pattern mapped to the field it feeds.
struct LabelRule {
    pattern: Regex,
    slot: Slot,
}

/// Patterns for one reasoning tag.
///
/// Models cut off by the token budget leave the opening tag unclosed; some
/// chat templates strip the opening tag and leave only the closing one.
struct ThinkingTag {
    closed: Regex,
    unclosed: Regex,
    orphan_close: Regex,
}

impl ThinkingTag {
    fn new(tag: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            closed: Regex::new(&format!(r"(?is)<{tag}>(.*?)</{tag}>"))?,
            unclosed: Regex::new(&format!(r"(?is)<{tag}>(.*)\z"))?,
            orphan_close: Regex::new(&format!(r"(?is)\A(.*?)</{tag}>"))?,
        })
    }
}

/// Compiled patterns for the forgiving parse.
pub struct OutputParser {
    thinking_tags: Vec<ThinkingTag>,
    fence: Regex,
    trailing_comma: Regex,
    quoted_label: Regex,
    plain_label: Regex,
    bullet: Regex,
    labels: Vec<LabelRule>,
}

impl OutputParser {
    /// Compile every pattern.
    ///
    /// # Errors
    /// Returns an error if any regex pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        let thinking_tags = THINKING_TAGS
            .iter()
            .copied()
            .map(ThinkingTag::new)
            .collect::<Result<Vec<_>, _>>()?;

        let rule = |pattern: &str, slot: Slot| -> Result<LabelRule, regex::Error> {
            Ok(LabelRule {
                pattern: Regex::new(&format!("^(?:{pattern})$"))?,
                slot,
            })
        };

        // Labels are lowercased with underscores turned into spaces before matching.
        let labels = vec![
            rule(r"(brief |overall |clinical |short )?summary", Slot::Summary)?,
            rule(r"vitals?|vital signs", Slot::Vitals)?,
            rule(r"blood pressure|bp", Slot::Vital("blood_pressure"))?,
            rule(r"heart rate|pulse( rate)?|hr", Slot::Vital("heart_rate"))?,
            rule(r"temp(erature)?", Slot::Vital("temperature"))?,
            rule(
                r"oxygen saturation|o2 sat(uration)?|spo2|sp02|oxygen",
                Slot::Vital("oxygen_saturation"),
            )?,
            rule(r"respiratory rate|respirations|resp rate|rr", Slot::Vital("respiratory_rate"))?,
            rule(r"weight", Slot::Vital("weight"))?,
            rule(r"height", Slot::Vital("height"))?,
            rule(
                r"(current |reported )?symptoms|chief complaint|presenting complaint",
                Slot::Symptoms,
            )?,
            rule(r"(symptom )?duration|onset", Slot::SymptomDuration)?,
            rule(r"(symptom )?severity", Slot::SymptomSeverity)?,
            rule(r"pain( scale| level| score)?", Slot::PainScale)?,
            rule(r"(medical |patient )?history", Slot::History)?,
            rule(r"(current )?medications|meds", Slot::Medications)?,
            rule(r"(known )?allergies", Slot::Allergies)?,
            rule(
                r"(previous |known |existing |chronic )?conditions|past medical history",
                Slot::Conditions,
            )?,
            rule(r"(recent )?procedures|surgeries", Slot::Procedures)?,
            rule(r"(patient )?concerns|patient questions", Slot::Concerns)?,
            rule(r"(nurse |nursing |clinical )?observations", Slot::Observations)?,
            rule(
                r"additional (characteristics|information|notes|details)",
                Slot::Additional,
            )?,
        ];

        Ok(Self {
            thinking_tags,
            fence: Regex::new(r"(?s)```[A-Za-z]*\s*(\{.*?\})\s*```")?,
            trailing_comma: Regex::new(r",(\s*[}\]])")?,
            quoted_label: Regex::new(r#"^"([^"]{1,64})"\s*:\s*(.*)$"#)?,
            plain_label: Regex::new(r"^([A-Za-z][A-Za-z0-9 _/&'()-]{0,48}?)\s*:\s*(.*)$")?,
            bullet: Regex::new(r"^(?:[-*+\x{2022}]|\d{1,2}[.)])\s+(.+)$")?,
            labels,
        })
    }

    /// Parse raw model text into a summary.
    ///
    /// # Errors
    /// Returns `MalformedModelOutput` if neither a summary object nor any
    /// labelled section can be found.
    pub fn parse(&self, raw: &str) -> SummarizeResult<ParsedOutput> {
        if raw.trim().is_empty() {
            return Err(SummarizeError::MalformedModelOutput(
                "model returned an empty response".to_string(),
            ));
        }

        let (thinking_process, body) = self.extract_thinking(raw);
        if body.trim().is_empty() {
            return Err(SummarizeError::MalformedModelOutput(
                "model output contained only reasoning".to_string(),
            ));
        }

        if let Some(summary) = self.parse_json(&body) {
            debug!("Parsed model output as JSON");
            return Ok(ParsedOutput {
                summary,
                thinking_process,
                strategy: ParseStrategy::Json,
            });
        }

        let summary = self.parse_sections(&body);
        if summary.is_empty() {
            return Err(SummarizeError::MalformedModelOutput(
                "no summary object or labelled sections found in model output".to_string(),
            ));
        }

        debug!("Parsed model output from labelled sections");
        Ok(ParsedOutput {
            summary,
            thinking_process,
            strategy: ParseStrategy::Sections,
        })
    }

    /// Split reasoning from the answer. Returns `(thinking, remaining text)`.
    fn extract_thinking(&self, raw: &str) -> (String, String) {
        let mut blocks = Vec::new();
        let mut body = raw.to_string();

        for tag in &self.thinking_tags {
            for caps in tag.closed.captures_iter(&body) {
                push_block(&mut blocks, caps.get(1).map(|m| m.as_str()));
            }
            body = tag.closed.replace_all(&body, "").into_owned();

            // Closing tag with no opening one: everything before it is reasoning.
            if let Some(caps) = tag.orphan_close.captures(&body) {
                push_block(&mut blocks, caps.get(1).map(|m| m.as_str()));
                let end = caps.get(0).map_or(0, |m| m.end());
                body = body[end..].to_string();
            }

            // Opening tag never closed: reasoning runs to the end of the text.
            if let Some(caps) = tag.unclosed.captures(&body) {
                push_block(&mut blocks, caps.get(1).map(|m| m.as_str()));
                let start = caps.get(0).map_or(body.len(), |m| m.start());
                body.truncate(start);
            }
        }

        if !blocks.is_empty() {
            return (blocks.join("\n\n"), body);
        }

        let prefix = body.find('{').map_or("", |idx| body[..idx].trim());
        if prefix.chars().count() > THINKING_PREFIX_MIN_CHARS {
            return (prefix.to_string(), body);
        }

        (NO_THINKING.to_string(), body)
    }

    /// Candidate spans in preference order, without duplicates.
    fn json_candidates<'a>(&self, text: &'a str) -> (Vec<&'a str>, Vec<&'a str>) {
        let fenced: Vec<&str> = self
            .fence
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();

        let mut loose = balanced_objects(text);
        if let (Some(first), Some(last)) = (text.find('{'), text.rfind('}')) {
            if first < last {
                loose.push(&text[first..=last]);
            }
        }
        loose.retain(|span| !fenced.contains(span));
        loose.dedup();

        (fenced, loose)
    }

    fn parse_json(&self, text: &str) -> Option<StructuredSummary> {
        let (fenced, loose) = self.json_candidates(text);
        self.best_candidate(&fenced)
            .or_else(|| self.best_candidate(&loose))
    }

    /// The candidate with the most summary keys; later candidates win ties.
    fn best_candidate(&self, candidates: &[&str]) -> Option<StructuredSummary> {
        let mut best: Option<(usize, serde_json::Map<String, Value>)> = None;

        for candidate in candidates {
            let Some((score, object)) = self.parse_object(candidate).and_then(summary_object)
            else {
                continue;
            };
            if best.as_ref().is_none_or(|(top, _)| score >= *top) {
                best = Some((score, object));
            }
        }

        let (_, object) = best?;
        match serde_json::from_value(Value::Object(object)) {
            Ok(summary) => Some(summary),
            Err(e) => {
                debug!("Summary object rejected: {e}");
                None
            }
        }
    }

    fn parse_object(&self, span: &str) -> Option<serde_json::Map<String, Value>> {
        let value = serde_json::from_str::<Value>(span).or_else(|_| {
            let repaired = self.trailing_comma.replace_all(span, "$1");
            serde_json::from_str::<Value>(&repaired)
        });
        match value {
            Ok(Value::Object(object)) => Some(object),
            _ => None,
        }
    }

    fn parse_sections(&self, text: &str) -> StructuredSummary {
        let mut builder = SectionBuilder::default();

        for raw_line in text.lines() {
            let line = normalize_line(raw_line);
            if line.is_empty() || line.chars().all(|c| matches!(c, '{' | '}' | '[' | ']' | ',')) {
                continue;
            }

            let (is_bullet, content) = match self.bullet.captures(&line) {
                Some(caps) => (true, caps.get(1).map_or("", |m| m.as_str()).trim()),
                None => (false, line.as_str()),
            };

            if let Some((label, value)) = self.split_label(content) {
                match self.classify(&label) {
                    Some(slot) => {
                        builder.current = Some(slot.section());
                        builder.apply(slot, &value);
                    }
                    None => builder.apply_pair(&label, &value),
                }
                continue;
            }

            let bare = content.trim_end_matches(':').trim().trim_matches('"');
            if !is_bullet {
                if let Some(slot) = self.classify(bare) {
                    builder.current = Some(slot.section());
                    continue;
                }
            }

            if let Some(slot) = builder.current {
                builder.apply(slot, bare);
            }
        }

        builder.summary
    }

    /// Split `Label: value` or `"key": value` into its parts.
    fn split_label(&self, line: &str) -> Option<(String, String)> {
        let caps = self
            .quoted_label
            .captures(line)
            .or_else(|| self.plain_label.captures(line))?;
        let label = caps.get(1)?.as_str().trim().to_string();
        let value = normalize_value(caps.get(2).map_or("", |m| m.as_str()));
        Some((label, value))
    }

    fn classify(&self, label: &str) -> Option<Slot> {
        let label = normalize_label(label);
        if label.is_empty() {
            return None;
        }
        self.labels
            .iter()
            .find(|rule| rule.pattern.is_match(&label))
            .map(|rule| rule.slot)
    }
}

/// Accumulates section content into a summary.
#[derive(Default)]
struct SectionBuilder {
    summary: StructuredSummary,
    current: Option<Slot>,
}

impl SectionBuilder {
    fn apply(&mut self, slot: Slot, value: &str) {
        let Some(value) = lenient::clean(value) else {
            return;
        };
        let summary = &mut self.summary;
        match slot {
            Slot::Summary => append_text(&mut summary.summary, &value),
            Slot::Vitals => append_note(&mut summary.vitals, &value),
            Slot::Vital(key) => {
                summary.vitals.insert(key.to_string(), value);
            }
            Slot::Symptoms => summary.symptoms.current_symptoms.extend(split_items(&value)),
            Slot::SymptomDuration => append_text(&mut summary.symptoms.symptom_duration, &value),
            Slot::SymptomSeverity => append_text(&mut summary.symptoms.symptom_severity, &value),
            Slot::PainScale => append_text(&mut summary.symptoms.pain_scale, &value),
            Slot::History | Slot::Conditions => summary
                .medical_history
                .previous_conditions
                .extend(split_items(&value)),
            Slot::Medications => summary
                .medical_history
                .current_medications
                .extend(split_items(&value)),
            Slot::Allergies => summary.medical_history.allergies.extend(split_items(&value)),
            Slot::Procedures => summary
                .medical_history
                .recent_procedures
                .extend(split_items(&value)),
            Slot::Concerns => summary.patient_concerns.push(value),
            Slot::Observations => summary.nurse_observations.push(value),
            Slot::Additional => append_note(&mut summary.additional_characteristics, &value),
        }
    }

    /// A `label: value` line whose label is not a known field.
    fn apply_pair(&mut self, label: &str, value: &str) {
        if value.is_empty() {
            // Unknown heading: stop feeding the previous section.
            self.current = None;
            return;
        }
        if lenient::is_placeholder(value) {
            return;
        }
        match self.current {
            Some(Slot::Vitals) => {
                self.summary.vitals.insert(snake_key(label), value.to_string());
            }
            Some(Slot::Additional) => {
                self.summary
                    .additional_characteristics
                    .insert(snake_key(label), value.to_string());
            }
            Some(slot) => self.apply(slot, &format!("{label}: {value}")),
            None => {}
        }
    }
}

fn push_block(blocks: &mut Vec<String>, inner: Option<&str>) {
    if let Some(text) = inner.map(str::trim).filter(|text| !text.is_empty()) {
        blocks.push(text.to_string());
    }
}

/// Number of summary keys an object carries.
fn summary_score(object: &serde_json::Map<String, Value>) -> usize {
    StructuredSummary::FIELDS
        .iter()
        .filter(|field| object.contains_key(**field))
        .count()
}

/// The summary-shaped object: the candidate itself, or else the best object
/// nested one level down (`{"medical_summary": {...}}`).
fn summary_object(
    object: serde_json::Map<String, Value>,
) -> Option<(usize, serde_json::Map<String, Value>)> {
    let score = summary_score(&object);
    if score > 0 {
        return Some((score, object));
    }
    object
        .into_iter()
        .filter_map(|(_, value)| match value {
            Value::Object(inner) => Some((summary_score(&inner), inner)),
            _ => None,
        })
        .filter(|(score, _)| *score > 0)
        .max_by_key(|(score, _)| *score)
}

/// Top-level `{...}` spans, skipping braces inside JSON strings.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, byte) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = idx;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=idx]);
                }
            }
            _ => {}
        }
    }

    spans
}

/// Strip markdown decoration and trailing JSON commas.
fn normalize_line(line: &str) -> String {
    let line = line.replace("**", "").replace("__", "");
    line.trim()
        .trim_start_matches('#')
        .trim()
        .trim_end_matches(',')
        .trim()
        .to_string()
}

fn normalize_value(value: &str) -> String {
    let value = value.trim().trim_end_matches(',').trim();
    if matches!(value, "{" | "[" | "{}" | "[]") {
        return String::new();
    }
    if value.starts_with('[') && value.ends_with(']') {
        return value
            .trim_matches(|c| c == '[' || c == ']')
            .replace('"', "")
            .trim()
            .to_string();
    }
    value.trim_matches('"').trim().to_string()
}

fn normalize_label(label: &str) -> String {
    let label = label.split('(').next().unwrap_or_default();
    label
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn snake_key(label: &str) -> String {
    normalize_label(label)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn split_items(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .filter_map(lenient::clean)
        .collect()
}

fn append_text(target: &mut String, value: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(value);
}

fn append_note(map: &mut BTreeMap<String, String>, value: &str) {
    map.entry("notes".to_string())
        .and_modify(|notes| {
            notes.push_str("; ");
            notes.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> OutputParser {
        OutputParser::new().unwrap()
    }

    const FULL_JSON: &str = r#"{
        "vitals": {"blood_pressure": "130/85", "heart_rate": "88 bpm", "temperature": "99.2 F", "weight": "not mentioned"},
        "symptoms": {"current_symptoms": ["persistent dry cough", "fatigue", "chest tightness"], "symptom_duration": "about a week", "symptom_severity": "worsening", "pain_scale": "not mentioned"},
        "medical_history": {"current_medications": ["lisinopril", "asthma inhaler"], "allergies": ["penicillin (rash)"], "previous_conditions": ["hypertension", "asthma"], "recent_procedures": []},
        "patient_concerns": ["Is the low-grade fever concerning?"],
        "nurse_observations": ["Cough mostly dry with occasional clear mucus"],
        "additional_characteristics": {"family_present": "grandson had a cold last week"},
        "summary": "One week of worsening dry cough with fatigue and exertional chest tightness."
    }"#;

    #[test]
    fn test_parses_json_wrapped_in_thinking_tags() {
        let raw = format!(
            "<think>The nurse recorded vitals; the patient takes lisinopril.</think>\n{FULL_JSON}"
        );
        let parsed = parser().parse(&raw).unwrap();

        assert_eq!(parsed.strategy, ParseStrategy::Json);
        assert_eq!(
            parsed.thinking_process,
            "The nurse recorded vitals; the patient takes lisinopril."
        );
        let summary = parsed.summary;
        assert_eq!(summary.vitals.get("blood_pressure").map(String::as_str), Some("130/85"));
        assert!(!summary.vitals.contains_key("weight"));
        assert_eq!(summary.symptoms.current_symptoms.len(), 3);
        assert!(summary.symptoms.pain_scale.is_empty());
        assert_eq!(summary.medical_history.allergies, vec!["penicillin (rash)"]);
        assert_eq!(summary.patient_concerns.len(), 1);
        assert_eq!(summary.nurse_observations.len(), 1);
        assert!(summary.additional_characteristics.contains_key("family_present"));
        assert!(summary.summary.starts_with("One week"));
    }

    #[test]
    fn test_prefers_fenced_block_over_stray_braces() {
        let raw = "Template was {like this}.\n```json\n{\"summary\": \"Headache since morning.\", \"vitals\": {}}\n```\nDone.";
        let parsed = parser().parse(raw).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Json);
        assert_eq!(parsed.summary.summary, "Headache since morning.");
        assert_eq!(parsed.thinking_process, NO_THINKING);
    }

    #[test]
    fn test_long_prose_before_json_is_thinking() {
        let prose = "Let me work through this conversation carefully. The patient reports a cough, \
                     the nurse took vitals, and medications were reviewed before the doctor visit.";
        let raw = format!("{prose}\n{{\"summary\": \"Cough for a week.\"}}");
        let parsed = parser().parse(&raw).unwrap();
        assert_eq!(parsed.thinking_process, prose);
        assert_eq!(parsed.summary.summary, "Cough for a week.");
    }

    #[test]
    fn test_object_with_most_summary_keys_wins() {
        let raw = r#"Example: {"summary": "x"} and the answer {"summary": "Real.", "patient_concerns": ["pain"]} then {"note": 1}"#;
        let parsed = parser().parse(raw).unwrap();
        assert_eq!(parsed.summary.summary, "Real.");
        assert_eq!(parsed.summary.patient_concerns, vec!["pain"]);
    }

    #[test]
    fn test_trailing_commas_are_repaired() {
        let raw = r#"{"summary": "Dizziness on standing.", "patient_concerns": ["falls",],}"#;
        let parsed = parser().parse(raw).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Json);
        assert_eq!(parsed.summary.patient_concerns, vec!["falls"]);
    }

    #[test]
    fn test_headache_sections_fallback() {
        let raw = "Here is the extracted information.\n\n\
                   **Symptoms:**\n\
                   - Headache since this morning\n\n\
                   **Pain scale:** 6/10\n\n\
                   **Summary:** Patient reports a headache that started this morning, rated 6/10.";
        let parsed = parser().parse(raw).unwrap();

        assert_eq!(parsed.strategy, ParseStrategy::Sections);
        let summary = parsed.summary;
        assert!(
            summary
                .symptoms
                .current_symptoms
                .iter()
                .any(|s| s.to_lowercase().contains("headache"))
        );
        assert_eq!(summary.symptoms.pain_scale, "6/10");
        assert!(!summary.summary.is_empty());
    }

    #[test]
    fn test_sections_with_headings_and_vitals_anywhere() {
        let raw = "## Vital Signs\n\
                   Blood pressure: 130/85\n\
                   Pulse: 88\n\
                   Mobility: not mentioned\n\n\
                   ## Medical History\n\
                   Medications: lisinopril, albuterol inhaler\n\
                   Allergies: penicillin\n\n\
                   ## Patient Concerns\n\
                   1. Whether the fever is serious\n\n\
                   ## Additional Characteristics\n\
                   Mental state: anxious\n\n\
                   Temperature: 99.2 F";
        let summary = parser().parse(raw).unwrap().summary;

        assert_eq!(summary.vitals.get("blood_pressure").map(String::as_str), Some("130/85"));
        assert_eq!(summary.vitals.get("heart_rate").map(String::as_str), Some("88"));
        assert_eq!(summary.vitals.get("temperature").map(String::as_str), Some("99.2 F"));
        assert!(!summary.vitals.contains_key("mobility"));
        assert_eq!(
            summary.medical_history.current_medications,
            vec!["lisinopril", "albuterol inhaler"]
        );
        assert_eq!(summary.medical_history.allergies, vec!["penicillin"]);
        assert_eq!(summary.patient_concerns, vec!["Whether the fever is serious"]);
        assert_eq!(
            summary.additional_characteristics.get("mental_state").map(String::as_str),
            Some("anxious")
        );
    }

    #[test]
    fn test_truncated_json_recovers_through_sections() {
        let raw = "{\n  \"vitals\": {\n    \"heart_rate\": \"88\"\n  },\n  \"symptoms\": {\n    \"current_symptoms\": [\n      \"cough\",\n      \"fatigue\"\n    ],\n  \"summary\": \"Cough and fati";
        let parsed = parser().parse(raw).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Sections);
        assert_eq!(parsed.summary.vitals.get("heart_rate").map(String::as_str), Some("88"));
        assert_eq!(parsed.summary.symptoms.current_symptoms, vec!["cough", "fatigue"]);
        assert_eq!(parsed.summary.summary, "Cough and fati");
    }

    #[test]
    fn test_random_prose_is_malformed() {
        let raw = "I'm sorry, I can't help with that. The weather has been lovely this week, \
                   and the garden is in full bloom.";
        assert!(matches!(
            parser().parse(raw),
            Err(SummarizeError::MalformedModelOutput(_))
        ));
        assert!(matches!(
            parser().parse(r#"{"status": "ok"}"#),
            Err(SummarizeError::MalformedModelOutput(_))
        ));
        assert!(matches!(
            parser().parse("   "),
            Err(SummarizeError::MalformedModelOutput(_))
        ));
    }

    #[test]
    fn test_parse_is_pure() {
        let parser = parser();
        let raw = format!("<thinking>reasoning</thinking>{FULL_JSON}");
        assert_eq!(parser.parse(&raw).unwrap(), parser.parse(&raw).unwrap());

        let sections = "Summary: Headache.\nSymptoms: headache, nausea";
        assert_eq!(parser.parse(sections).unwrap(), parser.parse(sections).unwrap());
    }

    #[test]
    fn test_unclosed_thinking_is_not_parsed_as_answer() {
        let raw = "<think>\nThe nurse took vitals.\nBlood pressure: 130/85\nHeart rate: 88\n\
                   So the patient has a cough. Let me now build the JSON with";
        assert!(matches!(
            parser().parse(raw),
            Err(SummarizeError::MalformedModelOutput(msg)) if msg.contains("only reasoning")
        ));

        let trailing = "{\"summary\": \"Cough for a week.\"}\n<think>Checking the answer again";
        let parsed = parser().parse(trailing).unwrap();
        assert_eq!(parsed.summary.summary, "Cough for a week.");
        assert_eq!(parsed.thinking_process, "Checking the answer again");
    }

    #[test]
    fn test_orphan_closing_tag_ends_reasoning() {
        let raw = "The patient describes a headache, pain 6/10.</think>\n\
                   {\"summary\": \"Headache since morning.\", \"vitals\": {}}";
        let parsed = parser().parse(raw).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Json);
        assert_eq!(parsed.thinking_process, "The patient describes a headache, pain 6/10.");
        assert_eq!(parsed.summary.summary, "Headache since morning.");
    }

    #[test]
    fn test_summary_nested_under_wrapper_key() {
        let raw = r#"```json {"medical_summary": {"vitals": {"temperature": "99.2 F"}, "symptoms": {"current_symptoms": ["headache"]}, "summary": "Headache since morning."}} ```"#;
        let parsed = parser().parse(raw).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Json);
        assert_eq!(parsed.summary.summary, "Headache since morning.");
        assert_eq!(parsed.summary.symptoms.current_symptoms, vec!["headache"]);
        assert_eq!(
            parsed.summary.vitals.get("temperature").map(String::as_str),
            Some("99.2 F")
        );

        assert!(matches!(
            parser().parse(r#"{"result": {"status": 1}}"#),
            Err(SummarizeError::MalformedModelOutput(_))
        ));
    }

    #[test]
    fn test_balanced_objects_ignore_braces_in_strings() {
        let spans = balanced_objects(r#"a {"k": "}{"} b {"x": {"y": 1}} }"#);
        assert_eq!(spans, vec![r#"{"k": "}{"}"#, r#"{"x": {"y": 1}}"#]);
    }
}
