//! Prompt construction for nurse-patient conversation analysis.

/// Instructions sent ahead of every transcript.
pub const SYSTEM_PROMPT: &str = r#"You are a medical conversation analyzer. You read conversations between nurses and patients and extract structured medical information.

RULES:
- Only record facts that were stated in the conversation
- Do NOT give medical advice, suggestions or recommendations
- Do NOT add information that was not explicitly said
- Document what was discussed, not what should be done
- You may reason step by step first, but finish with a single JSON object

Use exactly this JSON structure:
{
    "vitals": {
        "blood_pressure": "value if mentioned",
        "heart_rate": "value if mentioned",
        "temperature": "value if mentioned",
        "oxygen_saturation": "value if mentioned",
        "respiratory_rate": "value if mentioned",
        "weight": "value if mentioned",
        "height": "value if mentioned"
    },
    "symptoms": {
        "current_symptoms": ["symptoms mentioned, primary complaint first"],
        "symptom_duration": "how long symptoms have been present",
        "symptom_severity": "severity if mentioned",
        "pain_scale": "pain level if mentioned (1-10)"
    },
    "medical_history": {
        "current_medications": ["medications mentioned"],
        "allergies": ["allergies mentioned"],
        "previous_conditions": ["known conditions mentioned"],
        "recent_procedures": ["procedures mentioned"]
    },
    "patient_concerns": ["concerns or questions raised by the patient"],
    "nurse_observations": ["observations made by the nurse"],
    "additional_characteristics": {
        "mobility": "mobility status if mentioned",
        "mental_state": "mental or emotional state if mentioned",
        "communication": "communication difficulties if mentioned",
        "family_present": "family members present or mentioned"
    },
    "summary": "A brief factual summary for doctor review"
}

Write "not mentioned" for anything the conversation does not cover."#;

/// Built-in transcript used by the test endpoints.
pub const SAMPLE_CONVERSATION: &str = "Nurse: Good morning, Mrs. Johnson. How are you feeling today?

Patient: Hi, I'm not feeling great. I've had a persistent cough for about a week now, and it's getting worse.

Nurse: I'm sorry to hear that. Is the cough dry or are you bringing anything up?

Patient: Mostly dry, but sometimes a little clear mucus. And I've been feeling really tired.

Nurse: Let me take your vital signs. Your blood pressure is 130 over 85, heart rate is 88 beats per minute, and your temperature is 99.2 degrees Fahrenheit.

Patient: Is that fever concerning? I've also had some chest tightness, especially when I exercise.

Nurse: We'll make sure the doctor reviews all of this. Are you currently taking any medications?

Patient: I take lisinopril for my blood pressure, and I have an inhaler for my asthma, but I haven't needed it much lately.

Nurse: Any allergies I should know about?

Patient: I'm allergic to penicillin. It gives me a rash.

Nurse: Thank you. Have you been around anyone who's been sick recently?

Patient: My grandson had a cold last week when I was babysitting him.

Nurse: That's helpful to know. I'll pass all of this to Dr. Smith, and she'll be in to see you shortly.";

/// Build the full prompt for one transcript.
#[must_use]
pub fn build_prompt(conversation: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\nAnalyze the following nurse-patient conversation and extract the structured medical information:\n\n{}",
        conversation.trim()
    )
}
