use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Score for a single class, kept alongside the winning label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// A completed classification, suitable for JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,

    /// Where the audio came from: a file path or the recording device name
    pub source: String,
    pub label: String,
    pub confidence: f32,
    pub scores: Vec<LabelScore>,

    pub duration_ms: u64,
    pub sample_rate: u32,
}

impl ClassificationRecord {
    pub fn new(
        source: String,
        label: String,
        confidence: f32,
        scores: Vec<LabelScore>,
        duration_ms: u64,
        sample_rate: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source,
            label,
            confidence,
            scores,
            duration_ms,
            sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes() {
        let record = ClassificationRecord::new(
            "clip.wav".to_string(),
            "hungry".to_string(),
            0.91,
            vec![LabelScore {
                label: "hungry".to_string(),
                score: 2.4,
            }],
            5000,
            44100,
        );

        let json = serde_json::to_string(&record).unwrap();
        let parsed: ClassificationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.label, "hungry");
        assert_eq!(parsed.duration_ms, 5000);
        assert_eq!(parsed.id, record.id);
    }
}
