use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Maps predicted class indices back to human-readable labels
///
/// The artifact is a JSON array of class names in training order, the
/// inverse of the label encoding used when the model was fit.
#[derive(Debug, Clone)]
pub struct LabelDecoder {
    labels: Vec<String>,
}

impl LabelDecoder {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            anyhow::bail!("Label set is empty");
        }
        Ok(Self { labels })
    }

    /// Load the label set from a JSON array file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Label file not found: {:?}", path);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read label file: {:?}", path))?;
        let labels: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse label file: {:?}", path))?;

        let decoder = Self::new(labels)?;
        info!("Loaded {} class labels", decoder.len());
        Ok(decoder)
    }

    /// Decode a class index to its label
    pub fn decode(&self, class_index: usize) -> Result<&str> {
        self.labels
            .get(class_index)
            .map(String::as_str)
            .with_context(|| {
                format!(
                    "Class index {} out of range (0..{})",
                    class_index,
                    self.labels.len()
                )
            })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> LabelDecoder {
        LabelDecoder::new(vec![
            "belly_pain".to_string(),
            "burping".to_string(),
            "discomfort".to_string(),
            "hungry".to_string(),
            "tired".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_decode() {
        let decoder = decoder();
        assert_eq!(decoder.decode(0).unwrap(), "belly_pain");
        assert_eq!(decoder.decode(3).unwrap(), "hungry");
    }

    #[test]
    fn test_decode_out_of_range() {
        let decoder = decoder();
        assert!(decoder.decode(5).is_err());
    }

    #[test]
    fn test_empty_labels_rejected() {
        assert!(LabelDecoder::new(Vec::new()).is_err());
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"["hungry", "tired"]"#).unwrap();

        let decoder = LabelDecoder::load(&path).unwrap();
        assert_eq!(decoder.len(), 2);
        assert_eq!(decoder.decode(1).unwrap(), "tired");
    }
}
