//! Core data models used throughout consult-harness.
//!
//! These types represent the uploaded files, the normalized documents written
//! to the vector store, and the search hits read back from it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome flag carried in every JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
    PartialSuccess,
}

/// A file saved into an upload session directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub filename: String,
    pub size: u64,
    pub path: String,
}

/// Normalized document stored in the vector store, one per form submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub session_id: String,
    pub original_prompt: String,
    pub normalized_content: String,
    pub pdf_count: usize,
    pub image_count: usize,
    pub pdf_files: Vec<String>,
    pub image_files: Vec<String>,
    pub total_files: usize,
}

impl NormalizedDocument {
    /// Build the record for a session. Counts and filename lists are taken
    /// from the saved files, so `total_files` always equals
    /// `pdf_count + image_count`.
    pub fn new(
        session_id: &str,
        prompt: &str,
        normalized_text: &str,
        pdfs: &[UploadedFile],
        images: &[UploadedFile],
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            original_prompt: prompt.to_string(),
            normalized_content: normalized_text.to_string(),
            pdf_count: pdfs.len(),
            image_count: images.len(),
            pdf_files: pdfs.iter().map(|f| f.filename.clone()).collect(),
            image_files: images.iter().map(|f| f.filename.clone()).collect(),
            total_files: pdfs.len() + images.len(),
        }
    }
}

/// One part of a generative request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Raw bytes sent inline, e.g. an uploaded image.
    InlineData { mime_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Similarity metadata returned with each hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitMetadata {
    pub distance: Option<f64>,
    pub score: Option<f64>,
}

/// A stored document returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub properties: Map<String, Value>,
    pub metadata: HitMetadata,
}

impl SearchHit {
    /// A string property, or `""` when absent or not a string.
    pub fn text_property(&self, key: &str) -> &str {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Copy of this hit with every non-primitive property value turned into
    /// a string. Strings, numbers, booleans, null and arrays of those are
    /// kept as-is.
    pub fn with_stringified_properties(&self) -> Self {
        let properties = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), stringify_non_primitive(v)))
            .collect();
        Self {
            id: self.id.clone(),
            properties,
            metadata: self.metadata.clone(),
        }
    }
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn stringify_non_primitive(value: &Value) -> Value {
    match value {
        Value::Array(items) if items.iter().all(is_primitive) => value.clone(),
        v if is_primitive(v) => v.clone(),
        other => Value::String(other.to_string()),
    }
}

/// Result of a grouped generative query over retrieved hits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedGeneration {
    /// Generated text, when the generative module produced one.
    pub text: Option<String>,
    /// The hits the generation was conditioned on.
    pub hits: Vec<SearchHit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file(name: &str) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            size: 3,
            path: format!("uploads/s/{}", name),
        }
    }

    #[test]
    fn test_total_files_is_sum_of_counts() {
        let pdfs = vec![file("a.pdf"), file("b.pdf")];
        let images = vec![file("c.png")];
        let doc = NormalizedDocument::new("s", "prompt", "normalized", &pdfs, &images);
        assert_eq!(doc.pdf_count, 2);
        assert_eq!(doc.image_count, 1);
        assert_eq!(doc.total_files, doc.pdf_count + doc.image_count);
        assert_eq!(doc.pdf_files, vec!["a.pdf", "b.pdf"]);
        assert_eq!(doc.image_files, vec!["c.png"]);
    }

    #[test]
    fn test_no_files() {
        let doc = NormalizedDocument::new("s", "p", "n", &[], &[]);
        assert_eq!(doc.total_files, 0);
        assert!(doc.pdf_files.is_empty());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(json!(Status::PartialSuccess), json!("partial_success"));
        assert_eq!(json!(Status::Success), json!("success"));
        assert_eq!(json!(Status::Error), json!("error"));
    }

    #[test]
    fn test_stringified_properties() {
        let properties = json!({
            "session_id": "abc",
            "pdf_count": 2,
            "pdf_files": ["a.pdf"],
            "nested": {"k": 1},
            "mixed": [{"k": 1}],
        });
        let hit = SearchHit {
            id: "1".to_string(),
            properties: properties.as_object().unwrap().clone(),
            metadata: HitMetadata::default(),
        };

        let safe = hit.with_stringified_properties();
        assert_eq!(safe.properties["session_id"], json!("abc"));
        assert_eq!(safe.properties["pdf_count"], json!(2));
        assert_eq!(safe.properties["pdf_files"], json!(["a.pdf"]));
        assert_eq!(safe.properties["nested"], json!("{\"k\":1}"));
        assert_eq!(safe.properties["mixed"], json!("[{\"k\":1}]"));
    }

    #[test]
    fn test_text_property() {
        let hit = SearchHit {
            id: "1".to_string(),
            properties: json!({"original_prompt": "hi", "pdf_count": 1})
                .as_object()
                .unwrap()
                .clone(),
            metadata: HitMetadata::default(),
        };
        assert_eq!(hit.text_property("original_prompt"), "hi");
        assert_eq!(hit.text_property("pdf_count"), "");
        assert_eq!(hit.text_property("missing"), "");
    }
}
