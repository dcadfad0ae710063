//! Content normalization.
//!
//! Turns a prompt plus its attachments into one generative request whose
//! answer is a search-optimized rewrite of the submission. PDFs are never
//! parsed; each one is referenced by a placeholder naming the file. Images
//! are sent inline with a mime type taken from the file extension.

use std::path::{Path, PathBuf};

use crate::error::{BridgeError, BridgeResult};
use crate::models::ContentPart;
use crate::traits::Generator;

/// Instruction appended after the prompt and attachments.
pub const NORMALIZATION_INSTRUCTION: &str = "\
Please analyze and normalize the above content (prompt, PDFs, and images) into a comprehensive, \
well-structured text format that is specifically optimized for vector database storage and semantic search.

The normalized text should have these characteristics:

1. **Semantic Richness**: Use descriptive, context-rich language that captures the full meaning and relationships between concepts
2. **Searchable Keywords**: Include relevant technical terms, business concepts, and domain-specific vocabulary
3. **Hierarchical Structure**: Organize information in a logical hierarchy with clear sections and subsections
4. **Entity Relationships**: Explicitly mention relationships between entities, concepts, and ideas
5. **Context Preservation**: Maintain the original context and intent while making it more discoverable
6. **Dense Information**: Pack maximum relevant information into coherent, searchable chunks
7. **Cross-References**: Include references and connections between different parts of the content
8. **Metadata Integration**: Embed implicit metadata and categorization within the text

Format the output as structured, searchable content that will work well with vector embeddings and \
semantic search. Focus on creating text that will be highly retrievable and contextually relevant when \
users search for related information.

Provide a comprehensive, search-optimized normalized summary of all the content.";

/// Mime type for an image path, from its extension (case-insensitive).
///
/// `.jpg`/`.jpeg` map to `image/jpeg`, `.png` to `image/png`; anything else,
/// including no extension, defaults to `image/jpeg`.
pub fn image_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// Placeholder text standing in for a PDF attachment.
pub fn pdf_placeholder(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("[PDF file: {}]", name)
}

/// Assemble the request: prompt, one placeholder per PDF, one inline part
/// per image, then [`NORMALIZATION_INSTRUCTION`].
pub async fn build_normalization_parts(
    prompt: &str,
    pdf_paths: &[PathBuf],
    image_paths: &[PathBuf],
) -> BridgeResult<Vec<ContentPart>> {
    let mut parts = Vec::with_capacity(pdf_paths.len() + image_paths.len() + 2);
    parts.push(ContentPart::text(prompt));

    for path in pdf_paths {
        parts.push(ContentPart::text(pdf_placeholder(path)));
    }

    for path in image_paths {
        let data = tokio::fs::read(path).await?;
        let mime_type = image_mime_type(path);
        tracing::debug!(path = %path.display(), bytes = data.len(), mime_type, "inlining image");
        parts.push(ContentPart::InlineData {
            mime_type: mime_type.to_string(),
            data,
        });
    }

    parts.push(ContentPart::text(NORMALIZATION_INSTRUCTION));
    Ok(parts)
}

/// Normalize a submission into search-optimized text with one model call.
///
/// Any failure is wrapped with the `"Error processing with Gemini"` context.
/// There is no retry.
pub async fn normalize_content(
    generator: &dyn Generator,
    prompt: &str,
    pdf_paths: &[PathBuf],
    image_paths: &[PathBuf],
) -> BridgeResult<String> {
    let parts = build_normalization_parts(prompt, pdf_paths, image_paths)
        .await
        .map_err(|e| e.context("Error processing with Gemini"))?;

    tracing::info!(
        prompt_chars = prompt.chars().count(),
        pdfs = pdf_paths.len(),
        images = image_paths.len(),
        parts = parts.len(),
        "sending content for normalization"
    );

    let text = generator
        .generate(&parts)
        .await
        .map_err(|e| e.context("Error processing with Gemini"))?;

    if text.trim().is_empty() {
        return Err(
            BridgeError::upstream("gemini", "model returned no text")
                .context("Error processing with Gemini"),
        );
    }

    tracing::info!(chars = text.chars().count(), "received normalized text");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_image_mime_type() {
        assert_eq!(image_mime_type(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("a.png")), "image/png");
        assert_eq!(image_mime_type(Path::new("a.PNG")), "image/png");
        assert_eq!(image_mime_type(Path::new("a.gif")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("a.webp")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn test_pdf_placeholder_uses_filename_only() {
        let p = Path::new("uploads/abc/pdfs/plan.pdf");
        assert_eq!(pdf_placeholder(p), "[PDF file: plan.pdf]");
    }

    #[test]
    fn test_instruction_lists_eight_properties() {
        for n in 1..=8 {
            assert!(NORMALIZATION_INSTRUCTION.contains(&format!("\n{}. **", n)));
        }
        assert!(!NORMALIZATION_INSTRUCTION.contains("\n9. "));
    }

    #[tokio::test]
    async fn test_parts_without_attachments() {
        let parts = build_normalization_parts("test", &[], &[]).await.unwrap();
        assert_eq!(
            parts,
            vec![
                ContentPart::text("test"),
                ContentPart::text(NORMALIZATION_INSTRUCTION)
            ]
        );
    }

    #[tokio::test]
    async fn test_parts_order_with_attachments() {
        let tmp = TempDir::new().unwrap();
        let png = tmp.path().join("chart.png");
        let gif = tmp.path().join("anim.gif");
        std::fs::write(&png, [1u8, 2, 3]).unwrap();
        std::fs::write(&gif, [9u8]).unwrap();
        let pdf = tmp.path().join("deck.pdf");

        let parts = build_normalization_parts("prompt", &[pdf], &[png, gif])
            .await
            .unwrap();

        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], ContentPart::text("prompt"));
        assert_eq!(parts[1], ContentPart::text("[PDF file: deck.pdf]"));
        assert_eq!(
            parts[2],
            ContentPart::InlineData {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3]
            }
        );
        assert_eq!(
            parts[3],
            ContentPart::InlineData {
                mime_type: "image/jpeg".to_string(),
                data: vec![9]
            }
        );
        assert_eq!(parts[4], ContentPart::text(NORMALIZATION_INSTRUCTION));
    }

    struct Recording {
        seen: Mutex<Vec<ContentPart>>,
        reply: BridgeResult<String>,
    }

    #[async_trait]
    impl Generator for Recording {
        async fn generate(&self, parts: &[ContentPart]) -> BridgeResult<String> {
            *self.seen.lock().unwrap() = parts.to_vec();
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(BridgeError::upstream("gemini", e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_normalize_content_returns_model_text() {
        let generator = Recording {
            seen: Mutex::new(Vec::new()),
            reply: Ok("normalized".to_string()),
        };
        let text = normalize_content(&generator, "test", &[], &[]).await.unwrap();
        assert_eq!(text, "normalized");
        assert_eq!(generator.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_normalize_content_wraps_errors() {
        let generator = Recording {
            seen: Mutex::new(Vec::new()),
            reply: Err(BridgeError::upstream("gemini", "quota exceeded")),
        };
        let err = normalize_content(&generator, "test", &[], &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream");
        assert_eq!(err.detail(), "Error processing with Gemini: quota exceeded");
    }

    #[tokio::test]
    async fn test_missing_image_is_io_error() {
        let generator = Recording {
            seen: Mutex::new(Vec::new()),
            reply: Ok("unused".to_string()),
        };
        let err = normalize_content(
            &generator,
            "test",
            &[],
            &[PathBuf::from("/nonexistent/x.png")],
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "io");
        assert!(generator.seen.lock().unwrap().is_empty());
    }
}
