//! Form ingestion pipeline.
//!
//! Coordinates one submission end to end: save uploads → normalize with the
//! generative model → connect to the vector store → ensure the collection →
//! insert the document → close. Storage is non-fatal: when it fails the
//! response still reports `success` with `weaviate_stored: false`.

use serde::Serialize;
use std::path::Path;

use crate::error::{BridgeError, BridgeResult};
use crate::models::{NormalizedDocument, Status, UploadedFile};
use crate::normalize::normalize_content;
use crate::traits::{Generator, VectorStore};
use crate::uploads::{FileKind, UploadSession};

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A parsed form submission.
#[derive(Debug, Clone, Default)]
pub struct FormSubmission {
    pub prompt: String,
    pub phone_number: Option<String>,
    pub pdfs: Vec<FilePart>,
    pub images: Vec<FilePart>,
}

/// The `data` object of the response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FormData {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub pdfs: Vec<UploadedFile>,
    pub images: Vec<UploadedFile>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_text: Option<String>,
}

/// Response envelope for `POST /weaviate/process-form`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessFormResponse {
    pub message: String,
    pub data: FormData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weaviate_stored: Option<bool>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl ProcessFormResponse {
    fn failed(message: String, data: FormData, err: &BridgeError) -> Self {
        Self {
            message,
            data,
            weaviate_stored: None,
            status: Status::Error,
            error_kind: Some(err.kind()),
        }
    }
}

/// Run the whole pipeline for one submission. Never fails: every error is
/// folded into the returned envelope.
pub async fn process_form(
    generator: &dyn Generator,
    store: &dyn VectorStore,
    uploads_root: &Path,
    form: FormSubmission,
) -> ProcessFormResponse {
    tracing::info!(
        prompt_chars = form.prompt.chars().count(),
        pdfs = form.pdfs.len(),
        images = form.images.len(),
        "form processing started"
    );

    let mut data = FormData {
        prompt: form.prompt.clone(),
        phone_number: form.phone_number.clone(),
        ..FormData::default()
    };

    let session = match save_uploads(uploads_root, &form, &mut data).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "saving uploads failed");
            let message = format!("Error saving uploads: {}", e.detail());
            return ProcessFormResponse::failed(message, data, &e);
        }
    };

    let normalized = match normalize_content(
        generator,
        &form.prompt,
        &session.pdf_paths(),
        &session.image_paths(),
    )
    .await
    {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(session_id = %session.id, error = %e, "normalization failed");
            // normalize_content already prefixes "Error processing with Gemini".
            return ProcessFormResponse::failed(e.detail(), data, &e);
        }
    };
    data.normalized_text = Some(normalized.clone());

    let doc = NormalizedDocument::new(
        &session.id,
        &form.prompt,
        &normalized,
        &session.pdfs,
        &session.images,
    );
    let stored = store_document(store, &doc).await;

    tracing::info!(
        session_id = %session.id,
        files = doc.total_files,
        stored,
        normalized_chars = normalized.chars().count(),
        "form processing completed"
    );

    ProcessFormResponse {
        message: "Form processed successfully with Gemini".to_string(),
        data,
        weaviate_stored: Some(stored),
        status: Status::Success,
        error_kind: None,
    }
}

/// Create the session directory and write every file, recording each one in
/// `data` as it lands on disk.
async fn save_uploads(
    root: &Path,
    form: &FormSubmission,
    data: &mut FormData,
) -> BridgeResult<UploadSession> {
    let mut session = UploadSession::create(root).await?;
    data.session_id = session.id.clone();

    for part in &form.pdfs {
        if let Some(saved) = session.save(FileKind::Pdf, &part.filename, &part.bytes).await? {
            data.pdfs.push(saved);
        }
    }
    for part in &form.images {
        if let Some(saved) = session
            .save(FileKind::Image, &part.filename, &part.bytes)
            .await?
        {
            data.images.push(saved);
        }
    }
    Ok(session)
}

/// Connect, ensure the collection, insert, close. Returns whether the
/// document was stored; failures are logged, not propagated.
pub async fn store_document(store: &dyn VectorStore, doc: &NormalizedDocument) -> bool {
    let session = match store.connect().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "failed to connect to vector store");
            return false;
        }
    };

    if let Err(e) = session.create_collection().await {
        tracing::warn!(collection = session.collection(), error = %e, "ensuring collection failed");
    }

    let result = session.store_document(doc).await;
    session.close().await;

    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(session_id = %doc.session_id, error = %e, "storing document failed");
            false
        }
    }
}
