//! Per-submission upload directories.
//!
//! Every form submission gets a fresh session directory named by a random
//! UUID under the configured uploads root:
//!
//! ```text
//! uploads/<session_id>/pdfs/<filename>
//! uploads/<session_id>/images/<filename>
//! ```
//!
//! Files are written before any downstream processing and are never cleaned
//! up by this crate.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::BridgeResult;
use crate::models::UploadedFile;

/// Which subdirectory of the session a file belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
}

impl FileKind {
    fn dir_name(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdfs",
            FileKind::Image => "images",
        }
    }
}

/// One upload session and the files saved into it so far.
#[derive(Debug)]
pub struct UploadSession {
    pub id: String,
    pub dir: PathBuf,
    pub pdfs: Vec<UploadedFile>,
    pub images: Vec<UploadedFile>,
}

impl UploadSession {
    /// Create `<root>/<uuid>/`, creating `root` as well if needed.
    pub async fn create(root: &Path) -> BridgeResult<Self> {
        let id = Uuid::new_v4().to_string();
        let dir = root.join(&id);
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(session_id = %id, dir = %dir.display(), "created upload session");
        Ok(Self {
            id,
            dir,
            pdfs: Vec::new(),
            images: Vec::new(),
        })
    }

    /// Write one uploaded file into the session.
    ///
    /// Returns `None` without touching the disk when the client sent no
    /// usable filename.
    pub async fn save(
        &mut self,
        kind: FileKind,
        filename: &str,
        bytes: &[u8],
    ) -> BridgeResult<Option<UploadedFile>> {
        let Some(name) = safe_filename(filename) else {
            tracing::debug!(filename, "skipping upload without a usable filename");
            return Ok(None);
        };

        let dir = self.dir.join(kind.dir_name());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&name);
        tokio::fs::write(&path, bytes).await?;

        tracing::info!(
            session_id = %self.id,
            filename = %name,
            bytes = bytes.len(),
            kind = kind.dir_name(),
            "saved upload"
        );

        let record = UploadedFile {
            filename: name,
            size: bytes.len() as u64,
            path: path.display().to_string(),
        };
        match kind {
            FileKind::Pdf => self.pdfs.push(record.clone()),
            FileKind::Image => self.images.push(record.clone()),
        }
        Ok(Some(record))
    }

    pub fn pdf_paths(&self) -> Vec<PathBuf> {
        self.pdfs.iter().map(|f| PathBuf::from(&f.path)).collect()
    }

    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.images.iter().map(|f| PathBuf::from(&f.path)).collect()
    }
}

/// Reduce a client-supplied filename to its final path component.
///
/// Directory parts (including `..`) are dropped so a crafted name cannot
/// escape the session directory. Returns `None` for empty names.
pub fn safe_filename(filename: &str) -> Option<String> {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    match last {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
