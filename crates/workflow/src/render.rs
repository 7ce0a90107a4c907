//! Document generation seam.
//!
//! Visa documents are produced by a [`DocumentRenderer`] before they are
//! mailed. A rendering failure aborts the operation that asked for the
//! document. [`PlainTextRenderer`] writes a readable text file; richer
//! formats plug in behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

/// Template used for registration visas.
pub const VISA_TEMPLATE: &str = "visa";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Document data for template '{template}' must be a JSON object")]
    InvalidData { template: String },

    #[error("Failed to write document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render `template` with `data` and return the path of the document.
    async fn render(&self, template: &str, data: &Value) -> Result<PathBuf, RenderError>;
}

// ---------------------------------------------------------------------------
// PlainTextRenderer
// ---------------------------------------------------------------------------

/// Writes `key: value` lines to `<dir>/<template>-<id>.txt`.
#[derive(Debug, Clone)]
pub struct PlainTextRenderer {
    dir: PathBuf,
}

impl PlainTextRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Body of a plain-text document: a title line then one line per field.
pub fn render_text(template: &str, data: &Value) -> Result<String, RenderError> {
    let fields = data.as_object().ok_or_else(|| RenderError::InvalidData {
        template: template.to_string(),
    })?;
    let mut out = format!("{}\n\n", template.to_uppercase());
    for (key, value) in fields {
        out.push_str(&format!("{key}: {}\n", render_value(value)));
    }
    Ok(out)
}

#[async_trait]
impl DocumentRenderer for PlainTextRenderer {
    async fn render(&self, template: &str, data: &Value) -> Result<PathBuf, RenderError> {
        let body = render_text(template, data)?;
        let stem = match data.get("id") {
            Some(id) => render_value(id),
            None => chrono::Utc::now().format("%Y%m%d%H%M%S").to_string(),
        };
        let path = self.dir.join(format!("{template}-{stem}.txt"));

        let io_err = |source| RenderError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        tokio::fs::write(&path, body).await.map_err(io_err)?;

        tracing::debug!(template, path = %path.display(), "Rendered document");
        Ok(path)
    }
}
