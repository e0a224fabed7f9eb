//! PDF collaborator: prints the invoice view page with headless Chrome.
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("browser exited with {status}: {stderr}")]
    Browser { status: ExitStatus, stderr: String },
    #[error("PDF rendering timed out after {0:?}")]
    Timeout(Duration),
    #[error("browser produced an empty PDF")]
    Empty,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Turns a viewable URL into PDF bytes.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render_pdf(&self, url: &str) -> Result<Vec<u8>, PdfError>;
}

/// Runs a Chrome/Chromium binary with `--print-to-pdf`.
///
/// The virtual time budget lets the page finish its network activity
/// before the capture; the whole run is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct ChromePdfRenderer {
    binary: PathBuf,
    timeout: Duration,
    virtual_time_budget: Duration,
}

impl ChromePdfRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(60),
            virtual_time_budget: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_virtual_time_budget(mut self, budget: Duration) -> Self {
        self.virtual_time_budget = budget;
        self
    }
}

#[async_trait]
impl PdfRenderer for ChromePdfRenderer {
    async fn render_pdf(&self, url: &str) -> Result<Vec<u8>, PdfError> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("invoice.pdf");

        let mut command = Command::new(&self.binary);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!(
                "--virtual-time-budget={}",
                self.virtual_time_budget.as_millis()
            ))
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(url)
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| PdfError::Timeout(self.timeout))?
            .map_err(|source| PdfError::Launch {
                binary: self.binary.clone(),
                source,
            })?;
        if !result.status.success() {
            return Err(PdfError::Browser {
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let pdf = tokio::fs::read(&output).await?;
        if pdf.is_empty() {
            return Err(PdfError::Empty);
        }
        debug!(url, bytes = pdf.len(), "rendered PDF");
        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let renderer = ChromePdfRenderer::new("/nonexistent/chromium-for-tests");
        let err = renderer
            .render_pdf("http://localhost/invoice/view/A")
            .await
            .expect_err("no browser");
        assert!(matches!(err, PdfError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_browser_reports_exit_status() {
        let renderer = ChromePdfRenderer::new("false").with_timeout(Duration::from_secs(10));
        let err = renderer
            .render_pdf("http://localhost/invoice/view/A")
            .await
            .expect_err("browser fails");
        assert!(matches!(err, PdfError::Browser { .. }));
    }
}
