//! Upload of a prepared export to the configured FTP or FTPS server.

pub mod client;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rustls::ClientConfig;
use thiserror::Error;

use crate::store::operations::settings::ExportSettings;
use crate::store::{Store, StoreError};

pub use client::{default_tls_config, FtpTarget};

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out during {0}")]
    Timeout(String),
    #[error("{command} failed: {code} {text}")]
    Reply {
        command: String,
        code: u16,
        text: String,
    },
    #[error("malformed server reply: {0}")]
    MalformedReply(String),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("invalid passive mode reply: {0}")]
    InvalidPassiveAddress(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("FTP settings are not fully configured. Please check the iiQ-Check settings.")]
    NotConfigured,
    #[error("export {0} not found")]
    ExportNotFound(String),
    #[error("No XLSX file attached to this export.")]
    NoAttachment,
    #[error("Attached file not found.")]
    FileNotFound,
    #[error("No content found in the attached file.")]
    EmptyFile,
    #[error("FTP upload failed: {0}")]
    Ftp(#[from] FtpError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Commands, replies and progress notes of one FTP session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Block appended to the export statistics.
    pub fn render(&self, at: NaiveDateTime) -> String {
        let mut out = format!("\nFTP Upload Log - {}\n", at.format("%Y-%m-%d %H:%M:%S"));
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub export_id: String,
    pub file_name: String,
    pub server: String,
    pub message: String,
}

#[derive(Clone)]
pub struct FtpUploader {
    timeout: Duration,
    tls: Arc<ClientConfig>,
}

impl FtpUploader {
    pub fn new(timeout: Duration) -> Result<Self, FtpError> {
        Ok(Self {
            timeout,
            tls: default_tls_config()?,
        })
    }

    pub fn with_tls_config(timeout: Duration, tls: Arc<ClientConfig>) -> Self {
        Self { timeout, tls }
    }

    /// Push the export's attachment to the server in `settings.ftp`.
    ///
    /// Precondition failures return before any connection is made. Once a
    /// session is attempted its transcript is appended to the export's
    /// statistics exactly once, whether the upload succeeded or not.
    pub async fn upload_export(
        &self,
        store: &Store,
        settings: &ExportSettings,
        export_id: &str,
        now: NaiveDateTime,
    ) -> Result<UploadReport, UploadError> {
        let ftp = &settings.ftp;
        if !ftp.is_complete() {
            return Err(UploadError::NotConfigured);
        }

        let export = store
            .get_export(export_id)?
            .ok_or_else(|| UploadError::ExportNotFound(export_id.to_string()))?;
        let file_url = export.xlsx_file.as_deref().ok_or(UploadError::NoAttachment)?;
        let file = store
            .get_file_by_url(file_url)?
            .ok_or(UploadError::FileNotFound)?;
        let content = store
            .get_file_content(&file.id)?
            .filter(|c| !c.is_empty())
            .ok_or(UploadError::EmptyFile)?;

        let target = FtpTarget {
            host: &ftp.server,
            port: ftp.effective_port(),
            user: &ftp.user,
            password: &ftp.password,
            path: &ftp.path,
            tls: ftp.use_secure_ftp.then(|| self.tls.clone()),
            timeout: self.timeout,
        };

        tracing::info!(
            export_id,
            server = %ftp.server,
            port = target.port,
            secure = ftp.use_secure_ftp,
            file = %file.file_name,
            "Starting FTP upload"
        );

        let mut transcript = Transcript::default();
        let result = client::store_file(&target, &file.file_name, &content, &mut transcript).await;
        if let Err(e) = &result {
            transcript.push(format!("FTP upload failed: {e}"));
        }

        let appended = store.append_export_statistics(export_id, &transcript.render(now));

        match (result, appended) {
            (Ok(()), Ok(_)) => {
                let message = format!(
                    "File {} uploaded to FTP server {}.",
                    file.file_name, ftp.server
                );
                tracing::info!(export_id, "{message}");
                Ok(UploadReport {
                    export_id: export_id.to_string(),
                    file_name: file.file_name,
                    server: ftp.server.clone(),
                    message,
                })
            }
            (Ok(()), Err(store_err)) => {
                tracing::error!(export_id, error = %store_err, "Failed to save FTP transcript");
                Err(store_err.into())
            }
            (Err(ftp_err), appended) => {
                if let Err(store_err) = appended {
                    tracing::error!(export_id, error = %store_err, "Failed to save FTP transcript");
                }
                tracing::error!(export_id, error = %ftp_err, "FTP upload failed");
                Err(ftp_err.into())
            }
        }
    }
}
