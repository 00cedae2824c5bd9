use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::AdminAuth;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::settings::{ExportSettings, FtpSettings, LanguageMapping};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_settings).put(update_settings))
}

/// FTP settings as shown to operators; the password never leaves the store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FtpSettingsView {
    server: String,
    port: u16,
    user: String,
    path: String,
    use_secure_ftp: bool,
    password_set: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsView {
    enable_job: bool,
    export_days_after_departure: i64,
    export_hour: u32,
    unit_categories: Vec<String>,
    customer_types: Vec<String>,
    default_language: String,
    language_mapping: Vec<LanguageMapping>,
    enable_ftp_export: bool,
    ftp: FtpSettingsView,
}

impl From<ExportSettings> for SettingsView {
    fn from(s: ExportSettings) -> Self {
        Self {
            ftp: FtpSettingsView {
                port: s.ftp.effective_port(),
                password_set: !s.ftp.password.is_empty(),
                server: s.ftp.server,
                user: s.ftp.user,
                path: s.ftp.path,
                use_secure_ftp: s.ftp.use_secure_ftp,
            },
            enable_job: s.enable_job,
            export_days_after_departure: s.export_days_after_departure,
            export_hour: s.export_hour,
            unit_categories: s.unit_categories,
            customer_types: s.customer_types,
            default_language: s.default_language,
            language_mapping: s.language_mapping,
            enable_ftp_export: s.enable_ftp_export,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FtpSettingsUpdate {
    #[serde(default)]
    server: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    user: String,
    /// Omitted keeps the stored password.
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    use_secure_ftp: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsUpdate {
    enable_job: bool,
    export_days_after_departure: i64,
    export_hour: u32,
    #[serde(default)]
    unit_categories: Vec<String>,
    #[serde(default)]
    customer_types: Vec<String>,
    default_language: String,
    #[serde(default)]
    language_mapping: Vec<LanguageMapping>,
    #[serde(default)]
    enable_ftp_export: bool,
    #[serde(default)]
    ftp: FtpSettingsUpdate,
}

impl SettingsUpdate {
    fn into_settings(self, current_password: String) -> ExportSettings {
        ExportSettings {
            enable_job: self.enable_job,
            export_days_after_departure: self.export_days_after_departure,
            export_hour: self.export_hour,
            unit_categories: self.unit_categories,
            customer_types: self.customer_types,
            default_language: self.default_language,
            language_mapping: self.language_mapping,
            enable_ftp_export: self.enable_ftp_export,
            ftp: FtpSettings {
                server: self.ftp.server,
                port: self.ftp.port,
                user: self.ftp.user,
                password: self.ftp.password.unwrap_or(current_password),
                path: self.ftp.path,
                use_secure_ftp: self.ftp.use_secure_ftp,
            },
        }
    }
}

async fn get_settings(
    _admin: AdminAuth,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let settings = state.store().get_export_settings()?;
    Ok(ok(SettingsView::from(settings)))
}

async fn update_settings(
    admin: AdminAuth,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SettingsUpdate>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if req.default_language.trim().is_empty() {
        return Err(AppError::bad_request(
            "VALIDATION_ERROR",
            "defaultLanguage must not be empty",
        ));
    }
    let current = state.store().get_export_settings()?;
    let settings = req.into_settings(current.ftp.password);
    state.store().save_export_settings(&settings)?;

    tracing::info!(
        admin = %&admin.token_hash[..12],
        enable_job = settings.enable_job,
        export_hour = settings.export_hour,
        enable_ftp_export = settings.enable_ftp_export,
        "Export settings updated"
    );
    Ok(ok(SettingsView::from(settings)))
}
