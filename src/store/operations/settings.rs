use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DAYS_AFTER_DEPARTURE, DEFAULT_EXPORT_HOUR, DEFAULT_FTP_PORT, DEFAULT_LANGUAGE,
    MAX_DAYS_AFTER_DEPARTURE,
};
use crate::store::keys;
use crate::store::{Store, StoreError};

pub const SETTINGS_CONFIG_TYPE: &str = "iiq_check_settings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageMapping {
    pub country_code: String,
    pub language_string: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSettings {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub use_secure_ftp: bool,
}

impl fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***REDACTED***")
            .field("path", &self.path)
            .field("use_secure_ftp", &self.use_secure_ftp)
            .finish()
    }
}

impl FtpSettings {
    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) if port != 0 => port,
            _ => DEFAULT_FTP_PORT,
        }
    }

    pub fn is_complete(&self) -> bool {
        [&self.server, &self.user, &self.password, &self.path]
            .iter()
            .all(|v| !v.trim().is_empty())
    }
}

/// Singleton configuration of the departure export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub enable_job: bool,
    pub export_days_after_departure: i64,
    pub export_hour: u32,
    #[serde(default)]
    pub unit_categories: Vec<String>,
    #[serde(default)]
    pub customer_types: Vec<String>,
    pub default_language: String,
    #[serde(default)]
    pub language_mapping: Vec<LanguageMapping>,
    #[serde(default)]
    pub enable_ftp_export: bool,
    #[serde(default)]
    pub ftp: FtpSettings,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            enable_job: false,
            export_days_after_departure: DEFAULT_DAYS_AFTER_DEPARTURE,
            export_hour: DEFAULT_EXPORT_HOUR,
            unit_categories: Vec::new(),
            customer_types: Vec::new(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            language_mapping: Vec::new(),
            enable_ftp_export: false,
            ftp: FtpSettings::default(),
        }
    }
}

impl ExportSettings {
    pub fn language_table(&self) -> HashMap<&str, &str> {
        self.language_mapping
            .iter()
            .map(|m| (m.country_code.as_str(), m.language_string.as_str()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.export_hour > 23 {
            return Err(StoreError::Validation(format!(
                "exportHour must be between 0 and 23, got {}",
                self.export_hour
            )));
        }
        if !(0..=MAX_DAYS_AFTER_DEPARTURE).contains(&self.export_days_after_departure) {
            return Err(StoreError::Validation(format!(
                "exportDaysAfterDeparture must be between 0 and {MAX_DAYS_AFTER_DEPARTURE}, got {}",
                self.export_days_after_departure
            )));
        }
        let mut seen = HashSet::new();
        for mapping in &self.language_mapping {
            if mapping.country_code.trim().is_empty() {
                return Err(StoreError::Validation(
                    "languageMapping entries need a country code".to_string(),
                ));
            }
            if !seen.insert(mapping.country_code.as_str()) {
                return Err(StoreError::Validation(format!(
                    "duplicate country code in languageMapping: {}",
                    mapping.country_code
                )));
            }
        }
        Ok(())
    }
}

impl Store {
    pub fn get_export_settings(&self) -> Result<ExportSettings, StoreError> {
        let key = keys::config_latest_key(SETTINGS_CONFIG_TYPE);
        match self.config_versions.get(key.as_bytes())? {
            Some(raw) => match serde_json::from_slice::<ExportSettings>(&raw) {
                Ok(parsed) => Ok(parsed),
                Err(error) => {
                    tracing::error!(error = %error, "Failed to deserialize export settings");
                    Err(StoreError::Serialization(error))
                }
            },
            None => Ok(ExportSettings::default()),
        }
    }

    pub fn save_export_settings(&self, settings: &ExportSettings) -> Result<(), StoreError> {
        settings.validate()?;
        let key = keys::config_latest_key(SETTINGS_CONFIG_TYPE);
        self.config_versions
            .insert(key.as_bytes(), Self::serialize(settings)?)?;
        Ok(())
    }
}
