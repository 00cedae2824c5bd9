use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::departures::RecipientRow;
use crate::store::operations::settings::ExportSettings;

/// A recipient with its language resolved, ready for the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub name: String,
    pub salutation: String,
    pub email: String,
    pub language: String,
    pub departure_at: String,
}

impl ExportRow {
    /// Cells in the order of `EXPORT_COLUMNS`.
    pub fn cells(&self) -> [&str; 5] {
        [
            &self.name,
            &self.salutation,
            &self.email,
            &self.language,
            &self.departure_at,
        ]
    }
}

pub fn map_language<'a>(
    country_code: Option<&str>,
    table: &HashMap<&str, &'a str>,
    default_language: &'a str,
) -> &'a str {
    country_code
        .and_then(|code| table.get(code).copied())
        .unwrap_or(default_language)
}

pub fn to_export_rows(
    recipients: Vec<RecipientRow>,
    settings: &ExportSettings,
    departure_date: NaiveDate,
) -> Vec<ExportRow> {
    let table = settings.language_table();
    let departure_at = departure_date.format("%Y-%m-%d").to_string();

    recipients
        .into_iter()
        .map(|row| {
            let language =
                map_language(row.country_code.as_deref(), &table, &settings.default_language);
            ExportRow {
                language: language.to_string(),
                name: row.name,
                salutation: row.salutation,
                email: row.email,
                departure_at: departure_at.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::store::operations::settings::LanguageMapping;

    fn settings_with(mapping: &[(&str, &str)], default_language: &str) -> ExportSettings {
        ExportSettings {
            default_language: default_language.to_string(),
            language_mapping: mapping
                .iter()
                .map(|(code, lang)| LanguageMapping {
                    country_code: code.to_string(),
                    language_string: lang.to_string(),
                })
                .collect(),
            ..ExportSettings::default()
        }
    }

    fn recipient(code: Option<&str>) -> RecipientRow {
        RecipientRow {
            name: "Muster".to_string(),
            salutation: "Herr".to_string(),
            email: "muster@example.com".to_string(),
            country_code: code.map(str::to_string),
        }
    }

    fn june_9() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 9).unwrap()
    }

    #[test]
    fn known_code_maps_unknown_falls_back() {
        let settings = settings_with(&[("DE", "german")], "english");
        let rows = to_export_rows(
            vec![recipient(Some("DE")), recipient(Some("FR"))],
            &settings,
            june_9(),
        );
        let languages: Vec<_> = rows.iter().map(|r| r.language.as_str()).collect();
        assert_eq!(languages, vec!["german", "english"]);
        assert!(rows.iter().all(|r| r.departure_at == "2024-06-09"));
    }

    #[test]
    fn missing_code_uses_default() {
        let settings = settings_with(&[("DE", "german")], "english");
        let rows = to_export_rows(vec![recipient(None)], &settings, june_9());
        assert_eq!(rows[0].language, "english");
        assert_eq!(rows[0].cells()[0], "Muster");
    }

    proptest! {
        #[test]
        fn every_language_is_resolved(codes in proptest::collection::vec(proptest::option::of("[A-Z]{2}"), 0..40)) {
            let settings = settings_with(&[("DE", "german"), ("AT", "german"), ("NL", "dutch")], "english");
            let recipients: Vec<_> = codes.iter().map(|c| recipient(c.as_deref())).collect();
            let rows = to_export_rows(recipients, &settings, june_9());

            prop_assert_eq!(rows.len(), codes.len());
            for (row, code) in rows.iter().zip(codes.iter()) {
                let expected = match code.as_deref() {
                    Some("DE") | Some("AT") => "german",
                    Some("NL") => "dutch",
                    _ => "english",
                };
                prop_assert_eq!(row.language.as_str(), expected);
            }
        }
    }
}
