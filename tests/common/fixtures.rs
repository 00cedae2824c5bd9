use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::params;

use iiq_check_connect::departures::HostDatabase;
use iiq_check_connect::store::operations::settings::{ExportSettings, FtpSettings, LanguageMapping};
use iiq_check_connect::store::Store;

pub fn at(date: &str, hour: u32) -> NaiveDateTime {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .expect("fixture date")
        .and_hms_opt(hour, 5, 0)
        .expect("fixture time")
}

pub fn seed_customer(
    db: &HostDatabase,
    id: &str,
    last_name: &str,
    email: &str,
    country: &str,
    customer_type: &str,
) {
    db.execute(|conn| {
        conn.execute(
            "INSERT INTO customer (id, last_name, salutation, email, country, customer_type) \
             VALUES (?1, ?2, 'Dear', ?3, ?4, ?5)",
            params![id, last_name, email, country, customer_type],
        )
    })
    .expect("seed customer");
}

pub fn seed_reservation(db: &HostDatabase, id: &str, customer_id: &str, category: &str, departure_at: &str) {
    db.execute(|conn| {
        conn.execute(
            "INSERT INTO reservation (id, customer_id, unit_category, departure_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, customer_id, category, departure_at],
        )
    })
    .expect("seed reservation");
}

/// Two private guests leaving a pitch on 2024-06-09 and one business guest
/// that the filter excludes.
pub fn seed_departures(db: &HostDatabase) {
    seed_customer(db, "c1", "Müller", "mueller@example.com", "DE", "Private");
    seed_customer(db, "c2", "Dupont", "dupont@example.com", "FR", "Private");
    seed_customer(db, "c3", "Corp", "corp@example.com", "DE", "Business");
    seed_reservation(db, "r1", "c1", "Pitch", "2024-06-09 10:00:00");
    seed_reservation(db, "r2", "c2", "Pitch", "2024-06-09 11:30:00");
    seed_reservation(db, "r3", "c3", "Pitch", "2024-06-09 12:00:00");
}

pub fn export_settings() -> ExportSettings {
    ExportSettings {
        enable_job: true,
        export_days_after_departure: 1,
        export_hour: 3,
        unit_categories: vec!["Pitch".to_string()],
        customer_types: vec!["Private".to_string()],
        default_language: "english".to_string(),
        language_mapping: vec![
            LanguageMapping {
                country_code: "DE".to_string(),
                language_string: "german".to_string(),
            },
            LanguageMapping {
                country_code: "FR".to_string(),
                language_string: "french".to_string(),
            },
        ],
        enable_ftp_export: false,
        ftp: FtpSettings::default(),
    }
}

pub fn ftp_settings(port: u16, password: &str) -> FtpSettings {
    FtpSettings {
        server: "127.0.0.1".to_string(),
        port: Some(port),
        user: "iiq".to_string(),
        password: password.to_string(),
        path: "/incoming".to_string(),
        use_secure_ftp: false,
    }
}

pub fn save_settings(store: &Store, settings: &ExportSettings) {
    store.save_export_settings(settings).expect("save settings");
}
