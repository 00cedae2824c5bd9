use crate::constants::ROOT_FOLDER;
use crate::store::operations::settings::ExportSettings;
use crate::store::{keys, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_root_folder", m002_root_folder),
        ("003_default_settings", m003_default_settings),
    ]
}

/// Apply every migration newer than the persisted version.
///
/// Each migration must be idempotent: the process can die after the migration
/// body succeeded but before `set_version` persisted, in which case it runs again
/// on the next start. Versions only move forward.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.config_versions.get(VERSION_KEY.as_bytes())? {
        Some(raw) if raw.len() == 4 => {
            let bytes: [u8; 4] = raw.as_ref().try_into().unwrap_or([0; 4]);
            Ok(u32::from_be_bytes(bytes))
        }
        Some(_) => Err(StoreError::Migration {
            version: 0,
            message: "unreadable schema version marker".to_string(),
        }),
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .config_versions
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

fn m002_root_folder(store: &Store) -> Result<(), StoreError> {
    store.ensure_folder(ROOT_FOLDER, "")?;
    Ok(())
}

// Persist defaults so the admin API always reads an explicit record.
fn m003_default_settings(store: &Store) -> Result<(), StoreError> {
    let key = keys::config_latest_key(crate::store::operations::settings::SETTINGS_CONFIG_TYPE);
    if store.config_versions.get(key.as_bytes())?.is_none() {
        store.save_export_settings(&ExportSettings::default())?;
    }
    Ok(())
}
