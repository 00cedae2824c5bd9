use chrono::NaiveDate;

pub fn config_latest_key(config_type: &str) -> String {
    format!("{}:latest", config_type)
}

pub fn export_key(export_id: &str) -> String {
    export_id.to_string()
}

/// `YYYY-MM-DD` sorts lexicographically in date order.
pub fn export_date_key(departure_date: NaiveDate) -> String {
    departure_date.format("%Y-%m-%d").to_string()
}

pub fn file_key(file_id: &str) -> String {
    file_id.to_string()
}

pub fn file_url_index_key(file_url: &str) -> String {
    format!("url:{}", file_url)
}

pub fn folder_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

pub fn activity_key(timestamp_ms: i64, entry_id: &str) -> String {
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    format!("{:020}:{}", reverse_ts, entry_id)
}
