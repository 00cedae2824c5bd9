/// Upper bound on compare-and-swap retries for contended records.
pub const MAX_CAS_RETRIES: u32 = 20;

/// Document type name that export attachments and activity entries link to.
pub const EXPORT_DOCTYPE: &str = "iiQ-Check Export";

/// Subject of every activity-log entry written by the hourly job.
pub const ACTIVITY_SUBJECT: &str = "iiQ-Check hourly job";

/// Top-level folder of the managed file store.
pub const ROOT_FOLDER: &str = "Home";

/// Folder (below `ROOT_FOLDER`) that receives generated spreadsheets.
pub const EXPORT_FOLDER_NAME: &str = "iiq-check";

pub const EXPORT_FILE_PREFIX: &str = "iiq-check-export-";

pub const DEFAULT_FTP_PORT: u16 = 21;

pub const DEFAULT_EXPORT_HOUR: u32 = 3;

pub const DEFAULT_DAYS_AFTER_DEPARTURE: i64 = 1;

/// Ten years; anything larger is a typo.
pub const MAX_DAYS_AFTER_DEPARTURE: i64 = 3650;

pub const DEFAULT_LANGUAGE: &str = "english";

/// Default and maximum page size of list endpoints.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;
pub const MAX_ACTIVITY_LIMIT: usize = 500;

/// Spreadsheet column order, also the header row.
pub const EXPORT_COLUMNS: [&str; 5] = ["name", "salutation", "email", "language", "departure_at"];
