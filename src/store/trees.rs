pub const CONFIG_VERSIONS: &str = "config_versions";

// Export records and their unique departure-date index
pub const EXPORTS: &str = "exports";
pub const EXPORT_DATES: &str = "export_dates";

// Managed attachments
pub const FILES: &str = "files";
pub const FILE_CONTENTS: &str = "file_contents";
pub const FOLDERS: &str = "folders";

pub const ACTIVITY_LOG: &str = "activity_log";
