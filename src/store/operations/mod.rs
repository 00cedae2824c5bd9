pub mod activity_log;
pub mod exports;
pub mod files;
pub mod settings;
