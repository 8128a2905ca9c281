pub mod analyzer;
pub mod config;
pub mod error;
pub mod grading;
pub mod judge;
pub mod rules;
pub mod screener;
pub mod suite;
pub mod supervisor;
pub mod toolchain;
pub mod workspace;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
