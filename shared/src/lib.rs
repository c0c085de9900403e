pub mod alert_log;
pub mod protocol;
pub mod types;
