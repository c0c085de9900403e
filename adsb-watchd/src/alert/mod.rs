pub mod classify;
pub mod dedup;
pub mod sink;
