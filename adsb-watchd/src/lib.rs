pub mod alert;
pub mod api;
pub mod atomic;
pub mod commands;
pub mod config;
pub mod lookup;
pub mod monitor;
pub mod registry;
pub mod transport;
