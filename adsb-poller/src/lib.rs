pub mod config;
pub mod notify;
pub mod poller;
pub mod session;
pub mod signature;
