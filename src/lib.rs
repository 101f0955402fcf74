pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod reconcile;
pub mod records;
pub mod request;
pub mod source;
pub mod store;
pub mod target;
pub mod ui;
