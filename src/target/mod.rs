pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpTargetClient, TargetService};
pub use error::TargetError;
pub use types::{CompareResponse, StartSyncResponse, StatusResponse, SyncStatus, TargetRequest};
