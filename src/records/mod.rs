mod classifier;
mod types;

pub use classifier::{categorize, classify, classify_now, lifecycle};
pub use types::{Category, ContainerRecord, Lifecycle, SourceRecord, WorkItem};
