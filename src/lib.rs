pub mod aggregate;
pub mod dispatch;
pub mod ingest;
pub mod stats;
