pub mod ingest;
pub mod resolver;

pub use ingest::{BatchReport, IngestOutcome, Ingested, Ingestor};
pub use resolver::ThreadResolver;
