pub mod ingestion;
pub mod mailbox;
pub mod receipts;

// Re-export key types for convenience
pub use ingestion::{IngestOutcome, IngestionService};
pub use mailbox::MailboxService;
pub use receipts::{AckDisposition, AckItem, AckResult, BatchOutcome, ReceiptService};
