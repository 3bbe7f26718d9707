pub mod device;
pub mod inbox;
pub mod message;
pub mod receipt;

// Re-export for convenience
pub use device::TrustState;
pub use inbox::DeviceInboxEntry;
pub use message::Message;
pub use receipt::{Receipt, ReceiptType};
