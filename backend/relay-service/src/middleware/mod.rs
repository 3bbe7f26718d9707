pub mod guards;

pub use guards::{ConversationMember, TrustedDevice};
