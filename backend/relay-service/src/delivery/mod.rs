//! Delivery-ordering core: per-row receipt state machine and per-stream
//! sequence watermarks. Pure logic, no database access.

pub mod state_machine;
pub mod watermark;
