//! Core identifier types.
//!
//! - `ToolCallId`: TypeID-based identifier generated for tool calls whose
//!   provider did not supply one
//! - `VendorPartId`: the provider-assigned key that correlates delta events
//!   with the response part they update

mod tool_call_id;
mod vendor_part_id;

pub use tool_call_id::{InvalidToolCallId, ToolCallId};
pub use vendor_part_id::VendorPartId;
