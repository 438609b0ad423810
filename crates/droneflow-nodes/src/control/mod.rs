//! Control nodes
//!
//! Start and end markers. They do no work of their own but anchor the
//! sequential walk and validation.

mod end;
mod start;

pub use end::EndNode;
pub use start::StartNode;
