//! Logic nodes
//!
//! Branching on context variables, writing variables and pausing.

mod condition_branch;
mod set_variable;
mod wait;

pub use condition_branch::{ConditionBranchNode, ConditionOperator};
pub use set_variable::SetVariableNode;
pub use wait::WaitNode;
