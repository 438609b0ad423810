//! Movement nodes
//!
//! Flight commands sent to the drone host. Ranges mirror what the schema
//! declares so a handler run without validation still refuses unsafe values.

mod hover;
mod land;
mod move_to;
mod rotate;
mod takeoff;

pub use hover::HoverNode;
pub use land::LandNode;
pub use move_to::{MoveDirection, MoveNode};
pub use rotate::RotateNode;
pub use takeoff::TakeoffNode;
