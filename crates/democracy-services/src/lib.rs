//! democracy-services — reassembly, membership, leadership and the
//! datagram transport that ties them together.

pub mod leadership;
pub mod membership;
pub mod reassembly;
pub mod state;
pub mod transport;

pub use leadership::{elect, outranks, Leadership, Transition};
pub use membership::{MembershipView, NodeIdentity};
pub use reassembly::{ReassemblyError, ReassemblyStats, Reassembler};
pub use state::{NodeState, NodeStatus};
pub use transport::{Node, NodeHandle, Sender, TransportError};
