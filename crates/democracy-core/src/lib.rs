//! democracy-core — wire format, fragmentation, identity helpers and
//! configuration. All other Democracy crates depend on this one.

pub mod config;
pub mod fragment;
pub mod identity;
pub mod wire;

pub use config::{ConfigError, DemocracyConfig, NodeConfig};
pub use fragment::{fragment, FragmentError};
pub use identity::{ceil_div, generate_short_id, random_weight, IdError};
pub use wire::{Chunk, Message, Role, WireError};
