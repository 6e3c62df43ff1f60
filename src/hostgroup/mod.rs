//! Host group type editing.
//!
//! A host group type holds one ordered list of `{cidr, name}` entries shared
//! by all of its groups. Order matters to the appliance (earlier entries take
//! precedence), so [`HostGroup`] edits that shared list in place instead of
//! keeping a per-group copy.

pub mod group;
pub mod types;

pub use group::HostGroup;
pub use types::{ConfigEntry, HostGroupType};
