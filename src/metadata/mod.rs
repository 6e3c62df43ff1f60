//! Column, area and triplet metadata discovered from the appliance.
//!
//! Columns are fetched per (realm, centricity, groupby) triplet, merged into
//! one shared instance per logical key, persisted per appliance software
//! version and indexed by a [`ColumnCatalog`] for lookup by key or id.

pub mod areas;
pub mod cache;
pub mod catalog;
pub mod column;
pub mod store;
pub mod triplets;

pub use areas::*;
pub use cache::*;
pub use catalog::*;
pub use column::*;
pub use store::*;
pub use triplets::*;
