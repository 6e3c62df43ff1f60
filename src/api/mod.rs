//! Appliance REST access.
//!
//! The core talks to the appliance only through the [`Connection`] trait.
//! [`ProfilerApi`] maps each endpoint onto a typed call; `HttpConnection` is
//! the production transport when the `http` feature is enabled.

pub mod connection;
pub mod endpoints;
#[cfg(feature = "http")]
pub mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use connection::*;
pub use endpoints::*;
#[cfg(feature = "http")]
pub use http::*;
