//! Library for `targ`.
//!
//! This library is not intended to be used directly and is unsupported in
//! that configuration. It exists so the binary entrypoint, integration tests,
//! and unit tests can share a single implementation.

pub mod bootstrap;
pub mod cache;
pub mod cachekey;
pub mod collab;
pub mod compile;
pub mod discover;
pub mod dispatch;
pub mod filesystem;
pub mod flags;
pub mod fs;
pub mod isolate;
pub mod model;
pub mod module;
pub mod path;
pub mod runner;
