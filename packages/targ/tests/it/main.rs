//! Integration tests for the full discover -> group -> build -> dispatch
//! pipeline, driven end to end through [`targ::runner::run`].
//!
//! No real Go toolchain is required: `TARG_COMPILER` is pointed at a fake
//! compiler script (see [`fixtures::FakeToolchain`]) that writes a tiny shell
//! script in place of a real compiled binary.

pub mod fixtures;

mod seed_scenarios;
