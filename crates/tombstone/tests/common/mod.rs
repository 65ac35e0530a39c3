//! Test infrastructure for the tombstone layer.
//!
//! Each integration test binary compiles this module separately, so not
//! every helper is used everywhere.

#![allow(dead_code)]

pub mod fixtures;
pub mod hooks;

pub use fixtures::*;
pub use hooks::*;
