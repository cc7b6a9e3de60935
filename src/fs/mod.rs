//! Filesystem utilities for targetlock.
//!
//! The file store relies on atomic replacement so the shared lock table is
//! never observed half-written.

pub mod atomic;

pub use atomic::atomic_write;
