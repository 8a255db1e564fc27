//! Modules layer - infrastructure behind the file features
//!
//! Storage disks, name generation and the file-handling pipeline.

pub mod file_handling;
pub mod naming;
pub mod storage;
