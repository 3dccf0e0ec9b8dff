//! Core I/O: peak dump loading and candidate table persistence.

pub mod loaders;
pub mod writers;
