pub mod backup;
pub mod cli;
pub mod config;
pub mod context;
pub mod disk;
pub mod error;
mod signal_handler;
pub mod types;
pub mod util;
pub mod volume;

#[cfg(test)]
mod testing;

pub use crate::types::{FsUuid, RunMode};
