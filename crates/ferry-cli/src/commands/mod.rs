//! Subcommand implementations

pub mod demo;
pub mod describe;
pub mod info;
