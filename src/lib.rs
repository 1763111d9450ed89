pub mod artifact;
pub mod classify;
pub mod cli;
pub mod config;
pub mod drop;
pub mod error;
pub mod launch;
pub mod progress;
pub mod report;
pub mod runner;
pub mod tool;
pub mod types;
pub mod util;
