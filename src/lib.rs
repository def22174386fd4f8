//! mapc - incremental compile orchestrator for brush-based level maps
//!
//! This library provides functionality to:
//! - Parse `.map` sources and classify what changed between two versions
//! - Reduce the bsp/light/vis compile chain to the tools an edit needs
//! - Run the chain as cancellable jobs on a bounded worker pool
//! - Rebuild automatically when the map is saved

pub mod build;
pub mod cli;
pub mod config;
pub mod diff;
pub mod init;
pub mod logging;
pub mod models;
pub mod output;
pub mod parser;
pub mod process;
pub mod scheduler;
pub mod watch;
