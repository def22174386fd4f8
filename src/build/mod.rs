//! Build pipeline module for mapc
//!
//! Turns a `.map` source into a compiled `.bsp` by running the configured
//! compile chain, skipping the stages an edit did not affect.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Planning**: diff against the last built source and reduce the step list
//! - **Execution**: run each step as a subprocess, streaming its output
//! - **Control**: schedule builds as jobs, superseding and cancelling them
//!
//! # Example
//!
//! ```ignore
//! use mapc::build::{BuildContext, BuildController, BuildOptions};
//! use mapc::config::load_config;
//!
//! let config = load_config(None)?;
//! let controller = BuildController::new(BuildContext::new(config, project_root));
//! controller.load_last_built()?;
//!
//! let doc = Arc::new(mapc::parser::parse_file(&controller.context().map_path())?);
//! if let Some(report) = controller.start_build(doc, BuildOptions::default()) {
//!     println!("{}", report.recv()?.summary());
//! }
//! ```

pub mod cancel;
pub mod context;
pub mod controller;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod orchestrator;
pub mod plan;
pub mod result;
pub mod status;
pub mod step;
pub mod vars;

#[cfg(test)]
pub(crate) mod test_support;

pub use cancel::CancellationToken;
pub use context::BuildContext;
pub use controller::BuildController;
pub use error::BuildError;
pub use executor::{Invocation, ProcessExecutor, StepExecutor, StepExit};
pub use manifest::{BuildManifest, ManifestError};
pub use orchestrator::{BuildOptions, BuildOrchestrator};
pub use plan::plan_steps;
pub use result::*;
pub use status::{BuildPhase, BuildState, StatusHandle};
pub use step::{default_steps, BuildStep, StepKind};
pub use vars::Variables;
