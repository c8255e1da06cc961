//! Build orchestration for assetpipe
//!
//! Runs the style and script pipelines for a command and starts the dev
//! server once they have completed.
//!
//! # Overview
//!
//! A command is carried out in stages:
//! - **Discovery**: Find source files using glob patterns from the settings
//! - **Stage 1**: Run the style and script pipelines concurrently
//! - **Stage 2**: Serve the output and watch for changes
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{Command, Orchestrator};
//! use assetpipe::config::load_settings;
//!
//! let loaded = load_settings(None)?;
//! let orchestrator = Orchestrator::new(Command::Build, loaded.settings, loaded.project_root);
//!
//! let stage = orchestrator.run()?;
//! println!("Wrote {} files", stage.all_outputs().len());
//! ```

pub mod context;
pub mod discovery;
pub mod marker;
pub mod orchestrator;
pub mod progress;
pub mod result;
pub mod signal;

pub use context::*;
pub use marker::{BuildMarker, MarkerError, MarkerState};
pub use orchestrator::*;
pub use result::*;
pub use signal::FirstRun;
