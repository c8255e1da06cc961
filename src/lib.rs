//! assetpipe - Frontend asset build tool
//!
//! This library provides functionality to:
//! - Compile Sass stylesheets into one prefixed stylesheet with a source map
//! - Concatenate or bundle JavaScript sources
//! - Serve the output with live reload while watching for changes

pub mod build;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod script;
pub mod server;
pub mod style;
pub mod watch;
