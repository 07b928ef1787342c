//! Command-line module for the logo-bgremove library
//!
//! This module is only available when the "cli" feature is enabled.

#[path = "main.rs"]
mod main_impl;

pub use main_impl::{
    build_processor, main, remove_logo_background, LogoConsoleReporter, SharedOutput,
    EXIT_FAILURE, EXIT_SUCCESS,
};
