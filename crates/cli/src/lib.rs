//! `cs`: work with codespaces from the command line.
//!
//! Commands are written against the collaborator traits in [`app`] so they
//! can be exercised without a network; [`app::App::live`] supplies the real
//! REST API, session relay, and browser.

pub mod api;
pub mod app;
pub mod authkeys;
pub mod browser;
pub mod cli;
pub mod codespace;
pub mod commands;
pub mod config;
pub mod connector;
pub mod debug_log;
pub mod error;
pub mod logging;
pub mod progress;
pub mod styles;
