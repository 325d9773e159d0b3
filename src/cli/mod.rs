//! Command-line interface for music-courier.
//!
//! Every command drives the same update loop: it feeds messages into an
//! [`App`](crate::app::App) and renders the state it settles into.

mod commands;

pub use commands::{Cli, Commands, run_command};
