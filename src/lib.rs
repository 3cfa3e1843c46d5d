//! Quick-launcher search core: one query fanned out to six sources, each
//! result set delivered as soon as its source settles.

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;

pub use cli::init_logging;
