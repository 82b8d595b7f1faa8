pub mod cli;
pub mod load_config;
pub mod rest;
pub mod toolchain;

pub use cli::{run, Cli, Commands};
