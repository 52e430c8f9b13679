//! climb — a universal CLI introspection engine.
//!
//! Given the name (or path) of an arbitrary command-line tool, climb
//! discovers it on `PATH`, runs it in a sandboxed environment to harvest its
//! `--help` text, parses that text into a navigable command tree, and turns
//! a chosen path through that tree back into a safe-to-exec argv. It never
//! shells out through `sh -c`, never retries a spawn, and never assumes
//! anything about the tool beyond "it might print help text and it might
//! print a table."

pub mod config;
pub mod discovery;
pub mod error;
pub mod help;
pub mod introspect;
pub mod output;
pub mod runner;
pub mod sandbox;

pub use config::Configuration;
pub use discovery::{add_single_cli_to_cache, discover, discover_one, DiscoverOptions, DiscoveredCli};
pub use error::{ClimbError, Result};
pub use help::{parse as parse_help, CliOption, CommandNode, ParsedHelp, Telemetry, Usage};
pub use introspect::{resolve_argv, Introspector};
pub use output::{parse_records, TableRecord};
pub use runner::{run, ExecutorResult, RunOptions};
pub use sandbox::sandbox_env;
