//! LockBank server: configuration, logging, metric descriptions, stack
//! assembly and the administrative operations behind the CLI.

pub mod admin;
pub mod metrics;
pub mod model;
pub mod startup;

pub use model::{Cli, Command, Configuration};
pub use startup::{Stack, build_stack};
