#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod health;
#[doc(hidden)]
pub mod observability;
pub mod plan;
pub mod report;
pub mod resource;
pub mod ui;

pub use cli::Cli;
pub use config::Config;
