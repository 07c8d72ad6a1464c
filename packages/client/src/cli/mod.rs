//! Terminal chat client built on [`crate::ChatSession`].

pub mod formatter;
pub mod input;
pub mod runner;
pub mod ui;

pub use runner::{ClientOptions, run_client};
