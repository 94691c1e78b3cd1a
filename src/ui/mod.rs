//! Console output for the termbridge binary.
//!
//! - **renderer**: streams styled runs to stdout with crossterm

pub mod renderer;

pub use renderer::ConsoleRenderer;
