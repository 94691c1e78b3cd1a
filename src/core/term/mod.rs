//! ANSI text handling
//!
//! - **parser**: SGR scanner producing styled runs
//! - **style**: rendition types shared by the parser and renderers
//! - **decoder**: UTF-8 decoding across chunk boundaries
//! - **transcript**: line-oriented emulator built on the parser

pub mod decoder;
pub mod parser;
pub mod style;
pub mod transcript;

pub use decoder::Utf8Decoder;
pub use parser::AnsiParser;
pub use style::{ParsedRun, StyleFlags, TextStyle};
pub use transcript::StyledTranscript;
