//! Console renderer using crossterm
//!
//! Prints session output as it arrives, translating the theme-resolved
//! styles of each parsed run into crossterm commands.

use std::io::{self, Write};

use crossterm::queue;
use crossterm::style::{Attribute, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor};

use termbridge::config::Theme;
use termbridge::core::term::{AnsiParser, ParsedRun, StyleFlags, TextStyle, Utf8Decoder};
use termbridge::core::Emulator;

/// Emulator that streams styled text to a writer
pub struct ConsoleRenderer<W: Write> {
    out: W,
    parser: AnsiParser,
    decoder: Utf8Decoder,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, theme: Theme) -> Self {
        Self {
            out,
            parser: AnsiParser::with_theme(theme),
            decoder: Utf8Decoder::new(),
        }
    }

    /// Decode, parse and print one chunk
    pub fn render(&mut self, bytes: &[u8]) -> io::Result<()> {
        let text = self.decoder.decode(bytes);
        for run in self.parser.parse(&text) {
            self.print_run(&run)?;
        }
        queue!(self.out, ResetColor, SetAttribute(Attribute::Reset))?;
        self.out.flush()
    }

    fn print_run(&mut self, run: &ParsedRun) -> io::Result<()> {
        if run.is_boundary() {
            return Ok(());
        }
        self.apply_style(&run.style)?;
        self.out.write_all(run.text.as_bytes())
    }

    /// Apply a run's style
    fn apply_style(&mut self, style: &TextStyle) -> io::Result<()> {
        queue!(self.out, SetAttribute(Attribute::Reset))?;

        if style.flags.contains(StyleFlags::BOLD) {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        if style.flags.contains(StyleFlags::UNDERLINE) {
            queue!(self.out, SetAttribute(Attribute::Underlined))?;
        }

        // Reverse is resolved here so the theme colors swap, not the console's
        let (fg, bg) = style.effective_colors();
        queue!(
            self.out,
            SetForegroundColor(fg.to_crossterm()),
            SetBackgroundColor(bg.to_crossterm())
        )
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Emulator for ConsoleRenderer<W> {
    fn append(&mut self, data: &[u8]) {
        if let Err(e) = self.render(data) {
            tracing::warn!("Render failed: {}", e);
        }
    }

    fn reset(&mut self) {
        self.parser.reset();
        self.decoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(input: &[u8]) -> String {
        let mut renderer = ConsoleRenderer::new(Vec::new(), Theme::classic());
        renderer.render(input).unwrap();
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_plain_text_uses_theme_colors() {
        let output = rendered(b"hello");
        assert!(output.contains("\x1b[38;2;0;255;0m"));
        assert!(output.contains("\x1b[48;2;0;0;0m"));
        assert!(output.contains("hello"));
    }

    #[test]
    fn test_bold_red_run() {
        let output = rendered(b"\x1b[1;31mhot\x1b[0m");
        let text_at = output.find("hot").unwrap();
        let prefix = &output[..text_at];

        assert!(prefix.contains("\x1b[1m"));
        assert!(prefix.contains("\x1b[38;2;255;0;0m"));
        assert!(!output.contains("[1;31m"));
    }

    #[test]
    fn test_reverse_swaps_colors() {
        let output = rendered(b"\x1b[7mrev");
        assert!(output.contains("\x1b[38;2;0;0;0m"));
        assert!(output.contains("\x1b[48;2;0;255;0m"));
    }
}
