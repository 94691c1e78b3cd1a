//! Styled transcript
//!
//! A line-oriented [`Emulator`] that keeps the session output as styled
//! runs. It has no cursor model: carriage returns are dropped, line feeds
//! start a new line, and only the newest `max_rows` lines are retained.

use std::collections::VecDeque;

use super::decoder::Utf8Decoder;
use super::parser::AnsiParser;
use super::style::{ParsedRun, TextStyle};
use crate::config::Theme;
use crate::core::channel::PtySize;
use crate::core::session::Emulator;

pub struct StyledTranscript {
    parser: AnsiParser,
    decoder: Utf8Decoder,
    lines: VecDeque<Vec<ParsedRun>>,
    current: Vec<ParsedRun>,
    max_rows: usize,
    size: PtySize,
}

impl StyledTranscript {
    pub fn new(theme: Theme, max_rows: usize) -> Self {
        Self {
            parser: AnsiParser::with_theme(theme),
            decoder: Utf8Decoder::new(),
            lines: VecDeque::new(),
            current: Vec::new(),
            max_rows: max_rows.max(1),
            size: PtySize::default(),
        }
    }

    /// Decode, parse and record a chunk of output
    pub fn feed(&mut self, bytes: &[u8]) {
        let text = self.decoder.decode(bytes);
        for run in self.parser.parse(&text) {
            for (i, segment) in run.text.split('\n').enumerate() {
                if i > 0 {
                    self.newline();
                }
                self.push_text(segment, run.style);
            }
        }
    }

    fn push_text(&mut self, segment: &str, style: TextStyle) {
        let text: String = segment.chars().filter(|&c| c != '\r').collect();
        if text.is_empty() {
            return;
        }
        match self.current.last_mut() {
            Some(last) if last.style == style => last.text.push_str(&text),
            _ => self.current.push(ParsedRun::new(text, style)),
        }
    }

    fn newline(&mut self) {
        self.lines.push_back(std::mem::take(&mut self.current));
        // The line in progress counts towards the limit
        while self.lines.len() >= self.max_rows {
            self.lines.pop_front();
        }
    }

    /// All lines, oldest first, including the unfinished last line
    pub fn lines(&self) -> impl Iterator<Item = &[ParsedRun]> + '_ {
        self.lines
            .iter()
            .map(Vec::as_slice)
            .chain(std::iter::once(self.current.as_slice()))
    }

    /// Plain text with styles stripped
    pub fn text(&self) -> String {
        self.lines()
            .map(|line| line.iter().map(|run| run.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn rows(&self) -> usize {
        self.lines.len() + 1
    }

    pub fn size(&self) -> PtySize {
        self.size
    }

    /// Rendition that will apply to the next text
    pub fn style(&self) -> TextStyle {
        self.parser.style()
    }
}

impl Emulator for StyledTranscript {
    fn append(&mut self, data: &[u8]) {
        self.feed(data);
    }

    fn resize(&mut self, size: PtySize) {
        self.size = size;
    }

    fn reset(&mut self) {
        self.parser.reset();
        self.decoder.reset();
        self.lines.clear();
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Color;

    #[test]
    fn test_lines_and_styles() {
        let mut transcript = StyledTranscript::new(Theme::classic(), 100);
        transcript.feed(b"$ ls\r\n\x1b[34mdir\x1b[0m file\r\n$ ");

        let lines: Vec<&[ParsedRun]> = transcript.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0][0].text, "$ ls");
        assert_eq!(lines[1][0].text, "dir");
        assert_eq!(lines[1][0].style.fg, Color::new(0, 0, 255));
        assert_eq!(lines[1][1].text, " file");
        assert_eq!(transcript.text(), "$ ls\ndir file\n$ ");
    }

    #[test]
    fn test_style_and_characters_span_chunks() {
        let mut transcript = StyledTranscript::new(Theme::classic(), 100);
        let bytes = "\x1b[31m赤".as_bytes();
        transcript.feed(&bytes[..bytes.len() - 1]);
        transcript.feed(&bytes[bytes.len() - 1..]);
        transcript.feed(b" red");

        let line: Vec<&[ParsedRun]> = transcript.lines().collect();
        assert_eq!(line[0].len(), 1);
        assert_eq!(line[0][0].text, "赤 red");
        assert_eq!(line[0][0].style.fg, Color::new(255, 0, 0));
    }

    #[test]
    fn test_row_limit() {
        let mut transcript = StyledTranscript::new(Theme::classic(), 3);
        transcript.feed(b"1\n2\n3\n4\n5");

        assert_eq!(transcript.rows(), 3);
        assert_eq!(transcript.text(), "3\n4\n5");
    }

    #[test]
    fn test_reset_clears_output_and_style() {
        let mut transcript = StyledTranscript::new(Theme::classic(), 10);
        transcript.feed(b"\x1b[1mbold\n");
        transcript.reset();

        assert_eq!(transcript.text(), "");
        assert_eq!(transcript.style(), TextStyle::default());
    }
}
