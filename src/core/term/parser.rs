//! ANSI SGR parser
//!
//! Splits text containing ANSI escape sequences into styled runs. Only the
//! SGR subset (colors, bold, underline, reverse) affects the output; other
//! CSI sequences are consumed so they never leak into the visible text.

use super::style::{ParsedRun, StyleFlags, TextStyle};
use crate::config::Theme;

const ESC: u8 = 0x1B;

/// Stateful SGR scanner
///
/// The current rendition is an attribute of the parser, so a color set at
/// the end of one chunk still applies to the text of the next chunk.
#[derive(Debug, Clone)]
pub struct AnsiParser {
    theme: Theme,
    style: TextStyle,
}

impl Default for AnsiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiParser {
    pub fn new() -> Self {
        Self::with_theme(Theme::default())
    }

    /// Create a parser whose palette and reset rendition come from `theme`
    pub fn with_theme(theme: Theme) -> Self {
        let style = TextStyle::for_theme(&theme);
        Self { theme, style }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Current rendition
    pub fn style(&self) -> TextStyle {
        self.style
    }

    /// Return to the theme's default rendition
    pub fn reset(&mut self) {
        self.style = TextStyle::for_theme(&self.theme);
    }

    /// Parse a chunk of text into styled runs.
    ///
    /// Each escape sequence closes the run in progress. When a chunk ends
    /// with an SGR sequence, a zero-length run carrying the new style marks
    /// the transition.
    pub fn parse(&mut self, input: &str) -> Vec<ParsedRun> {
        let bytes = input.as_bytes();
        let mut runs = Vec::new();
        let mut text = String::new();
        let mut restyled = false;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == ESC && bytes.get(i + 1) == Some(&b'[') {
                let params_start = i + 2;
                let terminator = bytes[params_start..]
                    .iter()
                    .position(|b| b.is_ascii_alphabetic())
                    .map(|offset| params_start + offset);

                let Some(end) = terminator else {
                    // Unterminated: keep the rest verbatim
                    text.push_str(&input[i..]);
                    break;
                };

                if !text.is_empty() {
                    runs.push(ParsedRun::new(std::mem::take(&mut text), self.style));
                    restyled = false;
                }
                if self.execute_csi(&input[params_start..end], bytes[end]) {
                    restyled = true;
                }
                i = end + 1;
            } else {
                let next = bytes[i + 1..]
                    .iter()
                    .position(|&b| b == ESC)
                    .map_or(bytes.len(), |offset| i + 1 + offset);
                text.push_str(&input[i..next]);
                i = next;
            }
        }

        if !text.is_empty() {
            runs.push(ParsedRun::new(text, self.style));
        } else if restyled {
            runs.push(ParsedRun::new(String::new(), self.style));
        }

        runs
    }

    /// Returns true when the sequence was SGR
    fn execute_csi(&mut self, params: &str, final_byte: u8) -> bool {
        match final_byte {
            b'm' => {
                self.execute_sgr(params);
                true
            }
            // Erase, cursor position and movement belong to the emulator
            b'K' | b'J' | b'H' | b'f' | b'A' | b'B' | b'C' | b'D' => false,
            _ => {
                tracing::debug!(
                    "Ignoring CSI: params={:?}, final={:?}",
                    params,
                    final_byte as char
                );
                false
            }
        }
    }

    fn execute_sgr(&mut self, params: &str) {
        if params.is_empty() {
            self.reset();
            return;
        }

        for code in params.split(';').filter_map(|p| p.parse::<u16>().ok()) {
            match code {
                0 => self.reset(),
                1 => self.style.flags |= StyleFlags::BOLD,
                4 => self.style.flags |= StyleFlags::UNDERLINE,
                7 => self.style.flags |= StyleFlags::REVERSE,
                22 => self.style.flags &= !StyleFlags::BOLD,
                24 => self.style.flags &= !StyleFlags::UNDERLINE,
                27 => self.style.flags &= !StyleFlags::REVERSE,

                30..=37 => self.set_fg(usize::from(code - 30)),
                90..=97 => self.set_fg(usize::from(code - 90) + 8),
                40..=47 => self.set_bg(usize::from(code - 40)),
                100..=107 => self.set_bg(usize::from(code - 100) + 8),

                _ => {}
            }
        }
    }

    fn set_fg(&mut self, slot: usize) {
        if let Some(color) = self.theme.color(slot) {
            self.style.fg = color;
        }
    }

    fn set_bg(&mut self, slot: usize) {
        if let Some(color) = self.theme.color(slot) {
            self.style.bg = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Color;

    fn visible(runs: &[ParsedRun]) -> String {
        runs.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn test_plain_text() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("Hello");

        assert_eq!(runs, vec![ParsedRun::new("Hello", TextStyle::default())]);
    }

    #[test]
    fn test_colored_text_then_reset() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("\x1b[31mRed\x1b[0m");

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "Red");
        assert_eq!(runs[0].style.fg, Color::new(255, 0, 0));
        assert!(runs[1].is_boundary());
        assert_eq!(runs[1].style, TextStyle::default());
        assert_eq!(visible(&runs), "Red");
    }

    #[test]
    fn test_bold_red() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("\x1b[1;31mBoldRed\x1b[0m");

        assert_eq!(runs[0].text, "BoldRed");
        assert!(runs[0].style.bold());
        assert_eq!(runs[0].style.fg, Color::new(255, 0, 0));
        assert!(!runs[1].style.bold());
    }

    #[test]
    fn test_style_persists_across_calls() {
        let mut parser = AnsiParser::new();
        let first = parser.parse("\x1b[32m");
        assert_eq!(visible(&first), "");

        let runs = parser.parse("Green");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].style.fg, Color::new(0, 255, 0));
        assert_eq!(runs[0].style, parser.style());
    }

    #[test]
    fn test_mixed_text() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("Normal \x1b[34mBlue\x1b[0m Normal");

        let texts: Vec<&str> = runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Normal ", "Blue", " Normal"]);
        assert_eq!(runs[1].style.fg, Color::new(0, 0, 255));
        assert_eq!(runs[2].style, TextStyle::default());
    }

    #[test]
    fn test_flag_toggles() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("\x1b[1;4;7ma\x1b[22mb\x1b[24mc\x1b[27md");

        assert_eq!(runs[0].style.flags, StyleFlags::all());
        assert_eq!(runs[1].style.flags, StyleFlags::UNDERLINE | StyleFlags::REVERSE);
        assert_eq!(runs[2].style.flags, StyleFlags::REVERSE);
        assert_eq!(runs[3].style.flags, StyleFlags::empty());
    }

    #[test]
    fn test_bright_and_background_colors() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("\x1b[93;104mx\x1b[41my");

        assert_eq!(runs[0].style.fg, Color::new(255, 255, 128));
        assert_eq!(runs[0].style.bg, Color::new(128, 128, 255));
        assert_eq!(runs[1].style.bg, Color::new(255, 0, 0));
        assert_eq!(runs[1].style.fg, Color::new(255, 255, 128));
    }

    #[test]
    fn test_codes_apply_in_order() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("\x1b[31;0;1mx");

        assert_eq!(runs[0].style.fg, Theme::classic().foreground);
        assert!(runs[0].style.bold());
    }

    #[test]
    fn test_unknown_codes_ignored() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("\x1b[31m\x1b[5;38;999mx");

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].style.fg, Color::new(255, 0, 0));
        assert_eq!(runs[0].style.flags, StyleFlags::empty());
    }

    #[test]
    fn test_empty_sgr_resets() {
        let mut parser = AnsiParser::new();
        parser.parse("\x1b[1;35m");
        let runs = parser.parse("\x1b[mplain");

        assert_eq!(runs, vec![ParsedRun::new("plain", TextStyle::default())]);
    }

    #[test]
    fn test_non_sgr_sequences_consumed() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("a\x1b[2Jb\x1b[10;5Hc\x1b[Kd\x1b[3Ae");

        assert_eq!(visible(&runs), "abcde");
        assert!(runs.iter().all(|r| r.style == TextStyle::default()));
    }

    #[test]
    fn test_unterminated_sequence_is_literal() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("ok\x1b[31");

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "ok\x1b[31");
        assert_eq!(runs[0].style, TextStyle::default());
    }

    #[test]
    fn test_lone_escape_is_literal() {
        let mut parser = AnsiParser::new();
        assert_eq!(visible(&parser.parse("a\x1b(b")), "a\x1b(b");
        assert_eq!(visible(&parser.parse("end\x1b")), "end\x1b");
    }

    #[test]
    fn test_noop_reset_still_splits_runs() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("one\x1b[0mtwo");

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].style, runs[1].style);
    }

    #[test]
    fn test_multibyte_text_preserved() {
        let mut parser = AnsiParser::new();
        let runs = parser.parse("\x1b[36mこんにちは\x1b[0m世界");

        assert_eq!(runs[0].text, "こんにちは");
        assert_eq!(runs[1].text, "世界");
    }

    #[test]
    fn test_injected_theme() {
        let mut parser = AnsiParser::with_theme(Theme::dracula());
        let runs = parser.parse("x\x1b[31my");

        assert_eq!(runs[0].style.fg, Theme::dracula().foreground);
        assert_eq!(runs[1].style.fg, Color::new(0xFF, 0x55, 0x55));

        parser.reset();
        assert_eq!(parser.style(), TextStyle::for_theme(&Theme::dracula()));
    }
}
