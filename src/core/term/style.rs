//! Text rendition
//!
//! The parser keeps one mutable [`TextStyle`] as its "current rendition"
//! and copies it into every [`ParsedRun`] it emits.

use bitflags::bitflags;

use crate::config::{Color, Theme};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StyleFlags: u8 {
        const BOLD      = 0b0000_0001;
        const UNDERLINE = 0b0000_0010;
        const REVERSE   = 0b0000_0100;
    }
}

/// Current graphic rendition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextStyle {
    pub fg: Color,
    pub bg: Color,
    pub flags: StyleFlags,
}

impl TextStyle {
    /// Default rendition for a theme
    pub fn for_theme(theme: &Theme) -> Self {
        Self {
            fg: theme.foreground,
            bg: theme.background,
            flags: StyleFlags::empty(),
        }
    }

    pub fn bold(&self) -> bool {
        self.flags.contains(StyleFlags::BOLD)
    }

    pub fn underline(&self) -> bool {
        self.flags.contains(StyleFlags::UNDERLINE)
    }

    pub fn reverse(&self) -> bool {
        self.flags.contains(StyleFlags::REVERSE)
    }

    /// Foreground and background after applying reverse video
    pub fn effective_colors(&self) -> (Color, Color) {
        if self.reverse() {
            (self.bg, self.fg)
        } else {
            (self.fg, self.bg)
        }
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self::for_theme(&Theme::default())
    }
}

/// A span of text sharing one style
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedRun {
    pub text: String,
    pub style: TextStyle,
}

impl ParsedRun {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    /// Zero-length runs only mark a style transition
    pub fn is_boundary(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_swaps_effective_colors() {
        let mut style = TextStyle::default();
        style.flags |= StyleFlags::REVERSE;

        let (fg, bg) = style.effective_colors();
        assert_eq!(fg, Theme::classic().background);
        assert_eq!(bg, Theme::classic().foreground);
    }

    #[test]
    fn test_theme_default_style() {
        let style = TextStyle::for_theme(&Theme::nord());
        assert_eq!(style.fg, Theme::nord().foreground);
        assert!(!style.bold() && !style.underline() && !style.reverse());
    }
}
