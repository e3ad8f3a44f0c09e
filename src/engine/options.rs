//! Engine configuration.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

bitflags::bitflags! {
    /// Whitespace trimming applied to each logical line before dispatch.
    ///
    /// `Trim::empty()` leaves the line alone; `Trim::BOTH` trims both ends.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Trim: u8 {
        const LEFT  = 1 << 0;
        const RIGHT = 1 << 1;
        const BOTH  = Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

impl Default for Trim {
    fn default() -> Self {
        Trim::empty()
    }
}

/// Built-in line-unwrapping styles. See the `unwrap` module for semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineWrapStyle {
    /// No unwrapping; every physical line is a logical line.
    #[default]
    None,
    /// A line ending in `\` continues on the next line.
    TrailingBackslash,
    /// SPICE netlists: a line starting with `+` continues the previous one.
    Spice,
    /// Every non-empty line joins the previous one; blank lines separate.
    JustNextLine,
    /// The whole input is one logical line.
    Slurp,
    /// User-supplied `is_wrapped`/`unwrap` routines.
    Custom,
}

impl LineWrapStyle {
    /// The join direction this style implies. `Custom` defaults to
    /// [`MultilineType::JoinNext`] until overridden.
    pub fn multiline_type(self) -> MultilineType {
        match self {
            LineWrapStyle::None => MultilineType::None,
            LineWrapStyle::TrailingBackslash | LineWrapStyle::Custom => MultilineType::JoinNext,
            LineWrapStyle::Spice | LineWrapStyle::JustNextLine | LineWrapStyle::Slurp => MultilineType::JoinLast,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            LineWrapStyle::None => "none",
            LineWrapStyle::TrailingBackslash => "trailing_backslash",
            LineWrapStyle::Spice => "spice",
            LineWrapStyle::JustNextLine => "just_next_line",
            LineWrapStyle::Slurp => "slurp",
            LineWrapStyle::Custom => "custom",
        }
    }
}

/// Whether a wrapped line joins forward into the next line or backward onto
/// the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultilineType {
    /// No joining.
    #[default]
    None,
    /// The wrap marker says "my continuation is the *next* line".
    JoinNext,
    /// The wrap marker says "I continue the *previous* line".
    JoinLast,
}

/// A user-supplied whole-line trimmer, applied instead of [`Trim`].
pub type LineTrimmer = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Engine construction options. All of them can also be flipped through the
/// `Parser` setters after construction.
#[derive(Clone)]
pub struct Options {
    /// Strip the trailing newline from each logical line.
    pub auto_chomp: bool,
    /// Split each logical line into fields on `field_separator`.
    pub auto_split: bool,
    /// Whitespace trimming applied before splitting.
    pub auto_trim: Trim,
    /// When set, replaces `auto_trim` entirely.
    pub custom_line_trimmer: Option<LineTrimmer>,
    /// Field separator used by auto-split. Defaults to `\s+`.
    pub field_separator: Regex,
    /// Compute each line's leading-indent count.
    pub track_indentation: bool,
    /// The unit of indentation counted by `track_indentation`.
    pub indentation_str: String,
    /// Line unwrapping style.
    pub line_wrap_style: LineWrapStyle,
    /// Join direction; derived from `line_wrap_style` unless the style is
    /// `Custom`.
    pub multiline_type: MultilineType,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            auto_chomp: false,
            auto_split: false,
            auto_trim: Trim::default(),
            custom_line_trimmer: None,
            field_separator: crate::regex!(r"\s+").clone(),
            track_indentation: false,
            indentation_str: " ".to_string(),
            line_wrap_style: LineWrapStyle::default(),
            multiline_type: MultilineType::default(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("auto_chomp", &self.auto_chomp)
            .field("auto_split", &self.auto_split)
            .field("auto_trim", &self.auto_trim)
            .field("custom_line_trimmer", &self.custom_line_trimmer.as_ref().map(|_| "<fn>"))
            .field("field_separator", &self.field_separator.as_str())
            .field("track_indentation", &self.track_indentation)
            .field("indentation_str", &self.indentation_str)
            .field("line_wrap_style", &self.line_wrap_style)
            .field("multiline_type", &self.multiline_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_derive_their_join_direction() {
        assert_eq!(LineWrapStyle::None.multiline_type(), MultilineType::None);
        assert_eq!(LineWrapStyle::TrailingBackslash.multiline_type(), MultilineType::JoinNext);
        assert_eq!(LineWrapStyle::Spice.multiline_type(), MultilineType::JoinLast);
        assert_eq!(LineWrapStyle::JustNextLine.multiline_type(), MultilineType::JoinLast);
        assert_eq!(LineWrapStyle::Slurp.multiline_type(), MultilineType::JoinLast);
        assert_eq!(LineWrapStyle::Custom.multiline_type(), MultilineType::JoinNext);
    }

    #[test]
    fn default_field_separator_is_whitespace() {
        let opts = Options::default();
        let fields: Vec<&str> = opts.field_separator.split("a  b\tc").collect();
        assert_eq!(fields, vec!["a", "b", "c"]);
    }
}
