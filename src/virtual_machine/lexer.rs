//! Assembly tokenizer.
//!
//! Splits source text into a lazy stream of token slices. Rules, applied
//! left to right with longest match:
//!
//! - whitespace is skipped
//! - a run of digits and `.` is a numeric literal; a `-` directly followed
//!   by a digit starts one as well
//! - a run of ASCII letters, digits, `:` and `_` is an identifier (labels are
//!   identifiers ending in `:`)
//! - the dialect's comment character discards the rest of the line
//! - in the [`Dialect::Macro`] dialect `#` is a token of its own and
//!   `"..."` is a single string token
//! - anything else becomes a one-character punctuation token, left for the
//!   assembler to reject
//!
//! Tokens carry no position; diagnostics are the assembler's job.

use std::iter::FusedIterator;

const SEMICOLON_COMMENT: u8 = b';';
const HASH_COMMENT: u8 = b'#';
const MACRO_MARKER: u8 = b'#';
const STRING_QUOTE: u8 = b'"';

/// Source dialect: picks the comment syntax and whether macros exist.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Dialect {
    /// `;` comments to end of line.
    Semicolon,
    /// `#` comments to end of line.
    Hash,
    /// `;` comments, `#` marks a `define` directive.
    #[default]
    Macro,
}

impl Dialect {
    /// Parses a dialect name as accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "semicolon" => Some(Dialect::Semicolon),
            "hash" => Some(Dialect::Hash),
            "macro" => Some(Dialect::Macro),
            _ => None,
        }
    }

    const fn comment_char(&self) -> u8 {
        match self {
            Dialect::Semicolon | Dialect::Macro => SEMICOLON_COMMENT,
            Dialect::Hash => HASH_COMMENT,
        }
    }

    pub(crate) const fn has_macros(&self) -> bool {
        matches!(self, Dialect::Macro)
    }
}

/// Lazy, single-pass tokenizer over a source buffer.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    dialect: Dialect,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, dialect: Dialect) -> Self {
        Self {
            src,
            pos: 0,
            dialect,
        }
    }

    fn peek_byte(&self, at: usize) -> Option<u8> {
        self.src.as_bytes().get(at).copied()
    }

    /// Advances while `pred` holds and returns the consumed slice.
    fn take_while(&mut self, start: usize, pred: impl Fn(u8) -> bool) -> &'a str {
        while self.peek_byte(self.pos).is_some_and(&pred) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn skip_line(&mut self) {
        while self.peek_byte(self.pos).is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
    }

    /// Reads `"..."` up to the closing quote; an unterminated literal stops at end of line.
    fn take_string(&mut self, start: usize) -> &'a str {
        self.pos += 1;
        while let Some(b) = self.peek_byte(self.pos) {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
            if b == STRING_QUOTE {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn starts_number(&self, at: usize) -> bool {
        match self.peek_byte(at) {
            Some(b) if is_number_byte(b) => true,
            Some(b'-') => self.peek_byte(at + 1).is_some_and(|b| b.is_ascii_digit()),
            _ => false,
        }
    }
}

fn is_number_byte(b: u8) -> bool {
    b.is_ascii_digit() || b == b'.'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b':' || b == b'_'
}

impl<'a> Iterator for Lexer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(b) = self.peek_byte(self.pos) {
            let start = self.pos;

            if b.is_ascii_whitespace() {
                self.pos += 1;
                continue;
            }

            if b == self.dialect.comment_char() {
                self.skip_line();
                continue;
            }

            if self.dialect.has_macros() {
                if b == MACRO_MARKER {
                    self.pos += 1;
                    return Some(&self.src[start..self.pos]);
                }
                if b == STRING_QUOTE {
                    return Some(self.take_string(start));
                }
            }

            if self.starts_number(start) {
                self.pos += 1;
                return Some(self.take_while(start, is_number_byte));
            }

            if is_ident_byte(b) {
                return Some(self.take_while(start, is_ident_byte));
            }

            let width = self.src[start..].chars().next().map_or(1, char::len_utf8);
            self.pos += width;
            return Some(&self.src[start..self.pos]);
        }
        None
    }
}

impl FusedIterator for Lexer<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str, dialect: Dialect) -> Vec<&str> {
        Lexer::new(src, dialect).collect()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            lex("push 1\n\tpush  2 plus", Dialect::Semicolon),
            vec!["push", "1", "push", "2", "plus"]
        );
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert!(lex("", Dialect::Macro).is_empty());
        assert!(lex("   \n\t ", Dialect::Hash).is_empty());
    }

    #[test]
    fn labels_keep_their_colon() {
        assert_eq!(
            lex("loop: jmp loop", Dialect::Semicolon),
            vec!["loop:", "jmp", "loop"]
        );
        assert_eq!(lex("my_fn2:", Dialect::Hash), vec!["my_fn2:"]);
    }

    #[test]
    fn numbers_include_dots_and_leading_minus() {
        assert_eq!(
            lex("push 3.25 dup -1 push .5", Dialect::Semicolon),
            vec!["push", "3.25", "dup", "-1", "push", ".5"]
        );
    }

    #[test]
    fn digit_run_ends_before_letters() {
        assert_eq!(lex("12abc", Dialect::Semicolon), vec!["12", "abc"]);
    }

    #[test]
    fn lone_minus_is_punctuation() {
        assert_eq!(lex("- 1", Dialect::Semicolon), vec!["-", "1"]);
    }

    #[test]
    fn semicolon_comments() {
        assert_eq!(
            lex("push 1 ; push 2\nplus", Dialect::Semicolon),
            vec!["push", "1", "plus"]
        );
        assert_eq!(lex("# x", Dialect::Semicolon), vec!["#", "x"]);
    }

    #[test]
    fn hash_comments() {
        assert_eq!(
            lex("push 1 # push 2\nplus ;", Dialect::Hash),
            vec!["push", "1", "plus", ";"]
        );
    }

    #[test]
    fn macro_dialect_emits_marker_and_strings() {
        assert_eq!(
            lex("# define GREETING \"hi there\" ; note\npush GREETING", Dialect::Macro),
            vec!["#", "define", "GREETING", "\"hi there\"", "push", "GREETING"]
        );
    }

    #[test]
    fn unterminated_string_stops_at_line_end() {
        assert_eq!(
            lex("\"open\nhalt", Dialect::Macro),
            vec!["\"open", "halt"]
        );
    }

    #[test]
    fn lexer_is_lazy_and_fused() {
        let mut lexer = Lexer::new("nop halt", Dialect::Macro);
        assert_eq!(lexer.next(), Some("nop"));
        assert_eq!(lexer.next(), Some("halt"));
        assert_eq!(lexer.next(), None);
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn dialect_from_name() {
        assert_eq!(Dialect::from_name("HASH"), Some(Dialect::Hash));
        assert_eq!(Dialect::from_name("macro"), Some(Dialect::Macro));
        assert_eq!(Dialect::from_name("tabs"), None);
        assert_eq!(Dialect::default(), Dialect::Macro);
    }
}
