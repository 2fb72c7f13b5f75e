//! Documents and configures the syntax of the engine.
//!
//! The delimiters of the template syntax can be reconfigured per
//! environment.  The start markers must be distinct from each other, the
//! end markers may be shared.
//!
//! ```
//! # use vinja::{Environment, syntax::SyntaxConfig};
//! let mut env = Environment::new();
//! env.set_syntax(
//!     SyntaxConfig::builder()
//!         .block_delimiters("{%", "%}")
//!         .variable_delimiters("${", "}")
//!         .comment_delimiters("{#", "#}")
//!         .build()
//!         .unwrap(),
//! );
//! ```
use std::borrow::Cow;
use std::sync::Arc;

use aho_corasick::AhoCorasick;

use crate::error::{Error, ErrorKind};

/// Utility enum that identifies the kind of a start delimiter.
#[derive(Debug, Copy, Clone)]
pub(crate) enum StartMarker {
    Variable,
    Block,
    Comment,
}

#[derive(Debug, PartialEq, Clone)]
struct Delims {
    block_start: Cow<'static, str>,
    block_end: Cow<'static, str>,
    variable_start: Cow<'static, str>,
    variable_end: Cow<'static, str>,
    comment_start: Cow<'static, str>,
    comment_end: Cow<'static, str>,
    line_statement_prefix: Option<Cow<'static, str>>,
    line_comment_prefix: Option<Cow<'static, str>>,
}

const DEFAULT_DELIMS: Delims = Delims {
    block_start: Cow::Borrowed("{%"),
    block_end: Cow::Borrowed("%}"),
    variable_start: Cow::Borrowed("{{"),
    variable_end: Cow::Borrowed("}}"),
    comment_start: Cow::Borrowed("{#"),
    comment_end: Cow::Borrowed("#}"),
    line_statement_prefix: None,
    line_comment_prefix: None,
};

/// Builder to construct a [`SyntaxConfig`].
#[derive(Debug)]
pub struct SyntaxBuilder {
    delims: Delims,
}

impl SyntaxBuilder {
    /// Sets the block start and end delimiters.
    pub fn block_delimiters<S, E>(&mut self, s: S, e: E) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
        E: Into<Cow<'static, str>>,
    {
        self.delims.block_start = s.into();
        self.delims.block_end = e.into();
        self
    }

    /// Sets the variable start and end delimiters.
    pub fn variable_delimiters<S, E>(&mut self, s: S, e: E) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
        E: Into<Cow<'static, str>>,
    {
        self.delims.variable_start = s.into();
        self.delims.variable_end = e.into();
        self
    }

    /// Sets the comment start and end delimiters.
    pub fn comment_delimiters<S, E>(&mut self, s: S, e: E) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
        E: Into<Cow<'static, str>>,
    {
        self.delims.comment_start = s.into();
        self.delims.comment_end = e.into();
        self
    }

    /// Enables line statements with the given prefix (eg: `#`).
    pub fn line_statement_prefix<S>(&mut self, prefix: S) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.delims.line_statement_prefix = Some(prefix.into());
        self
    }

    /// Enables line comments with the given prefix (eg: `##`).
    pub fn line_comment_prefix<S>(&mut self, prefix: S) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.delims.line_comment_prefix = Some(prefix.into());
        self
    }

    /// Builds the final syntax config.
    ///
    /// This validates that the start delimiters are distinct and fails
    /// with an error of kind
    /// [`InvalidDelimiter`](crate::ErrorKind::InvalidDelimiter) otherwise.
    pub fn build(&self) -> Result<SyntaxConfig, Error> {
        let delims = self.delims.clone();
        if delims == DEFAULT_DELIMS {
            return Ok(SyntaxConfig::default());
        } else if delims.block_start == delims.variable_start
            || delims.block_start == delims.comment_start
            || delims.variable_start == delims.comment_start
            || delims.block_start.is_empty()
            || delims.variable_start.is_empty()
            || delims.comment_start.is_empty()
            || delims.block_end.is_empty()
            || delims.variable_end.is_empty()
            || delims.comment_end.is_empty()
        {
            return Err(ErrorKind::InvalidDelimiter.into());
        }

        let mut start_delimiters_order = [
            StartMarker::Variable,
            StartMarker::Block,
            StartMarker::Comment,
        ];
        start_delimiters_order.sort_by_key(|marker| {
            std::cmp::Reverse(match marker {
                StartMarker::Variable => delims.variable_start.len(),
                StartMarker::Block => delims.block_start.len(),
                StartMarker::Comment => delims.comment_start.len(),
            })
        });

        let aho_corasick = ok!(AhoCorasick::builder()
            .match_kind(aho_corasick::MatchKind::LeftmostLongest)
            .build([
                &delims.variable_start as &str,
                &delims.block_start as &str,
                &delims.comment_start as &str,
            ])
            .map_err(|_| Error::from(ErrorKind::InvalidDelimiter)));

        Ok(SyntaxConfig(Arc::new(SyntaxConfigRepr {
            delims,
            start_delimiters_order,
            aho_corasick: Some(aho_corasick),
        })))
    }
}

#[derive(Debug)]
struct SyntaxConfigRepr {
    delims: Delims,
    start_delimiters_order: [StartMarker; 3],
    aho_corasick: Option<AhoCorasick>,
}

/// The delimiter configuration for the lexer.
#[derive(Debug, Clone)]
pub struct SyntaxConfig(Arc<SyntaxConfigRepr>);

impl Default for SyntaxConfig {
    fn default() -> Self {
        SyntaxConfig(Arc::new(SyntaxConfigRepr {
            delims: DEFAULT_DELIMS,
            start_delimiters_order: [
                StartMarker::Variable,
                StartMarker::Block,
                StartMarker::Comment,
            ],
            aho_corasick: None,
        }))
    }
}

impl SyntaxConfig {
    /// Creates a syntax builder.
    pub fn builder() -> SyntaxBuilder {
        SyntaxBuilder {
            delims: DEFAULT_DELIMS,
        }
    }

    /// Returns the block delimiters.
    pub fn block_delimiters(&self) -> (&str, &str) {
        (&self.0.delims.block_start, &self.0.delims.block_end)
    }

    /// Returns the variable delimiters.
    pub fn variable_delimiters(&self) -> (&str, &str) {
        (&self.0.delims.variable_start, &self.0.delims.variable_end)
    }

    /// Returns the comment delimiters.
    pub fn comment_delimiters(&self) -> (&str, &str) {
        (&self.0.delims.comment_start, &self.0.delims.comment_end)
    }

    /// Returns the configured line statement prefix.
    pub fn line_statement_prefix(&self) -> Option<&str> {
        self.0.delims.line_statement_prefix.as_deref()
    }

    /// Returns the configured line comment prefix.
    pub fn line_comment_prefix(&self) -> Option<&str> {
        self.0.delims.line_comment_prefix.as_deref()
    }

    /// Finds the byte offset of the next start marker together with the
    /// information if it carries a whitespace trim marker (`-`).
    pub(crate) fn find_start_marker(&self, rest: &str) -> Option<(usize, bool)> {
        match self.0.aho_corasick {
            Some(ref ac) => {
                let bytes = rest.as_bytes();
                ac.find(bytes).map(|m| {
                    (
                        m.start(),
                        bytes.get(m.start() + m.len()).copied() == Some(b'-'),
                    )
                })
            }
            None => find_start_marker_default(rest),
        }
    }

    /// Matches the start marker at the beginning of `rest`.
    pub(crate) fn match_start_marker(&self, rest: &str) -> Option<(StartMarker, usize)> {
        if self.0.aho_corasick.is_none() {
            return match rest.get(..2) {
                Some("{{") => Some((StartMarker::Variable, 2)),
                Some("{%") => Some((StartMarker::Block, 2)),
                Some("{#") => Some((StartMarker::Comment, 2)),
                _ => None,
            };
        }

        for delimiter in self.0.start_delimiters_order {
            let marker = match delimiter {
                StartMarker::Variable => &self.0.delims.variable_start as &str,
                StartMarker::Block => &self.0.delims.block_start as &str,
                StartMarker::Comment => &self.0.delims.comment_start as &str,
            };
            if rest.get(..marker.len()) == Some(marker) {
                return Some((delimiter, marker.len()));
            }
        }

        None
    }
}

fn find_start_marker_default(rest: &str) -> Option<(usize, bool)> {
    let bytes = rest.as_bytes();
    let mut offset = 0;
    loop {
        let idx = some!(crate::utils::memchr(&bytes[offset..], b'{'));
        if let Some(b'{' | b'%' | b'#') = bytes.get(offset + idx + 1).copied() {
            return Some((
                offset + idx,
                bytes.get(offset + idx + 2).copied() == Some(b'-'),
            ));
        }
        offset += idx + 1;
    }
}

/// Configures the whitespace handling of the engine.
#[derive(Debug, Clone)]
pub struct WhitespaceConfig {
    /// Strip the first newline after a block tag.
    pub trim_blocks: bool,
    /// Strip leading whitespace on block tag lines.
    pub lstrip_blocks: bool,
    /// Keep the single trailing newline of the template source.
    pub keep_trailing_newline: bool,
    /// The newline sequence template data is normalized to.
    pub newline_sequence: &'static str,
}

impl Default for WhitespaceConfig {
    fn default() -> WhitespaceConfig {
        WhitespaceConfig {
            trim_blocks: false,
            lstrip_blocks: false,
            keep_trailing_newline: false,
            newline_sequence: "\n",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_syntax_markers() {
        let syntax = SyntaxConfig::default();
        assert!(syntax.find_start_marker("{").is_none());
        assert!(syntax.find_start_marker("foo").is_none());
        assert!(syntax.find_start_marker("foo {").is_none());
        assert_eq!(syntax.find_start_marker("foo {{"), Some((4, false)));
        assert_eq!(syntax.find_start_marker("foo {{-"), Some((4, true)));
    }

    #[test]
    fn test_custom_syntax_markers() {
        let syntax = SyntaxConfig::builder()
            .block_delimiters("%{", "}%")
            .variable_delimiters("[[", "]]")
            .comment_delimiters("/*", "*/")
            .build()
            .unwrap();
        assert_eq!(syntax.find_start_marker("%{"), Some((0, false)));
        assert!(syntax.find_start_marker("/").is_none());
        assert!(syntax.find_start_marker("foo [").is_none());
        assert_eq!(syntax.find_start_marker("foo /*"), Some((4, false)));
        assert_eq!(syntax.find_start_marker("foo [[-"), Some((4, true)));
    }

    #[test]
    fn test_rejects_conflicting_delimiters() {
        assert!(SyntaxConfig::builder()
            .block_delimiters("{{", "}}")
            .build()
            .is_err());
    }
}
