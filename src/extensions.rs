//! Parser extensions.
//!
//! An extension can declare custom tags together with extra filters and
//! tests.  When the parser encounters one of the declared tags it hands
//! control to the extension which parses the tag body through a
//! [`TagParser`] and returns a statement node composed from the public
//! [`ast`](crate::ast) types.
//!
//! Extensions are registered on the environment at construction time with
//! [`register_extension`](crate::Environment::register_extension).  They
//! are sorted by [`priority`](Extension::priority) (lower first); the first
//! extension that claims a tag handles it.  Filters and tests contributed
//! by extensions never shadow builtins or user registered entries.
//!
//! ```
//! use vinja::ast::{self, Spanned};
//! use vinja::extensions::{Extension, TagParser};
//! use vinja::{Environment, Error};
//!
//! /// Implements `{% hidden %}...{% endhidden %}` which drops its body.
//! #[derive(Debug)]
//! struct HiddenExtension;
//!
//! impl Extension for HiddenExtension {
//!     fn name(&self) -> &str {
//!         "hidden"
//!     }
//!
//!     fn tags(&self) -> &[&str] {
//!         &["hidden"]
//!     }
//!
//!     fn parse(&self, parser: &mut TagParser) -> Result<ast::Stmt, Error> {
//!         let span = parser.span();
//!         parser.parse_body("endhidden")?;
//!         Ok(ast::Stmt::Template(Spanned::new(
//!             ast::Template { children: vec![] },
//!             span,
//!         )))
//!     }
//! }
//!
//! let mut env = Environment::new();
//! env.register_extension(std::sync::Arc::new(HiddenExtension));
//! ```
use std::fmt;

use crate::compiler::ast;
use crate::compiler::parser::Parser;
use crate::compiler::tokens::Span;
use crate::error::{Error, ErrorKind};
use crate::value::Value;

/// A parser extension.
///
/// See the [module level documentation](self) for details.
pub trait Extension: Send + Sync + fmt::Debug {
    /// The name of the extension.
    fn name(&self) -> &str;

    /// The priority of the extension.  Lower priorities are consulted first.
    fn priority(&self) -> i32 {
        100
    }

    /// The tags this extension claims.
    fn tags(&self) -> &[&str] {
        &[]
    }

    /// Filters contributed by this extension.
    ///
    /// Values are typically created with
    /// [`Value::from_function`](crate::value::Value::from_function).
    fn filters(&self) -> Vec<(&str, Value)> {
        Vec::new()
    }

    /// Tests contributed by this extension.
    fn tests(&self) -> Vec<(&str, Value)> {
        Vec::new()
    }

    /// Parses one of the claimed tags into a statement.
    fn parse(&self, parser: &mut TagParser) -> Result<ast::Stmt, Error> {
        Err(Error::new(
            ErrorKind::ParseError,
            format!(
                "extension {} claims tag {} but does not implement parsing",
                self.name(),
                parser.tag()
            ),
        ))
    }
}

/// A restricted view of the parser handed to extensions.
///
/// The tag parser is positioned right after the tag name; the extension
/// must leave it positioned at the closing delimiter of its final tag.
pub struct TagParser<'a, 's> {
    parser: &'a mut Parser<'s>,
    tag: String,
}

impl<'a, 's> TagParser<'a, 's> {
    pub(crate) fn new(parser: &'a mut Parser<'s>, tag: &str) -> TagParser<'a, 's> {
        TagParser {
            parser,
            tag: tag.to_string(),
        }
    }

    /// The name of the tag being parsed.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The span of the current token.
    pub fn span(&self) -> Span {
        self.parser.current_span()
    }

    /// Parses an expression.
    pub fn parse_expr(&mut self) -> Result<ast::Expr, Error> {
        self.parser.parse_expr()
    }

    /// Asserts that the tag arguments are exhausted.
    pub fn expect_block_end(&mut self) -> Result<(), Error> {
        self.parser.expect_block_end()
    }

    /// Parses the tag body up to (and including) the given end tag.
    ///
    /// The closing delimiter of the end tag stays in the stream for the
    /// surrounding parser.
    pub fn parse_body(&mut self, end_tag: &str) -> Result<Vec<ast::Stmt>, Error> {
        ok!(self.parser.consume_block_end());
        self.parser.subparse_until(&[end_tag])
    }
}
