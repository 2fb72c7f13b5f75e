use std::borrow::Cow;
use std::fmt;

/// Represents template errors.
///
/// Errors carry the kind of failure, a human readable detail, the name and
/// line of the template that produced them and, when the failure happened
/// inside nested template evaluation (`{% include %}`, `{% extends %}` or a
/// macro call), the stack of enclosing template frames.
pub struct Error {
    repr: Box<ErrorRepr>,
}

struct ErrorRepr {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    template_stack: Vec<(String, usize)>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut err = f.debug_struct("Error");
        err.field("kind", &self.repr.kind);
        if let Some(ref detail) = self.repr.detail {
            err.field("detail", detail);
        }
        if let Some(ref name) = self.repr.name {
            err.field("name", name);
            err.field("line", &self.repr.lineno);
        }
        if let Some(ref source) = self.repr.source {
            err.field("source", source);
        }
        err.finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The lexer encountered malformed template source.
    LexError,
    /// The parser encountered an unexpected token or tag.
    ParseError,
    /// A template could not be loaded.
    TemplateNotFound,
    /// A variable or attribute is undefined under a strict policy.
    UndefinedError,
    /// An operation was attempted on incompatible types.
    TypeError,
    /// A name (function, block or macro) could not be resolved.
    NameError,
    /// An attribute could not be looked up.
    AttributeError,
    /// A callable was invoked with invalid arguments.
    ArgumentError,
    /// An integer division or modulo by zero.
    ZeroDivisionError,
    /// A filter or test failed or does not exist.
    FilterError,
    /// The sandbox policy rejected an operation.
    SecurityError,
    /// The macro/include recursion depth guard tripped.
    RecursionLimit,
    /// A value could not be serialized into the engine representation.
    BadSerialization,
    /// The delimiter configuration is invalid.
    InvalidDelimiter,
    /// A catch-all for operations the engine cannot perform.
    InvalidOperation,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::LexError => "syntax error",
            ErrorKind::ParseError => "syntax error",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::UndefinedError => "undefined value",
            ErrorKind::TypeError => "type error",
            ErrorKind::NameError => "name error",
            ErrorKind::AttributeError => "attribute error",
            ErrorKind::ArgumentError => "invalid arguments",
            ErrorKind::ZeroDivisionError => "division by zero",
            ErrorKind::FilterError => "filter error",
            ErrorKind::SecurityError => "operation rejected by sandbox",
            ErrorKind::RecursionLimit => "recursion limit exceeded",
            ErrorKind::BadSerialization => "could not serialize to value",
            ErrorKind::InvalidDelimiter => "invalid delimiter configuration",
            ErrorKind::InvalidOperation => "invalid operation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.repr.detail {
            ok!(write!(f, "{}: {}", self.kind(), detail));
        } else {
            ok!(write!(f, "{}", self.kind()));
        }
        if let Some(ref name) = self.repr.name {
            ok!(write!(f, " (in {}:{})", name, self.repr.lineno));
        }
        for (name, lineno) in &self.repr.template_stack {
            ok!(write!(f, "\n  via {name}:{lineno}"));
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: Some(detail.into()),
                name: None,
                lineno: 0,
                template_stack: Vec::new(),
                source: None,
            }),
        }
    }

    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist"),
        )
    }

    pub(crate) fn set_filename_and_line(&mut self, filename: &str, lineno: usize) {
        self.repr.name = Some(filename.into());
        self.repr.lineno = lineno;
    }

    /// Records an enclosing template frame for error reports.
    pub(crate) fn push_template_frame(&mut self, name: &str, lineno: usize) {
        self.repr.template_stack.push((name.into(), lineno));
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.repr.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.repr.kind
    }

    /// Returns the detail message if available.
    pub fn detail(&self) -> Option<&str> {
        self.repr.detail.as_deref()
    }

    /// Returns the name of the template that caused the error.
    pub fn name(&self) -> Option<&str> {
        self.repr.name.as_deref()
    }

    /// Returns the line number if available.
    pub fn line(&self) -> Option<usize> {
        self.repr.name.as_ref().map(|_| self.repr.lineno)
    }

    /// Returns the stack of enclosing template frames (name, line).
    ///
    /// The stack is filled in while an error unwinds through nested
    /// `{% include %}`, `{% extends %}` and macro evaluations.
    pub fn template_stack(&self) -> &[(String, usize)] {
        &self.repr.template_stack
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.repr.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: None,
                name: None,
                lineno: 0,
                template_stack: Vec::new(),
                source: None,
            }),
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::InvalidOperation, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}
