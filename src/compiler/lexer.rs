use crate::compiler::tokens::{Span, Token};
use crate::error::{Error, ErrorKind};
use crate::syntax::{StartMarker, SyntaxConfig, WhitespaceConfig};
use crate::utils::{memchr, memstr, unescape};

enum LexerState {
    Template,
    InVariable,
    InBlock,
    InLineStatement,
}

/// Pending whitespace removal applied to the upcoming template data.
#[derive(Copy, Clone, PartialEq)]
enum Trim {
    None,
    /// Strip all leading whitespace (a `-` on a closing delimiter).
    Whitespace,
    /// Strip a single leading newline (`trim_blocks`).
    Newline,
}

/// Tokenizes template source into a stream of tokens.
///
/// The tokenizer borrows the source for the duration of lexing but all
/// produced tokens own their data so that the resulting AST and bytecode
/// are fully owned.
pub struct Tokenizer<'s> {
    stack: Vec<LexerState>,
    rest: &'s str,
    failed: bool,
    current_line: u32,
    current_col: u32,
    at_line_start: bool,
    pending_trim: Trim,
    syntax: SyntaxConfig,
    ws: WhitespaceConfig,
}

fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count()
}

/// Matches a basic tag (`{% name %}`) returning the consumed length and
/// whether the closing delimiter requested whitespace removal.
fn skip_basic_tag(block_str: &str, name: &str, block_end: &str) -> Option<(usize, bool)> {
    let mut ptr = block_str;
    let mut trim = false;

    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
    }
    while let Some(rest) = ptr.strip_prefix(|x: char| x.is_ascii_whitespace()) {
        ptr = rest;
    }

    ptr = some!(ptr.strip_prefix(name));

    while let Some(rest) = ptr.strip_prefix(|x: char| x.is_ascii_whitespace()) {
        ptr = rest;
    }
    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        trim = true;
    }
    ptr = some!(ptr.strip_prefix(block_end));

    Some((block_str.len() - ptr.len(), trim))
}

/// Normalizes newlines in raw template data to the configured sequence.
fn normalize_newlines(data: &str, sequence: &str) -> String {
    if !data.contains('\r') && sequence == "\n" {
        return data.to_string();
    }
    let mut rv = String::with_capacity(data.len());
    let mut chars = data.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                rv.push_str(sequence);
            }
            '\n' => rv.push_str(sequence),
            other => rv.push(other),
        }
    }
    rv
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer.
    pub fn new(
        source: &'s str,
        in_expr: bool,
        syntax: SyntaxConfig,
        ws: WhitespaceConfig,
    ) -> Tokenizer<'s> {
        let mut source = source;
        if !ws.keep_trailing_newline {
            if let Some(stripped) = source.strip_suffix('\n') {
                source = stripped.strip_suffix('\r').unwrap_or(stripped);
            }
        }
        Tokenizer {
            rest: source,
            stack: vec![if in_expr {
                LexerState::InVariable
            } else {
                LexerState::Template
            }],
            failed: false,
            current_line: 1,
            current_col: 0,
            at_line_start: true,
            pending_trim: Trim::None,
            syntax,
            ws,
        }
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.current_line += 1;
                    self.current_col = 0;
                }
                _ => self.current_col += 1,
            }
        }
        if !skipped.is_empty() {
            self.at_line_start = skipped.ends_with('\n');
        }
        self.rest = new_rest;
        skipped
    }

    #[inline(always)]
    fn loc(&self) -> (u32, u32) {
        (self.current_line, self.current_col)
    }

    fn span(&self, start: (u32, u32)) -> Span {
        let (start_line, start_col) = start;
        Span {
            start_line,
            start_col,
            end_line: self.current_line,
            end_col: self.current_col,
        }
    }

    /// Returns the current line for error reporting.
    pub fn current_line(&self) -> usize {
        self.current_line as usize
    }

    fn syntax_error(&mut self, msg: &'static str) -> Error {
        self.failed = true;
        Error::new(ErrorKind::LexError, msg)
    }

    fn eat_number(&mut self) -> Result<(Token, Span), Error> {
        #[derive(Copy, Clone)]
        enum State {
            Integer,      // 123
            Fraction,     // .123
            Exponent,     // E | e
            ExponentSign, // +|-
        }

        let old_loc = self.loc();
        let mut state = State::Integer;
        let mut num_len = self
            .rest
            .as_bytes()
            .iter()
            .take_while(|&&c| c.is_ascii_digit() || c == b'_')
            .count();
        for c in self.rest.as_bytes()[num_len..].iter().copied() {
            state = match (c, state) {
                (b'.', State::Integer) => State::Fraction,
                (b'E' | b'e', State::Integer | State::Fraction) => State::Exponent,
                (b'+' | b'-', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9' | b'_', state) => state,
                _ => break,
            };
            num_len += 1;
        }
        let is_float = !matches!(state, State::Integer);

        let num = self.advance(num_len);
        if num.starts_with('_') || num.ends_with('_') || num.contains("__") {
            return Err(self.syntax_error("invalid numeric literal"));
        }
        let num = if num.contains('_') {
            num.replace('_', "")
        } else {
            num.to_string()
        };
        Ok((
            ok!(if is_float {
                num.parse()
                    .map(Token::Float)
                    .map_err(|_| self.syntax_error("invalid float"))
            } else {
                num.parse()
                    .map(Token::Int)
                    .map_err(|_| self.syntax_error("invalid integer"))
            }),
            self.span(old_loc),
        ))
    }

    fn eat_identifier(&mut self) -> Result<(Token, Span), Error> {
        let ident_len = lex_identifier(self.rest);
        if ident_len > 0 {
            let old_loc = self.loc();
            let ident = self.advance(ident_len);
            Ok((Token::Ident(ident.to_string()), self.span(old_loc)))
        } else {
            Err(self.syntax_error("unexpected character"))
        }
    }

    fn eat_string(&mut self, delim: u8) -> Result<(Token, Span), Error> {
        let old_loc = self.loc();
        let mut escaped = false;
        let mut has_escapes = false;
        let str_len = self
            .rest
            .as_bytes()
            .iter()
            .skip(1)
            .take_while(|&&c| match (escaped, c) {
                (true, _) => {
                    escaped = false;
                    true
                }
                (_, b'\\') => {
                    escaped = true;
                    has_escapes = true;
                    true
                }
                (_, c) if c == delim => false,
                _ => true,
            })
            .count();
        if escaped || self.rest.as_bytes().get(str_len + 1) != Some(&delim) {
            return Err(self.syntax_error("unexpected end of string"));
        }
        let s = self.advance(str_len + 2);
        let contents = &s[1..s.len() - 1];
        Ok((
            if has_escapes {
                Token::Str(ok!(unescape(contents)))
            } else {
                Token::Str(contents.to_string())
            },
            self.span(old_loc),
        ))
    }

    fn skip_whitespace(&mut self) {
        let skip = self
            .rest
            .chars()
            .map_while(|c| c.is_whitespace().then(|| c.len_utf8()))
            .sum::<usize>();
        if skip > 0 {
            self.advance(skip);
        }
    }

    fn skip_newline(&mut self) {
        if self.rest.starts_with("\r\n") {
            self.advance(2);
        } else if self.rest.starts_with('\n') {
            self.advance(1);
        }
    }

    /// Length of leading spaces and tabs.
    fn hws_len(s: &str) -> usize {
        s.as_bytes()
            .iter()
            .take_while(|&&c| c == b' ' || c == b'\t')
            .count()
    }

    /// Checks if a line statement or line comment starts at the beginning
    /// of `tail` after optional horizontal whitespace.  Returns the length
    /// of whitespace + prefix to skip and whether it's a comment.
    fn match_line_marker(&self, tail: &str) -> Option<(usize, bool)> {
        let ws = Self::hws_len(tail);
        let after = &tail[ws..];
        if let Some(prefix) = self.syntax.line_statement_prefix() {
            // a line comment prefix that extends the statement prefix
            // (eg: `#` and `##`) must win, so check comments first when
            // they are longer.
            if let Some(cprefix) = self.syntax.line_comment_prefix() {
                if cprefix.len() > prefix.len() && after.starts_with(cprefix) {
                    return Some((ws + cprefix.len(), true));
                }
            }
            if after.starts_with(prefix) {
                return Some((ws + prefix.len(), false));
            }
        }
        if let Some(cprefix) = self.syntax.line_comment_prefix() {
            if after.starts_with(cprefix) {
                return Some((ws + cprefix.len(), true));
            }
        }
        None
    }

    /// Finds the offset at which template data has to end because a later
    /// line starts a line statement or line comment.
    fn find_line_marker(&self, rest: &str) -> Option<usize> {
        if self.syntax.line_statement_prefix().is_none()
            && self.syntax.line_comment_prefix().is_none()
        {
            return None;
        }
        let bytes = rest.as_bytes();
        let mut off = 0;
        while let Some(nl) = memchr(&bytes[off..], b'\n') {
            let line_start = off + nl + 1;
            if self.match_line_marker(&rest[line_start..]).is_some() {
                return Some(line_start);
            }
            off = line_start;
        }
        None
    }

    /// Produces the next token or `None` at the end of input.
    #[allow(clippy::cognitive_complexity)]
    pub fn next_token(&mut self) -> Result<Option<(Token, Span)>, Error> {
        loop {
            if self.rest.is_empty() || self.failed {
                if let Some(LexerState::InLineStatement) = self.stack.last() {
                    self.stack.pop();
                    return Ok(Some((Token::BlockEnd, self.span(self.loc()))));
                }
                return Ok(None);
            }

            let mut old_loc = self.loc();
            match self.stack.last() {
                Some(LexerState::Template) => {
                    match self.pending_trim {
                        Trim::Whitespace => self.skip_whitespace(),
                        Trim::Newline => self.skip_newline(),
                        Trim::None => {}
                    }
                    self.pending_trim = Trim::None;
                    if self.rest.is_empty() {
                        continue;
                    }
                    old_loc = self.loc();

                    // line statements and line comments bind at the start of
                    // a line before regular delimiters are considered.
                    if self.at_line_start {
                        if let Some((skip, is_comment)) = self.match_line_marker(self.rest) {
                            self.advance(skip);
                            if is_comment {
                                match memchr(self.rest.as_bytes(), b'\n') {
                                    Some(nl) => self.advance(nl + 1),
                                    None => self.advance(self.rest.len()),
                                };
                                continue;
                            }
                            self.stack.push(LexerState::InLineStatement);
                            return Ok(Some((Token::BlockStart, self.span(old_loc))));
                        }
                    }

                    match self.syntax.match_start_marker(self.rest) {
                        Some((StartMarker::Comment, skip)) => {
                            let comment_end = self.syntax.comment_delimiters().1.to_string();
                            if let Some(end) =
                                memstr(&self.rest.as_bytes()[skip..], comment_end.as_bytes())
                            {
                                if self
                                    .rest
                                    .as_bytes()
                                    .get(end.saturating_sub(1) + skip)
                                    .copied()
                                    == Some(b'-')
                                {
                                    self.pending_trim = Trim::Whitespace;
                                } else if self.ws.trim_blocks {
                                    self.pending_trim = Trim::Newline;
                                }
                                self.advance(end + skip + comment_end.len());
                                continue;
                            } else {
                                return Err(self.syntax_error("unexpected end of comment"));
                            }
                        }
                        Some((StartMarker::Variable, skip)) => {
                            if self.rest.as_bytes().get(skip) == Some(&b'-') {
                                self.advance(skip + 1);
                            } else {
                                self.advance(skip);
                            }
                            self.stack.push(LexerState::InVariable);
                            return Ok(Some((Token::VariableStart, self.span(old_loc))));
                        }
                        Some((StartMarker::Block, skip)) => {
                            let block_start = self.syntax.block_delimiters().0.to_string();
                            let block_end = self.syntax.block_delimiters().1.to_string();
                            // raw blocks require special handling.  If we are at the
                            // beginning of a raw block we want to skip everything until
                            // {% endraw %} completely ignoring interior syntax and emit
                            // the entire raw block as TemplateData.
                            if let Some((raw, trim_start)) =
                                skip_basic_tag(&self.rest[skip..], "raw", &block_end)
                            {
                                self.advance(raw + skip);
                                let mut ptr = 0;
                                while let Some(block) = memstr(
                                    &self.rest.as_bytes()[ptr..],
                                    block_start.as_bytes(),
                                ) {
                                    ptr += block + block_start.len();
                                    let trim_end =
                                        self.rest.as_bytes().get(ptr) == Some(&b'-');
                                    if let Some((endraw, trim_next)) =
                                        skip_basic_tag(&self.rest[ptr..], "endraw", &block_end)
                                    {
                                        let mut result =
                                            &self.rest[..ptr - block_start.len()];
                                        if trim_start {
                                            result = result.trim_start();
                                        }
                                        if trim_end {
                                            result = result.trim_end();
                                        }
                                        let token = Token::TemplateData(normalize_newlines(
                                            result,
                                            self.ws.newline_sequence,
                                        ));
                                        self.advance(ptr + endraw);
                                        self.pending_trim = if trim_next {
                                            Trim::Whitespace
                                        } else {
                                            Trim::None
                                        };
                                        return Ok(Some((token, self.span(old_loc))));
                                    }
                                }
                                return Err(self.syntax_error("unexpected end of raw block"));
                            }

                            if self.rest.as_bytes().get(skip) == Some(&b'-') {
                                self.advance(skip + 1);
                            } else {
                                self.advance(skip);
                            }

                            self.stack.push(LexerState::InBlock);
                            return Ok(Some((Token::BlockStart, self.span(old_loc))));
                        }
                        None => {}
                    }

                    let next_marker = self.syntax.find_start_marker(self.rest);
                    let next_line_marker = self.find_line_marker(self.rest);
                    let (lead, span) = match (next_marker, next_line_marker) {
                        (Some((marker, _)), Some(line)) if line <= marker => {
                            (self.advance(line), self.span(old_loc))
                        }
                        (None, Some(line)) => (self.advance(line), self.span(old_loc)),
                        (Some((start, hyphen)), _) => {
                            let peeked = &self.rest[..start];
                            let trimmed = if hyphen {
                                peeked.trim_end()
                            } else if self.ws.lstrip_blocks
                                && !matches!(
                                    self.syntax.match_start_marker(&self.rest[start..]),
                                    Some((StartMarker::Variable, _))
                                )
                            {
                                // strip spaces and tabs back to the line start, but
                                // only if nothing else sits on that line.
                                let trimmed = peeked.trim_end_matches([' ', '\t']);
                                if trimmed.is_empty() || trimmed.ends_with('\n') {
                                    trimmed
                                } else {
                                    peeked
                                }
                            } else {
                                peeked
                            };
                            let lead = self.advance(trimmed.len());
                            let span = self.span(old_loc);
                            self.advance(peeked.len() - trimmed.len());
                            (lead, span)
                        }
                        (None, None) => (self.advance(self.rest.len()), self.span(old_loc)),
                    };
                    if lead.is_empty() {
                        continue;
                    }
                    return Ok(Some((
                        Token::TemplateData(normalize_newlines(lead, self.ws.newline_sequence)),
                        span,
                    )));
                }
                Some(LexerState::InLineStatement) => {
                    // in line statements only horizontal whitespace is skipped;
                    // a newline terminates the statement.
                    let skip = Self::hws_len(self.rest)
                        + if self.rest[Self::hws_len(self.rest)..].starts_with('\r') {
                            1
                        } else {
                            0
                        };
                    if skip > 0 {
                        self.advance(skip);
                        continue;
                    }
                    if self.rest.starts_with('\n') {
                        self.stack.pop();
                        self.advance(1);
                        return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                    }
                    if let Some(cprefix) = self.syntax.line_comment_prefix() {
                        if self.rest.starts_with(cprefix) {
                            match memchr(self.rest.as_bytes(), b'\n') {
                                Some(nl) => self.advance(nl),
                                None => self.advance(self.rest.len()),
                            };
                            continue;
                        }
                    }
                    return self.eat_expr_token().map(Some);
                }
                Some(LexerState::InBlock | LexerState::InVariable) => {
                    // in blocks whitespace is generally ignored, skip it.
                    match self
                        .rest
                        .as_bytes()
                        .iter()
                        .position(|&x| !x.is_ascii_whitespace())
                    {
                        Some(0) => {}
                        None => {
                            self.advance(self.rest.len());
                            continue;
                        }
                        Some(offset) => {
                            self.advance(offset);
                            continue;
                        }
                    }

                    // look out for the end of blocks
                    if let Some(&LexerState::InBlock) = self.stack.last() {
                        let block_end = self.syntax.block_delimiters().1.to_string();
                        if self.rest.get(..1) == Some("-")
                            && self.rest.get(1..block_end.len() + 1) == Some(&block_end as &str)
                        {
                            self.stack.pop();
                            self.pending_trim = Trim::Whitespace;
                            self.advance(block_end.len() + 1);
                            return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                        }
                        if self.rest.get(..block_end.len()) == Some(&block_end as &str) {
                            self.stack.pop();
                            if self.ws.trim_blocks {
                                self.pending_trim = Trim::Newline;
                            }
                            self.advance(block_end.len());
                            return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                        }
                    } else {
                        let variable_end = self.syntax.variable_delimiters().1.to_string();
                        if self.rest.get(..1) == Some("-")
                            && self.rest.get(1..variable_end.len() + 1)
                                == Some(&variable_end as &str)
                        {
                            self.stack.pop();
                            self.advance(variable_end.len() + 1);
                            self.pending_trim = Trim::Whitespace;
                            return Ok(Some((Token::VariableEnd, self.span(old_loc))));
                        }
                        if self.rest.get(..variable_end.len()) == Some(&variable_end as &str) {
                            self.stack.pop();
                            self.advance(variable_end.len());
                            return Ok(Some((Token::VariableEnd, self.span(old_loc))));
                        }
                    }

                    return self.eat_expr_token().map(Some);
                }
                None => unreachable!("empty lexer state"),
            }
        }
    }

    /// Lexes a single expression token (operators, literals, identifiers).
    fn eat_expr_token(&mut self) -> Result<(Token, Span), Error> {
        let old_loc = self.loc();

        // two character operators
        let op = match self.rest.as_bytes().get(..2) {
            Some(b"//") => Some(Token::FloorDiv),
            Some(b"**") => Some(Token::Pow),
            Some(b"==") => Some(Token::Eq),
            Some(b"!=") => Some(Token::Ne),
            Some(b">=") => Some(Token::Gte),
            Some(b"<=") => Some(Token::Lte),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(2);
            return Ok((op, self.span(old_loc)));
        }

        // single character operators (and strings)
        let op = match self.rest.as_bytes().first() {
            Some(b'+') => Some(Token::Plus),
            Some(b'-') => Some(Token::Minus),
            Some(b'*') => Some(Token::Mul),
            Some(b'/') => Some(Token::Div),
            Some(b'%') => Some(Token::Mod),
            Some(b'!') => Some(Token::Bang),
            Some(b'.') => Some(Token::Dot),
            Some(b',') => Some(Token::Comma),
            Some(b':') => Some(Token::Colon),
            Some(b'~') => Some(Token::Tilde),
            Some(b'|') => Some(Token::Pipe),
            Some(b'=') => Some(Token::Assign),
            Some(b'>') => Some(Token::Gt),
            Some(b'<') => Some(Token::Lt),
            Some(b'(') => Some(Token::ParenOpen),
            Some(b')') => Some(Token::ParenClose),
            Some(b'[') => Some(Token::BracketOpen),
            Some(b']') => Some(Token::BracketClose),
            Some(b'{') => Some(Token::BraceOpen),
            Some(b'}') => Some(Token::BraceClose),
            Some(b'\'') => {
                return self.eat_string(b'\'');
            }
            Some(b'"') => {
                return self.eat_string(b'"');
            }
            Some(c) if c.is_ascii_digit() => return self.eat_number(),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            return Ok((op, self.span(old_loc)));
        }

        self.eat_identifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn tokenize_all(input: &str) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new(
            input,
            false,
            SyntaxConfig::default(),
            WhitespaceConfig::default(),
        );
        let mut rv = Vec::new();
        while let Some((token, _)) = tokenizer.next_token().unwrap() {
            rv.push(token);
        }
        rv
    }

    #[test]
    fn test_is_basic_tag() {
        assert_eq!(skip_basic_tag(" raw %}", "raw", "%}"), Some((7, false)));
        assert_eq!(skip_basic_tag(" raw %}", "endraw", "%}"), None);
        assert_eq!(skip_basic_tag("  raw  %}", "raw", "%}"), Some((9, false)));
        assert_eq!(skip_basic_tag("-  raw  -%}", "raw", "%}"), Some((11, true)));
    }

    #[test]
    fn test_basic_identifiers() {
        fn assert_ident(s: &str) {
            let mut tokenizer = Tokenizer::new(
                s,
                true,
                SyntaxConfig::default(),
                WhitespaceConfig::default(),
            );
            match tokenizer.next_token() {
                Ok(Some((Token::Ident(ident), _))) if ident == s => {}
                _ => panic!("did not get a matching token result: {s:?}"),
            }
        }

        assert_ident("foo_bar_baz");
        assert_ident("_foo_bar_baz");
        assert_ident("_42world");
        assert_ident("_world42");
        assert_ident("world42");
    }

    #[test]
    fn test_numbers() {
        let mut tokenizer = Tokenizer::new(
            "1_000 1e3 42.5",
            true,
            SyntaxConfig::default(),
            WhitespaceConfig::default(),
        );
        assert!(matches!(
            tokenizer.next_token().unwrap(),
            Some((Token::Int(1000), _))
        ));
        assert!(matches!(
            tokenizer.next_token().unwrap(),
            Some((Token::Float(f), _)) if f == 1000.0
        ));
        assert!(matches!(
            tokenizer.next_token().unwrap(),
            Some((Token::Float(f), _)) if f == 42.5
        ));
    }

    #[test]
    fn test_whitespace_control() {
        let tokens = tokenize_all("foo  {{- 42 -}}  bar");
        assert!(matches!(&tokens[0], Token::TemplateData(data) if data == "foo"));
        assert!(matches!(&tokens[tokens.len() - 1], Token::TemplateData(data) if data == "bar"));
    }

    #[test]
    fn test_raw_block() {
        let tokens = tokenize_all("{% raw %}{{ not a var }}{% endraw %}");
        assert_eq!(tokens.len(), 1);
        assert!(matches!(&tokens[0], Token::TemplateData(data) if data == "{{ not a var }}"));
    }

    #[test]
    fn test_line_statements() {
        let syntax = SyntaxConfig::builder()
            .line_statement_prefix("#")
            .line_comment_prefix("##")
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(
            "# for item in seq\nx\n# endfor\n## comment\n",
            false,
            syntax,
            WhitespaceConfig {
                keep_trailing_newline: true,
                ..WhitespaceConfig::default()
            },
        );
        let mut tokens = Vec::new();
        while let Some((token, _)) = tokenizer.next_token().unwrap() {
            tokens.push(token);
        }
        assert!(matches!(tokens[0], Token::BlockStart));
        assert!(tokens[1].is_ident("for"));
        assert!(tokens[2].is_ident("item"));
        assert!(tokens[3].is_ident("in"));
        assert!(tokens[4].is_ident("seq"));
        assert!(matches!(tokens[5], Token::BlockEnd));
        assert!(matches!(&tokens[6], Token::TemplateData(data) if data == "x\n"));
        assert!(matches!(tokens[7], Token::BlockStart));
        assert!(tokens[8].is_ident("endfor"));
        assert!(matches!(tokens[9], Token::BlockEnd));
    }
}
