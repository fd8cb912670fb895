use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Parse error at position {0}: {1}")]
    ParseError(usize, String),
}

/// S-expression node. Bare symbols and numbers are `Atom`s; double-quoted
/// text is `Str` so that quoting survives a round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Atom(String),
    Str(String),
    List(Vec<SExp>),
}

impl SExp {
    pub fn atom(s: impl Into<String>) -> Self {
        SExp::Atom(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        SExp::Str(s.into())
    }

    /// Text of an atom or string.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Atom(s) | SExp::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<SExp>> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    /// The leading symbol of a list, e.g. `property` for `(property "Value" "1k")`.
    pub fn tag(&self) -> Option<&str> {
        match self {
            SExp::List(items) => match items.first() {
                Some(SExp::Atom(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_tagged(&self, key: &str) -> bool {
        self.tag() == Some(key)
    }

    /// Item `index` of a list (index 0 is the tag).
    pub fn nth(&self, index: usize) -> Option<&SExp> {
        self.as_list().and_then(|items| items.get(index))
    }

    /// Text of item `index` of a list.
    pub fn nth_str(&self, index: usize) -> Option<&str> {
        self.nth(index).and_then(SExp::as_atom)
    }

    pub fn get(&self, key: &str) -> Option<&SExp> {
        if let SExp::List(items) = self {
            for item in items {
                if let SExp::List(sublist) = item {
                    if let Some(first) = sublist.first() {
                        if first.as_atom() == Some(key) {
                            // Single values come back bare; longer lists whole.
                            if sublist.len() == 2 {
                                return Some(&sublist[1]);
                            } else if sublist.len() > 2 {
                                return Some(item);
                            }
                        }
                    }
                }
            }
        }
        None
    }

    pub fn get_all(&self, key: &str) -> Vec<&SExp> {
        let mut results = Vec::new();
        if let SExp::List(items) = self {
            for item in items {
                if item.is_tagged(key) {
                    results.push(item);
                }
            }
        }
        results
    }

    /// First direct child list tagged `key`.
    pub fn find_list(&self, key: &str) -> Option<&SExp> {
        self.as_list()?.iter().find(|item| item.is_tagged(key))
    }

    pub fn find_list_mut(&mut self, key: &str) -> Option<&mut SExp> {
        self.as_list_mut()?.iter_mut().find(|item| item.is_tagged(key))
    }

    /// Whether a bare atom `word` appears directly in this list.
    pub fn has_atom(&self, word: &str) -> bool {
        self.as_list()
            .is_some_and(|items| items.iter().any(|i| matches!(i, SExp::Atom(s) if s == word)))
    }

    fn is_leaf(&self) -> bool {
        match self {
            SExp::List(items) => items.iter().all(|i| !matches!(i, SExp::List(_))),
            _ => true,
        }
    }

    /// Render in the indented layout KiCad uses for its own files: lists that
    /// hold other lists break onto new lines, leaf lists stay inline.
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out.push('\n');
        out
    }

    fn write_pretty(&self, out: &mut String, depth: usize) {
        let items = match self {
            SExp::List(items) => items,
            other => {
                out.push_str(&other.to_string());
                return;
            }
        };
        out.push('(');
        let mut broke = false;
        for (i, item) in items.iter().enumerate() {
            if item.is_leaf() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(&item.to_string());
            } else {
                out.push('\n');
                out.push_str(&"  ".repeat(depth + 1));
                item.write_pretty(out, depth + 1);
                broke = true;
            }
        }
        if broke {
            out.push('\n');
            out.push_str(&"  ".repeat(depth));
        }
        out.push(')');
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Atom(s) => write!(f, "{}", s),
            SExp::Str(s) => write!(f, "\"{}\"", escape(s)),
            SExp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub struct SExpParser {
    input: Vec<char>,
    pos: usize,
}

impl SExpParser {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }
        self.parse_sexp()
    }

    fn parse_sexp(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();

        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }

        match self.peek() {
            '(' => self.parse_list(),
            ')' => Err(ParseError::ParseError(self.pos, "unbalanced ')'".to_string())),
            '"' => self.parse_string(),
            _ => self.parse_symbol(),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        self.expect_char('(')?;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_eof() {
                return Err(ParseError::UnexpectedEof);
            }

            if self.peek() == ')' {
                self.advance();
                break;
            }

            items.push(self.parse_sexp()?);
        }

        Ok(SExp::List(items))
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        self.expect_char('"')?;
        let mut s = String::new();
        let mut escaped = false;

        while !self.is_eof() {
            let ch = self.peek();
            self.advance();

            if escaped {
                match ch {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    _ => s.push(ch),
                }
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return Ok(SExp::Str(s));
            } else {
                s.push(ch);
            }
        }

        Err(ParseError::UnexpectedEof)
    }

    fn parse_symbol(&mut self) -> Result<SExp, ParseError> {
        let mut s = String::new();

        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                break;
            }
            s.push(ch);
            self.advance();
        }

        if s.is_empty() {
            Err(ParseError::UnexpectedToken("empty symbol".to_string()))
        } else {
            Ok(SExp::Atom(s))
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        if self.pos < self.input.len() {
            self.input[self.pos]
        } else {
            '\0'
        }
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }

        let ch = self.peek();
        if ch == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken(format!(
                "Expected '{}', found '{}'",
                expected, ch
            )))
        }
    }
}

/// Parse a whole document with a single root list.
pub fn parse_document(input: &str) -> Result<SExp, ParseError> {
    SExpParser::new(input).parse()
}
