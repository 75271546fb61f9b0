//! IDL lexer
//!
//! Attribute names (`uuid`, `in`, `retval`, ...) are plain identifiers; only
//! words that start a declaration or name a base type are keywords. A GUID
//! written bare inside `uuid(...)` lexes as a single [`Token::Uuid`].

use crate::error::{Result, Span, TypeLibError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Declarations
    Coclass,
    Const,
    CppQuote,
    Enum,
    Import,
    ImportLib,
    Interface,
    Library,
    Struct,
    Typedef,

    // Base types
    Boolean,
    Byte,
    Char,
    Double,
    Float,
    Hyper,
    Int,
    Int32,
    Int64,
    Long,
    Short,
    Signed,
    Small,
    Unsigned,
    Void,
    WChar,

    Ident(String),
    Integer(i64),
    /// Decimal with a fractional part, kept as written (`version(1.10)`)
    Decimal(String),
    Str(String),
    Uuid(String),

    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Colon,
    Star,
    Equals,
    Minus,

    Eof,
}

impl Token {
    fn keyword(s: &str) -> Option<Token> {
        Some(match s {
            "coclass" => Token::Coclass,
            "const" => Token::Const,
            "cpp_quote" => Token::CppQuote,
            "enum" => Token::Enum,
            "import" => Token::Import,
            "importlib" => Token::ImportLib,
            "interface" => Token::Interface,
            "library" => Token::Library,
            "struct" => Token::Struct,
            "typedef" => Token::Typedef,
            "boolean" => Token::Boolean,
            "byte" => Token::Byte,
            "char" => Token::Char,
            "double" => Token::Double,
            "float" => Token::Float,
            "hyper" => Token::Hyper,
            "int" => Token::Int,
            "__int32" => Token::Int32,
            "__int64" => Token::Int64,
            "long" => Token::Long,
            "short" => Token::Short,
            "signed" => Token::Signed,
            "small" => Token::Small,
            "unsigned" => Token::Unsigned,
            "void" => Token::Void,
            "wchar_t" => Token::WChar,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.token == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn span_from(&self, start: usize, line: u32, column: u32) -> Span {
        Span::new(start, self.pos, line, column)
    }

    fn column(&self) -> u32 {
        (self.pos - self.line_start + 1) as u32
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        if self.bytes.get(self.pos) == Some(&b'\n') {
            self.line += 1;
            self.line_start = self.pos + 1;
        }
        self.pos += 1;
    }

    pub fn next_token(&mut self) -> Result<SpannedToken> {
        self.skip_trivia()?;

        let (start, line, column) = (self.pos, self.line, self.column());
        let Some(ch) = self.peek() else {
            return Ok(SpannedToken { token: Token::Eof, span: self.span_from(start, line, column) });
        };

        if uuid_at(&self.bytes[self.pos..]) {
            for _ in 0..36 {
                self.bump();
            }
            let text = self.input[start..self.pos].to_string();
            return Ok(SpannedToken { token: Token::Uuid(text), span: self.span_from(start, line, column) });
        }

        let token = match ch {
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            b';' => Token::Semicolon,
            b':' => Token::Colon,
            b'*' => Token::Star,
            b'=' => Token::Equals,
            b'-' => Token::Minus,
            b'"' => {
                let token = self.lex_string(start, line, column)?;
                return Ok(SpannedToken { token, span: self.span_from(start, line, column) });
            }
            b'0'..=b'9' => {
                let token = self.lex_number(start, line, column)?;
                return Ok(SpannedToken { token, span: self.span_from(start, line, column) });
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                    self.bump();
                }
                let word = &self.input[start..self.pos];
                let token = Token::keyword(word).unwrap_or_else(|| Token::Ident(word.to_string()));
                return Ok(SpannedToken { token, span: self.span_from(start, line, column) });
            }
            other => {
                self.bump();
                return Err(TypeLibError::lexer(
                    self.span_from(start, line, column),
                    format!("unexpected character {:?}", other as char),
                ));
            }
        };
        self.bump();
        Ok(SpannedToken { token, span: self.span_from(start, line, column) })
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
                self.bump();
            }
            match (self.peek(), self.peek_at(1)) {
                (Some(b'/'), Some(b'/')) => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let (start, line, column) = (self.pos, self.line, self.column());
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => self.bump(),
                            (None, _) => {
                                return Err(TypeLibError::lexer(
                                    self.span_from(start, line, column),
                                    "unterminated block comment",
                                ))
                            }
                        }
                    }
                }
                // Preprocessor lines are left to MIDL
                (Some(b'#'), _) if self.pos == self.line_start => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_number(&mut self, start: usize, line: u32, column: u32) -> Result<Token> {
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.bump();
            self.bump();
            let digits = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            // MIDL accepts C suffixes on constants
            while matches!(self.peek(), Some(b'L' | b'l' | b'U' | b'u')) {
                self.bump();
            }
            let text = self.input[digits..self.pos].trim_end_matches(&['L', 'l', 'U', 'u'][..]);
            return i64::from_str_radix(text, 16)
                .map(Token::Integer)
                .map_err(|_| TypeLibError::lexer(self.span_from(start, line, column), "invalid hex integer"));
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            return Ok(Token::Decimal(self.input[start..self.pos].to_string()));
        }
        self.input[start..self.pos]
            .parse()
            .map(Token::Integer)
            .map_err(|_| TypeLibError::lexer(self.span_from(start, line, column), "integer out of range"))
    }

    fn lex_string(&mut self, start: usize, line: u32, column: u32) -> Result<Token> {
        self.bump();
        let mut s = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(TypeLibError::lexer(self.span_from(start, line, column), "unterminated string"));
            };
            match ch {
                b'"' => {
                    self.bump();
                    return Ok(Token::Str(s));
                }
                b'\n' => {
                    return Err(TypeLibError::lexer(self.span_from(start, line, column), "newline in string"));
                }
                b'\\' => {
                    self.bump();
                    let escaped = match self.peek() {
                        Some(b'n') => '\n',
                        Some(b't') => '\t',
                        Some(b'r') => '\r',
                        Some(b'\\') => '\\',
                        Some(b'"') => '"',
                        Some(b'\'') => '\'',
                        _ => {
                            s.push('\\');
                            continue;
                        }
                    };
                    s.push(escaped);
                    self.bump();
                }
                _ => {
                    // Advance by whole characters so non-ASCII text survives
                    let rest = &self.input[self.pos..];
                    let c = rest.chars().next().unwrap_or('\u{fffd}');
                    s.push(c);
                    for _ in 0..c.len_utf8() {
                        self.bump();
                    }
                }
            }
        }
    }
}

/// Whether `bytes` starts with a GUID in 8-4-4-4-12 hex form that is not
/// part of a longer word.
fn uuid_at(bytes: &[u8]) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    if bytes.len() < 36 {
        return false;
    }
    let mut i = 0;
    for (n, len) in GROUPS.iter().enumerate() {
        if !bytes[i..i + len].iter().all(u8::is_ascii_hexdigit) {
            return false;
        }
        i += len;
        if n < GROUPS.len() - 1 {
            if bytes[i] != b'-' {
                return false;
            }
            i += 1;
        }
    }
    !matches!(bytes.get(36), Some(c) if c.is_ascii_alphanumeric() || *c == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_keywords_and_attribute_names() {
        assert_eq!(
            tokens("interface IHen : IUnknown [in, retval]"),
            vec![
                Token::Interface,
                Token::Ident("IHen".into()),
                Token::Colon,
                Token::Ident("IUnknown".into()),
                Token::LBracket,
                Token::Ident("in".into()),
                Token::Comma,
                Token::Ident("retval".into()),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_bare_uuid_is_one_token() {
        let toks = tokens("uuid(9eedb943-b267-4f0c-b8b6-59fe3851f239)");
        assert_eq!(toks[2], Token::Uuid("9eedb943-b267-4f0c-b8b6-59fe3851f239".into()));
        assert_eq!(toks[3], Token::RParen);
    }

    #[test]
    fn test_uuid_needs_exact_shape() {
        let toks = tokens("deadbeef");
        assert_eq!(toks[0], Token::Ident("deadbeef".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 0x80040154 1.10 -3"),
            vec![
                Token::Integer(42),
                Token::Integer(0x8004_0154),
                Token::Decimal("1.10".into()),
                Token::Minus,
                Token::Integer(3),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_comments() {
        let toks = tokens("// header\nhelpstring(\"Suhms \\\"gate\\\"\") /* block\n comment */ x");
        assert_eq!(toks[2], Token::Str("Suhms \"gate\"".into()));
        assert_eq!(toks[4], Token::Ident("x".into()));
    }

    #[test]
    fn test_spans_track_lines() {
        let toks = Lexer::new("interface\n  IDog;").tokenize().unwrap();
        assert_eq!((toks[1].span.line, toks[1].span.column), (2, 3));
        assert_eq!(toks[2].span.column, 7);
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = Lexer::new("\n  \"Oslo").tokenize().unwrap_err();
        match err {
            TypeLibError::Lexer { span, .. } => assert_eq!((span.line, span.column), (2, 3)),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_preprocessor_lines_are_skipped() {
        assert_eq!(tokens("#include \"x.h\"\nvoid"), vec![Token::Void, Token::Eof]);
    }
}
