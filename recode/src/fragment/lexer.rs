//! Indentation-aware tokenizer.

use super::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// f-string body with escapes resolved and `{...}` fields left in place.
    FStr(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    /// 1-based line the token starts on.
    pub line: usize,
    /// 1-based line the token ends on (differs for triple-quoted strings).
    pub end_line: usize,
}

const OPS3: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const OPS2: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->", ":=", "<<", ">>",
    "&=", "|=", "^=",
];
const OPS1: &[&str] = &[
    "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
    "@", "|", "&", "^", "~",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indents: Vec<usize>,
    depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            indents: vec![0],
            depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok, line: usize) {
        self.tokens.push(Token {
            tok,
            line,
            end_line: self.line,
        });
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            if self.at_line_start && self.depth == 0 {
                if !self.indentation()? {
                    break;
                }
                continue;
            }
            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push(Tok::Newline, self.line);
                        self.at_line_start = true;
                    }
                    self.line += 1;
                }
                '\\' => match self.peek_at(1) {
                    Some('\n') => {
                        self.pos += 2;
                        self.line += 1;
                    }
                    None => {
                        return Err(ParseError::incomplete(
                            "unexpected end of input after line continuation",
                            self.line,
                        ));
                    }
                    Some(_) => {
                        return Err(ParseError::invalid(
                            "unexpected character after line continuation character",
                            self.line,
                        ));
                    }
                },
                '"' | '\'' => self.string(false, false)?,
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) =>
                {
                    self.number()?;
                }
                c if c.is_alphabetic() || c == '_' => self.word()?,
                _ => self.operator()?,
            }
        }
        self.finish();
        Ok(self.tokens)
    }

    /// Measure leading whitespace of a logical line. Returns false at end of input.
    fn indentation(&mut self) -> Result<bool, ParseError> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width += 8 - width % 8,
                '\r' | '\x0c' => {}
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek() {
            None => return Ok(false),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(true);
            }
            Some(_) => {}
        }
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent, self.line);
        } else if width < current {
            while self.indents.last().is_some_and(|&top| top > width) {
                self.indents.pop();
                self.push(Tok::Dedent, self.line);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(ParseError::invalid(
                    "unindent does not match any outer indentation level",
                    self.line,
                ));
            }
        }
        self.at_line_start = false;
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn finish(&mut self) {
        let line = self.line;
        if self.depth == 0 {
            let needs_newline = self
                .tokens
                .last()
                .is_some_and(|t| !matches!(t.tok, Tok::Newline | Tok::Dedent));
            if needs_newline {
                self.push(Tok::Newline, line);
            }
            while self.indents.len() > 1 {
                self.indents.pop();
                self.push(Tok::Dedent, line);
            }
        }
        self.push(Tok::Eof, line);
    }

    fn word(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        if matches!(self.peek(), Some('"' | '\'')) {
            let lower = word.to_ascii_lowercase();
            if matches!(lower.as_str(), "r" | "b" | "u" | "f" | "rf" | "fr" | "br" | "rb") {
                return self.string(lower.contains('r'), lower.contains('f'));
            }
        }
        self.push(Tok::Name(word), self.line);
        Ok(())
    }

    fn number(&mut self) -> Result<(), ParseError> {
        let line = self.line;
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| ParseError::invalid("invalid hexadecimal literal", line))?;
            self.push(Tok::Int(value), line);
            return Ok(());
        }

        let mut is_float = false;
        self.digits();
        if self.peek() == Some('.') && !self.peek_at(1).is_some_and(|c| c.is_alphabetic() || c == '_')
        {
            is_float = true;
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                self.digits();
            }
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(ParseError::invalid("invalid decimal literal", line));
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let tok = if is_float {
            Tok::Float(
                text.parse()
                    .map_err(|_| ParseError::invalid("invalid float literal", line))?,
            )
        } else {
            Tok::Int(
                text.parse()
                    .map_err(|_| ParseError::invalid("integer literal too large", line))?,
            )
        };
        self.push(tok, line);
        Ok(())
    }

    fn digits(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '_')
        {
            self.pos += 1;
        }
    }

    fn string(&mut self, raw: bool, formatted: bool) -> Result<(), ParseError> {
        let line = self.line;
        let Some(quote) = self.peek() else {
            return Err(ParseError::incomplete("unexpected end of input", line));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(if triple {
                    ParseError::incomplete("unterminated triple-quoted string literal", line)
                } else {
                    ParseError::invalid("unterminated string literal", line)
                });
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
                out.push(c);
                self.pos += 1;
                continue;
            }
            match c {
                '\n' if !triple => {
                    return Err(ParseError::invalid("unterminated string literal", line));
                }
                '\n' => {
                    self.line += 1;
                    out.push(c);
                    self.pos += 1;
                }
                '\\' => {
                    self.pos += 1;
                    let Some(next) = self.peek() else { continue };
                    if raw {
                        out.push('\\');
                        out.push(next);
                        if next == '\n' {
                            self.line += 1;
                        }
                        self.pos += 1;
                    } else {
                        self.escape(next, &mut out, line)?;
                    }
                }
                c => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        let tok = if formatted { Tok::FStr(out) } else { Tok::Str(out) };
        self.push(tok, line);
        Ok(())
    }

    fn escape(&mut self, next: char, out: &mut String, line: usize) -> Result<(), ParseError> {
        self.pos += 1;
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' | '\'' | '"' => out.push(next),
            '\n' => self.line += 1,
            'x' | 'u' => {
                let len = if next == 'x' { 2 } else { 4 };
                let hex: String = (0..len).filter_map(|i| self.peek_at(i)).collect();
                let decoded = (hex.len() == len)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::invalid("truncated escape sequence", line))?;
                self.pos += len;
                out.push(decoded);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn operator(&mut self) -> Result<(), ParseError> {
        let line = self.line;
        for table in [OPS3, OPS2, OPS1] {
            for &op in table {
                let matches = op
                    .chars()
                    .enumerate()
                    .all(|(i, c)| self.peek_at(i) == Some(c));
                if matches {
                    self.pos += op.chars().count();
                    match op {
                        "(" | "[" | "{" => self.depth += 1,
                        ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                        _ => {}
                    }
                    self.push(Tok::Op(op), line);
                    return Ok(());
                }
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(ParseError::invalid(
            format!("invalid character '{c}' in source"),
            line,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        tokenize(src)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn emits_indent_and_dedent_around_blocks() {
        let toks = kinds("if x:\n    y = 1\nz\n");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
        assert_eq!(toks.last(), Some(&Tok::Eof));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let toks = kinds("f(1,\n  2)\n");
        let newlines = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn unterminated_triple_quote_is_incomplete() {
        let err = tokenize("x = '''abc").expect_err("unterminated");
        assert!(err.is_incomplete());
        let err = tokenize("x = 'abc\n").expect_err("unterminated");
        assert!(!err.is_incomplete());
    }

    #[test]
    fn string_prefixes_select_token_kind() {
        assert_eq!(kinds("f'a{b}'")[0], Tok::FStr("a{b}".into()));
        assert_eq!(kinds("r'a\\n'")[0], Tok::Str("a\\n".into()));
        assert_eq!(kinds("'a\\n'")[0], Tok::Str("a\n".into()));
    }

    #[test]
    fn triple_quoted_string_tracks_end_line() {
        let toks = tokenize("x = '''a\nb'''\n").expect("tokenize");
        let s = toks
            .iter()
            .find(|t| matches!(t.tok, Tok::Str(_)))
            .expect("string token");
        assert_eq!((s.line, s.end_line), (1, 2));
    }
}
