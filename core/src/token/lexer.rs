use std::fmt;

use crate::token::{ParseError, Position, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    Colon,     // :
    Comma,     // ,
    Semicolon, // ;
    Assign,    // =
    Eq,        // ==
    Ne,        // !=
    Gt,        // >
    Lt,        // <
    Ge,        // >=
    Le,        // <=
    And,       // &&
    Or,        // ||
    Not,       // !
    Add,       // +
    Sub,       // -
    Mul,       // *
    Div,       // /
    FnArrow,   // ->
    // Statement keywords
    Var,    // var
    If,     // if
    Else,   // else
    While,  // while
    For,    // for
    Fn,     // fn
    Return, // return
    Str(String),
    Int(i64),
    Float(f32),
    Bool(bool),
    Id(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::Colon => "':'",
            Token::Comma => "','",
            Token::Semicolon => "';'",
            Token::Assign => "'='",
            Token::Eq => "'=='",
            Token::Ne => "'!='",
            Token::Gt => "'>'",
            Token::Lt => "'<'",
            Token::Ge => "'>='",
            Token::Le => "'<='",
            Token::And => "'&&'",
            Token::Or => "'||'",
            Token::Not => "'!'",
            Token::Add => "'+'",
            Token::Sub => "'-'",
            Token::Mul => "'*'",
            Token::Div => "'/'",
            Token::FnArrow => "'->'",
            Token::Var => "'var'",
            Token::If => "'if'",
            Token::Else => "'else'",
            Token::While => "'while'",
            Token::For => "'for'",
            Token::Fn => "'fn'",
            Token::Return => "'return'",
            Token::Str(s) => return write!(f, "string \"{}\"", s),
            Token::Int(i) => return write!(f, "integer {}", i),
            Token::Float(v) => return write!(f, "float {:?}", v),
            Token::Bool(b) => return write!(f, "'{}'", b),
            Token::Id(id) => return write!(f, "identifier '{}'", id),
        };
        f.write_str(s)
    }
}

const ASCII_WHITESPACE: u8 = 1 << 0;
const ASCII_DIGIT: u8 = 1 << 1;
const ASCII_IDENT_START: u8 = 1 << 2;
const ASCII_IDENT_CONT: u8 = 1 << 3;

const fn build_ascii_class() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        let c = i as u8;
        if matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C) {
            table[i] |= ASCII_WHITESPACE;
        }
        if c.is_ascii_digit() {
            table[i] |= ASCII_DIGIT | ASCII_IDENT_CONT;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            table[i] |= ASCII_IDENT_START | ASCII_IDENT_CONT;
        }
        i += 1;
    }
    table
}

const ASCII_CLASS: [u8; 128] = build_ascii_class();

#[inline]
fn ascii_flags(c: char) -> u8 {
    if c.is_ascii() { ASCII_CLASS[c as usize] } else { 0 }
}

#[inline]
fn is_space_char(c: char) -> bool {
    ascii_flags(c) & ASCII_WHITESPACE != 0 || (!c.is_ascii() && c.is_whitespace())
}

#[inline]
fn is_ident_start(c: char) -> bool {
    ascii_flags(c) & ASCII_IDENT_START != 0 || (!c.is_ascii() && c.is_alphabetic())
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    ascii_flags(c) & ASCII_IDENT_CONT != 0 || (!c.is_ascii() && c.is_alphanumeric())
}

#[inline]
fn is_digit(c: char) -> bool {
    ascii_flags(c) & ASCII_DIGIT != 0
}

fn keyword(id: &str) -> Option<Token> {
    Some(match id {
        "var" => Token::Var,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        "fn" => Token::Fn,
        "return" => Token::Return,
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => return None,
    })
}

pub struct Tokenizer {
    chars: Vec<char>,
    idx: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    spans: Vec<Span>,
}

impl Tokenizer {
    pub fn tokenize(s: &str) -> Result<Vec<Token>, ParseError> {
        Self::tokenize_with_spans(s).map(|(tokens, _)| tokens)
    }

    /// Tokenize and return tokens with spans aligned by index.
    pub fn tokenize_with_spans(s: &str) -> Result<(Vec<Token>, Vec<Span>), ParseError> {
        let mut t = Tokenizer {
            chars: s.chars().collect(),
            idx: 0,
            line: 1,
            column: 1,
            tokens: Vec::with_capacity(s.len() / 4),
            spans: Vec::with_capacity(s.len() / 4),
        };
        t.run()?;
        Ok((t.tokens, t.spans))
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column, self.idx)
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::at(msg, self.current_position())
    }

    fn eof(&self) -> bool {
        self.idx >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.idx + 1).copied()
    }

    fn advance_char(&mut self) {
        if self.peek() == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.idx += 1;
    }

    fn push(&mut self, token: Token, start: Position) {
        let end = self.current_position();
        self.tokens.push(token);
        self.spans.push(Span::new(start, end));
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            if is_space_char(c) {
                self.advance_char();
            } else if c == '/' && self.peek_next() == Some('/') {
                self.skip_line_comment();
            } else if c == '/' && self.peek_next() == Some('*') {
                self.skip_block_comment()?;
            } else if is_digit(c) {
                self.parse_num()?;
            } else if is_ident_start(c) {
                self.parse_id();
            } else if c == '"' {
                self.parse_str()?;
            } else {
                self.parse_punctuation(c)?;
            }
        }
        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            self.advance_char();
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.current_position();
        self.advance_char();
        self.advance_char();
        while !self.eof() {
            if self.peek() == Some('*') && self.peek_next() == Some('/') {
                self.advance_char();
                self.advance_char();
                return Ok(());
            }
            self.advance_char();
        }
        Err(ParseError::at("block comment not closed", start))
    }

    fn parse_str(&mut self) -> Result<(), ParseError> {
        let start = self.current_position();
        self.advance_char();
        let mut content = String::new();
        while let Some(c) = self.peek() {
            self.advance_char();
            if c == '"' {
                self.push(Token::Str(content), start);
                return Ok(());
            }
            content.push(c);
        }
        Err(ParseError::at("string not closed", start))
    }

    fn parse_num(&mut self) -> Result<(), ParseError> {
        let start = self.current_position();
        let mut num = String::new();
        let mut dot_count = 0;
        while let Some(c) = self.peek() {
            if is_digit(c) {
                num.push(c);
            } else if c == '.' {
                if dot_count > 0 {
                    return Err(self.err("invalid float, multiple '.'"));
                }
                dot_count += 1;
                num.push(c);
            } else {
                break;
            }
            self.advance_char();
        }
        if num.ends_with('.') {
            return Err(self.err("invalid float, ends with '.'"));
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.err(format!("invalid suffix after number '{}'", num)));
        }
        let token = if dot_count > 0 {
            Token::Float(
                num.parse()
                    .map_err(|_| ParseError::at(format!("invalid float '{}'", num), start))?,
            )
        } else {
            Token::Int(
                num.parse()
                    .map_err(|_| ParseError::at(format!("integer '{}' is too large", num), start))?,
            )
        };
        self.push(token, start);
        Ok(())
    }

    fn parse_id(&mut self) {
        let start = self.current_position();
        let mut id = String::new();
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            id.push(c);
            self.advance_char();
        }
        let token = keyword(&id).unwrap_or(Token::Id(id));
        self.push(token, start);
    }

    fn parse_punctuation(&mut self, c: char) -> Result<(), ParseError> {
        let start = self.current_position();
        let next = self.peek_next();
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('-', Some('>')) => (Token::FnArrow, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (':', _) => (Token::Colon, 1),
            (',', _) => (Token::Comma, 1),
            (';', _) => (Token::Semicolon, 1),
            ('=', _) => (Token::Assign, 1),
            ('>', _) => (Token::Gt, 1),
            ('<', _) => (Token::Lt, 1),
            ('!', _) => (Token::Not, 1),
            ('+', _) => (Token::Add, 1),
            ('-', _) => (Token::Sub, 1),
            ('*', _) => (Token::Mul, 1),
            ('/', _) => (Token::Div, 1),
            _ => return Err(self.err(format!("unexpected character '{}'", c))),
        };
        for _ in 0..width {
            self.advance_char();
        }
        self.push(token, start);
        Ok(())
    }
}
