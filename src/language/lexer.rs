use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::str::Chars<'a>,
    current: Option<char>,
    offset: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let current = chars.next();
        Self {
            src,
            chars,
            current,
            offset: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        while let Some(ch) = self.current {
            match ch {
                '$' => self.eat_comment(),
                '\n' => {
                    self.push_newline();
                    self.bump();
                }
                ch if ch.is_whitespace() => {
                    self.bump();
                }
                ch if ch.is_ascii_alphabetic() || ch == '_' => self.lex_identifier(),
                ch if ch.is_ascii_digit() => self.lex_number(),
                '.' => self.lex_identifier(),
                '"' => self.lex_string(),
                _ => self.lex_symbol(),
            }
        }
        self.push_newline();
        self.push_token(TokenKind::Eof, self.offset, self.offset);

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current {
            self.offset += ch.len_utf8();
        }
        self.current = self.chars.next();
        self.current
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn push_newline(&mut self) {
        // Collapse runs of blank lines into a single separator
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(TokenKind::Newline) | None
        ) {
            self.push_token(TokenKind::Newline, self.offset, self.offset);
        }
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            span: Span::new(start, end),
        });
    }

    fn eat_comment(&mut self) {
        // '$ ... $' comment; an unclosed one runs to end of line
        self.bump();
        while let Some(ch) = self.current {
            match ch {
                '$' => {
                    self.bump();
                    return;
                }
                '\n' => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn lex_identifier(&mut self) {
        let start = self.offset;
        if self.current == Some('.') {
            self.bump();
            if !matches!(self.current, Some(ch) if ch.is_ascii_alphabetic() || ch == '_') {
                self.error(start, self.offset, "Expected name after '.'");
                return;
            }
        }
        loop {
            while let Some(ch) = self.current {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    self.bump();
                } else {
                    break;
                }
            }
            // A dot joined to a further name segment qualifies by module
            if self.current == Some('.')
                && matches!(self.peek(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_')
            {
                self.bump();
                continue;
            }
            break;
        }

        let end = self.offset;
        let slice = &self.src[start..end];
        let kind = match slice {
            "func" => TokenKind::Func,
            "return" => TokenKind::Return,
            "let" => TokenKind::Let,
            "unlet" => TokenKind::Unlet,
            "swap" => TokenKind::Swap,
            "push" => TokenKind::Push,
            "pop" => TokenKind::Pop,
            "promote" => TokenKind::Promote,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "fi" => TokenKind::Fi,
            "loop" => TokenKind::Loop,
            "pool" => TokenKind::Pool,
            "for" => TokenKind::For,
            "rof" => TokenKind::Rof,
            "try" => TokenKind::Try,
            "yrt" => TokenKind::Yrt,
            "catch" => TokenKind::Catch,
            "do" => TokenKind::Do,
            "yield" => TokenKind::Yield,
            "undo" => TokenKind::Undo,
            "print" => TokenKind::Print,
            "println" => TokenKind::Println,
            "barrier" => TokenKind::Barrier,
            "mutex" => TokenKind::MutexKw,
            "xetum" => TokenKind::Xetum,
            "call" => TokenKind::Call,
            "uncall" => TokenKind::Uncall,
            "global" => TokenKind::Global,
            "import" => TokenKind::Import,
            "as" => TokenKind::As,
            "to" => TokenKind::To,
            "by" => TokenKind::By,
            "tensor" => TokenKind::Tensor,
            "in" => TokenKind::In,
            "TID" => TokenKind::Tid,
            _ => TokenKind::Identifier(slice.to_string()),
        };
        self.push_token(kind, start, end);
    }

    fn lex_number(&mut self) {
        let start = self.offset;
        while let Some(ch) = self.current {
            if ch.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        if self.current == Some('.') {
            if let Some(next) = self.peek() {
                if next.is_ascii_digit() {
                    self.bump();
                    while let Some(ch) = self.current {
                        if ch.is_ascii_digit() {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
            }
        }
        let end = self.offset;
        self.push_token(TokenKind::Number(self.src[start..end].to_string()), start, end);
    }

    fn lex_string(&mut self) {
        let start = self.offset;
        self.bump();
        let mut value = String::new();
        while let Some(ch) = self.current {
            match ch {
                '"' => {
                    self.bump();
                    let end = self.offset;
                    self.push_token(TokenKind::String(value), start, end);
                    return;
                }
                '\n' => break,
                '\\' => {
                    self.bump();
                    if let Some(escaped) = self.current {
                        value.push(match escaped {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            '\\' => '\\',
                            '"' => '"',
                            other => other,
                        });
                        self.bump();
                    } else {
                        break;
                    }
                }
                _ => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
        self.error(start, self.offset, "Unterminated string literal");
    }

    fn lex_symbol(&mut self) {
        let start = self.offset;
        match self.current {
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some('{') => self.single(TokenKind::LBrace),
            Some('}') => self.single(TokenKind::RBrace),
            Some('[') => self.single(TokenKind::LBracket),
            Some(']') => self.single(TokenKind::RBracket),
            Some(',') => self.single(TokenKind::Comma),
            Some('#') => self.single(TokenKind::Hash),
            Some('+') => self.with_eq(TokenKind::Plus, TokenKind::PlusEq),
            Some('-') => self.with_eq(TokenKind::Minus, TokenKind::MinusEq),
            Some('%') => self.with_eq(TokenKind::Percent, TokenKind::PercentEq),
            Some('^') => self.with_eq(TokenKind::Caret, TokenKind::CaretEq),
            Some('&') => self.with_eq(TokenKind::Ampersand, TokenKind::AmpersandEq),
            Some('|') => self.with_eq(TokenKind::Pipe, TokenKind::PipeEq),
            Some('!') => self.with_eq(TokenKind::Bang, TokenKind::BangEq),
            Some('*') => {
                self.bump();
                if self.current == Some('*') {
                    self.bump();
                    if self.current == Some('=') {
                        self.bump();
                        self.push_token(TokenKind::StarStarEq, start, self.offset);
                    } else {
                        self.push_token(TokenKind::StarStar, start, self.offset);
                    }
                } else if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::StarEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Star, start, self.offset);
                }
            }
            Some('/') => {
                self.bump();
                if self.current == Some('/') {
                    self.bump();
                    if self.current == Some('=') {
                        self.bump();
                        self.push_token(TokenKind::SlashSlashEq, start, self.offset);
                    } else {
                        self.push_token(TokenKind::SlashSlash, start, self.offset);
                    }
                } else if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::SlashEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Slash, start, self.offset);
                }
            }
            Some('=') => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::EqEq, start, self.offset);
                } else if self.current == Some('>') {
                    self.bump();
                    self.push_token(TokenKind::FatArrow, start, self.offset);
                } else {
                    self.push_token(TokenKind::Eq, start, self.offset);
                }
            }
            Some('<') => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    if self.current == Some('>') {
                        self.bump();
                        self.push_token(TokenKind::SwapArrow, start, self.offset);
                    } else {
                        self.push_token(TokenKind::LtEq, start, self.offset);
                    }
                } else {
                    self.push_token(TokenKind::Lt, start, self.offset);
                }
            }
            Some('>') => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::GtEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Gt, start, self.offset);
                }
            }
            Some(ch) => {
                self.bump();
                self.error(start, self.offset, format!("Unexpected character '{}'", ch));
            }
            None => {}
        }
    }

    fn with_eq(&mut self, bare: TokenKind, with_eq: TokenKind) {
        let start = self.offset;
        self.bump();
        if self.current == Some('=') {
            self.bump();
            self.push_token(with_eq, start, self.offset);
        } else {
            self.push_token(bare, start, self.offset);
        }
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.bump();
        self.push_token(kind, start, self.offset);
    }
}
