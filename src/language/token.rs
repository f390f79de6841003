use crate::language::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Number(String),
    String(String),

    Func,
    Return,
    Let,
    Unlet,
    Swap,
    Push,
    Pop,
    Promote,
    If,
    Else,
    Fi,
    Loop,
    Pool,
    For,
    Rof,
    Try,
    Yrt,
    Catch,
    Do,
    Yield,
    Undo,
    Print,
    Println,
    Barrier,
    MutexKw,
    Xetum,
    Call,
    Uncall,
    Global,
    Import,
    As,
    To,
    By,
    Tensor,
    In,
    Tid,

    Eq,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    SwapArrow, // <=>
    FatArrow,  // =>
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Caret,
    Ampersand,
    Pipe,
    Bang,
    Hash,
    Comma,

    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    SlashSlashEq,
    PercentEq,
    CaretEq,
    AmpersandEq,
    PipeEq,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Newline,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Number(_) => "number",
            TokenKind::String(_) => "string",
            TokenKind::Newline => "end of line",
            TokenKind::Eof => "end of file",
            _ => "symbol",
        }
    }
}
