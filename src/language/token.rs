use crate::language::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    /// Numeric literal text as written; typed at compile time.
    Number(String),
    String(String),
    /// `"..."i`: a case-insensitive regex literal.
    RegexI(String),
    Field(String),
    FieldStar,
    FieldBracket,
    Oosvar(String),
    OosvarStar,
    OosvarBracket,
    /// Operators, including the compound assignments (`+=`, `min=`, ...).
    Op(&'static str),

    Begin,
    End,
    Func,
    Subr,
    Call,
    If,
    Elif,
    Else,
    While,
    Do,
    For,
    In,
    Break,
    Continue,
    Return,
    Filter,
    Unset,
    Emit,
    Emitp,
    Emitf,
    Tee,
    Dump,
    Edump,
    Print,
    Printn,
    Eprint,
    Eprintn,
    True,
    False,

    Comma,
    Colon,
    Semi,
    Question,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

impl TokenKind {
    /// True for tokens that can end an operand, so that a following `.5` is
    /// the dot operator rather than a number.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Identifier(_)
                | TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::RegexI(_)
                | TokenKind::Field(_)
                | TokenKind::FieldStar
                | TokenKind::Oosvar(_)
                | TokenKind::OosvarStar
                | TokenKind::True
                | TokenKind::False
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
        )
    }

    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier `{name}`"),
            TokenKind::Number(text) => format!("number `{text}`"),
            TokenKind::String(_) | TokenKind::RegexI(_) => "string literal".to_string(),
            TokenKind::Field(name) => format!("field `${name}`"),
            TokenKind::Oosvar(name) => format!("out-of-stream variable `@{name}`"),
            TokenKind::Op(op) => format!("`{op}`"),
            TokenKind::Eof => "end of expression".to_string(),
            other => format!("{other:?}").to_lowercase(),
        }
    }
}
