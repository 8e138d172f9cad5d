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

/// Longest first, so that `>>>=` wins over `>>>`, `>>` and `>`.
const OPERATORS: &[&str] = &[
    ">>>=", "**=", "//=", "<<=", ">>=", "&&=", "||=", "^^=", "!=~", ">>>", ".//", "**", "//",
    "<<", ">>", "&&", "||", "^^", "=~", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=",
    ".=", ".+", ".-", ".*", "./", "&=", "|=", "^=", "=", "<", ">", "|", "^", "&", "+", "-", ".",
    "*", "/", "%", "!", "~",
];

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
                '#' => self.eat_line_comment(),
                ch if ch.is_whitespace() => {
                    self.bump();
                }
                ch if ch.is_alphabetic() || ch == '_' => self.lex_identifier(),
                ch if ch.is_ascii_digit() => self.lex_number(),
                '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) && !self.after_operand() => {
                    self.lex_number()
                }
                '"' => self.lex_string(),
                '$' => self.lex_sigil('$'),
                '@' => self.lex_sigil('@'),
                _ => self.lex_symbol(),
            }
        }
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

    fn after_operand(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|token| token.kind.ends_operand())
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            span: Span::new(start, end),
        });
    }

    fn eat_line_comment(&mut self) {
        while let Some(ch) = self.current {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn eat_word(&mut self) -> &'a str {
        let start = self.offset;
        while let Some(ch) = self.current {
            if ch.is_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let src = self.src;
        &src[start..self.offset]
    }

    fn lex_identifier(&mut self) {
        let start = self.offset;
        let slice = self.eat_word();

        if matches!(slice, "min" | "max") && self.current == Some('=') && self.peek() != Some('=') {
            self.bump();
            let op = if slice == "min" { "min=" } else { "max=" };
            self.push_token(TokenKind::Op(op), start, self.offset);
            return;
        }

        let kind = match slice {
            "begin" => TokenKind::Begin,
            "end" => TokenKind::End,
            "func" => TokenKind::Func,
            "subr" => TokenKind::Subr,
            "call" => TokenKind::Call,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "filter" => TokenKind::Filter,
            "unset" => TokenKind::Unset,
            "emit" => TokenKind::Emit,
            "emitp" => TokenKind::Emitp,
            "emitf" => TokenKind::Emitf,
            "tee" => TokenKind::Tee,
            "dump" => TokenKind::Dump,
            "edump" => TokenKind::Edump,
            "print" => TokenKind::Print,
            "printn" => TokenKind::Printn,
            "eprint" => TokenKind::Eprint,
            "eprintn" => TokenKind::Eprintn,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(slice.to_string()),
        };
        self.push_token(kind, start, self.offset);
    }

    fn eat_digits(&mut self, radix: u32) {
        while self.current.is_some_and(|ch| ch.is_digit(radix)) {
            self.bump();
        }
    }

    fn lex_number(&mut self) {
        let start = self.offset;
        if self.current == Some('0') && matches!(self.peek(), Some('x' | 'X')) {
            self.bump();
            self.bump();
            self.eat_digits(16);
            if self.offset - start == 2 {
                self.error(start, self.offset, "Invalid hex literal");
                return;
            }
        } else {
            self.eat_digits(10);
            if self.current == Some('.') {
                self.bump();
                self.eat_digits(10);
            }
            if matches!(self.current, Some('e' | 'E')) {
                let mut lookahead = self.chars.clone();
                let valid = match lookahead.next() {
                    Some('+' | '-') => lookahead.next().is_some_and(|c| c.is_ascii_digit()),
                    Some(c) => c.is_ascii_digit(),
                    None => false,
                };
                if valid {
                    self.bump();
                    if matches!(self.current, Some('+' | '-')) {
                        self.bump();
                    }
                    self.eat_digits(10);
                }
            }
        }
        if self.current.is_some_and(|ch| ch.is_alphabetic() || ch == '_') {
            self.eat_word();
            let message = format!("Invalid numeric literal `{}`", &self.src[start..self.offset]);
            self.error(start, self.offset, message);
            return;
        }
        let text = self.src[start..self.offset].to_string();
        self.push_token(TokenKind::Number(text), start, self.offset);
    }

    /// Decodes `\"`, `\\`, `\t`, `\n` and `\r`. Every other backslash pair is
    /// kept as written so that regex escapes and `\1` captures survive.
    fn lex_string(&mut self) {
        let start = self.offset;
        self.bump();
        let mut value = String::new();
        while let Some(ch) = self.current {
            match ch {
                '"' => {
                    self.bump();
                    if self.current == Some('i') && !self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                        self.bump();
                        self.push_token(TokenKind::RegexI(value), start, self.offset);
                    } else {
                        self.push_token(TokenKind::String(value), start, self.offset);
                    }
                    return;
                }
                '\\' => {
                    self.bump();
                    match self.current {
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        Some('t') => value.push('\t'),
                        Some('n') => value.push('\n'),
                        Some('r') => value.push('\r'),
                        Some(other) => {
                            value.push('\\');
                            value.push(other);
                        }
                        None => break,
                    }
                    self.bump();
                }
                _ => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
        self.error(start, self.offset, "Unterminated string literal");
    }

    /// `$name`, `${any text}`, `$*`, `$[`, and the same forms after `@`.
    fn lex_sigil(&mut self, sigil: char) {
        let start = self.offset;
        self.bump();
        let field = sigil == '$';
        match self.current {
            Some('*') => {
                self.bump();
                let kind = if field { TokenKind::FieldStar } else { TokenKind::OosvarStar };
                self.push_token(kind, start, self.offset);
            }
            Some('[') => {
                self.bump();
                let kind = if field { TokenKind::FieldBracket } else { TokenKind::OosvarBracket };
                self.push_token(kind, start, self.offset);
            }
            Some('{') => {
                self.bump();
                let name_start = self.offset;
                while self.current.is_some_and(|ch| ch != '}') {
                    self.bump();
                }
                if self.current.is_none() {
                    self.error(start, self.offset, "Unterminated braced name");
                    return;
                }
                let name = self.src[name_start..self.offset].to_string();
                self.bump();
                self.push_named(field, name, start);
            }
            Some(ch) if ch.is_alphanumeric() || ch == '_' => {
                let name = self.eat_word().to_string();
                self.push_named(field, name, start);
            }
            _ => self.error(start, self.offset, format!("Expected a name after `{sigil}`")),
        }
    }

    fn push_named(&mut self, field: bool, name: String, start: usize) {
        let kind = if field {
            TokenKind::Field(name)
        } else {
            TokenKind::Oosvar(name)
        };
        self.push_token(kind, start, self.offset);
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
            Some(':') => self.single(TokenKind::Colon),
            Some(';') => self.single(TokenKind::Semi),
            Some('?') => self.single(TokenKind::Question),
            Some(ch) => {
                let rest = &self.src[start..];
                match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
                    Some(&op) => {
                        for _ in 0..op.len() {
                            self.bump();
                        }
                        self.push_token(TokenKind::Op(op), start, self.offset);
                    }
                    None => {
                        self.bump();
                        self.error(start, self.offset, format!("Unexpected character '{ch}'"));
                    }
                }
            }
            None => {}
        }
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.bump();
        self.push_token(kind, start, self.offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn sigils_and_braced_names() {
        assert_eq!(
            kinds("$x ${a b} $* $[ @sum @{c d} @* @["),
            vec![
                TokenKind::Field("x".into()),
                TokenKind::Field("a b".into()),
                TokenKind::FieldStar,
                TokenKind::FieldBracket,
                TokenKind::Oosvar("sum".into()),
                TokenKind::Oosvar("c d".into()),
                TokenKind::OosvarStar,
                TokenKind::OosvarBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn operators_take_the_longest_match() {
        assert_eq!(
            kinds("a >>>= 1 // 2 ** 3 !=~ min= x"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Op(">>>="),
                TokenKind::Number("1".into()),
                TokenKind::Op("//"),
                TokenKind::Number("2".into()),
                TokenKind::Op("**"),
                TokenKind::Number("3".into()),
                TokenKind::Op("!=~"),
                TokenKind::Op("min="),
                TokenKind::Identifier("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dot_arithmetic_operators() {
        assert_eq!(
            kinds("$a .+ 3 .- b .* c ./ d .// e .= f"),
            vec![
                TokenKind::Field("a".into()),
                TokenKind::Op(".+"),
                TokenKind::Number("3".into()),
                TokenKind::Op(".-"),
                TokenKind::Identifier("b".into()),
                TokenKind::Op(".*"),
                TokenKind::Identifier("c".into()),
                TokenKind::Op("./"),
                TokenKind::Identifier("d".into()),
                TokenKind::Op(".//"),
                TokenKind::Identifier("e".into()),
                TokenKind::Op(".="),
                TokenKind::Identifier("f".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_the_dot_operator() {
        assert_eq!(
            kinds(".5, 0xff, 1.5, 1e3, 2.5E-3, $a . 5"),
            vec![
                TokenKind::Number(".5".into()),
                TokenKind::Comma,
                TokenKind::Number("0xff".into()),
                TokenKind::Comma,
                TokenKind::Number("1.5".into()),
                TokenKind::Comma,
                TokenKind::Number("1e3".into()),
                TokenKind::Comma,
                TokenKind::Number("2.5E-3".into()),
                TokenKind::Comma,
                TokenKind::Field("a".into()),
                TokenKind::Op("."),
                TokenKind::Number("5".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("$a .5"),
            vec![
                TokenKind::Field("a".into()),
                TokenKind::Op("."),
                TokenKind::Number("5".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_keep_regex_backslashes() {
        assert_eq!(
            kinds(r#""a\tb\"c" "\.\d+\1" "abc"i"#),
            vec![
                TokenKind::String("a\tb\"c".into()),
                TokenKind::String("\\.\\d+\\1".into()),
                TokenKind::RegexI("abc".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            kinds("$y = 1 # set y\n$z = \"#not\""),
            vec![
                TokenKind::Field("y".into()),
                TokenKind::Op("="),
                TokenKind::Number("1".into()),
                TokenKind::Field("z".into()),
                TokenKind::Op("="),
                TokenKind::String("#not".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_bad_input() {
        let errors = lex("$x = \"open").expect_err("unterminated");
        assert_eq!(errors[0].message, "Unterminated string literal");
        assert!(lex("`").is_err());
        assert!(lex("12abc").is_err());
    }
}
