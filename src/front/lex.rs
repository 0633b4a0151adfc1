//! The lexer.

use derive_more::Display;
use regex::Regex;

/// Tokens in the program.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display, Debug)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("num")]
    Num,
    #[display("char")]
    CharLit,
    #[display("int")]
    KwInt,
    #[display("char")]
    KwChar,
    #[display("void")]
    KwVoid,
    #[display("if")]
    KwIf,
    #[display("else")]
    KwElse,
    #[display("return")]
    KwReturn,
    #[display("==")]
    EqEq,
    #[display("!=")]
    NotEq,
    #[display("<=")]
    LtEq,
    #[display(">=")]
    GtEq,
    #[display("&&")]
    AndAnd,
    #[display("||")]
    OrOr,
    #[display("=")]
    Assign,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display(";")]
    Semi,
    #[display(",")]
    Comma,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("int", TokenKind::KwInt),
    ("char", TokenKind::KwChar),
    ("void", TokenKind::KwVoid),
    ("if", TokenKind::KwIf),
    ("else", TokenKind::KwElse),
    ("return", TokenKind::KwReturn),
];

pub struct LexError(usize, char);

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lexer error: unexpected character {:?} at {}",
            self.1, self.0
        )
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        // Order matters: multi-character operators must precede the
        // single-character prefixes they share (`==` before `=`, etc.),
        // and the identifier pattern must come after every keyword-shaped
        // literal so keywords aren't swallowed as plain identifiers.
        let matchers = vec![
            (Regex::new(r"\A'(\\.|[^'\\])'").unwrap(), TokenKind::CharLit),
            (Regex::new(r"\A[0-9]+").unwrap(), TokenKind::Num),
            (Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(), TokenKind::Id),
            (Regex::new(r"\A==").unwrap(), TokenKind::EqEq),
            (Regex::new(r"\A!=").unwrap(), TokenKind::NotEq),
            (Regex::new(r"\A<=").unwrap(), TokenKind::LtEq),
            (Regex::new(r"\A>=").unwrap(), TokenKind::GtEq),
            (Regex::new(r"\A&&").unwrap(), TokenKind::AndAnd),
            (Regex::new(r"\A\|\|").unwrap(), TokenKind::OrOr),
            (Regex::new(r"\A=").unwrap(), TokenKind::Assign),
            (Regex::new(r"\A<").unwrap(), TokenKind::Lt),
            (Regex::new(r"\A>").unwrap(), TokenKind::Gt),
            (Regex::new(r"\A\+").unwrap(), TokenKind::Plus),
            (Regex::new(r"\A-").unwrap(), TokenKind::Minus),
            (Regex::new(r"\A\*").unwrap(), TokenKind::Star),
            (Regex::new(r"\A/").unwrap(), TokenKind::Slash),
            (Regex::new(r"\A\(").unwrap(), TokenKind::LParen),
            (Regex::new(r"\A\)").unwrap(), TokenKind::RParen),
            (Regex::new(r"\A\{").unwrap(), TokenKind::LBrace),
            (Regex::new(r"\A\}").unwrap(), TokenKind::RBrace),
            (Regex::new(r"\A;").unwrap(), TokenKind::Semi),
            (Regex::new(r"\A,").unwrap(), TokenKind::Comma),
        ];

        Lexer {
            input,
            pos: 0,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://.*))*").unwrap(),
            matchers,
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.pos += m.end()
        }
    }

    fn resolve_keyword(text: &str, kind: TokenKind) -> TokenKind {
        if kind != TokenKind::Id {
            return kind;
        }
        KEYWORDS
            .iter()
            .find(|(kw, _)| *kw == text)
            .map(|(_, kind)| *kind)
            .unwrap_or(TokenKind::Id)
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();

        if self.end_of_input() {
            return Ok(None);
        }

        let rest = &self.input[self.pos..];

        for (re, kind) in &self.matchers {
            if let Some(m) = re.find(rest) {
                let text = m.as_str();
                let kind = Self::resolve_keyword(text, *kind);
                self.pos += m.end();
                return Ok(Some(Token { kind, text }));
            }
        }

        let bad_char = rest.chars().next().unwrap();
        Err(LexError(self.pos, bad_char))
    }
}
