// Lexer for com2 protocol source files.
//
// Tokenizes `.com2` source using the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// com2 token types.
///
/// Keywords and symbols are matched as fixed strings. Identifiers and
/// integers carry their text/value so downstream phases never re-slice
/// the source. Type names (`bit`, `byte`, `integer`, `wire`) and duration
/// units (`s`, `ms`, `us`, `ns`) are contextual identifiers, not keywords.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|//[^\n]*")]
pub enum Token {
    // ── Section and declaration keywords ──
    #[token("parameters")]
    Parameters,
    #[token("variables")]
    Variables,
    #[token("shared_functions")]
    SharedFunctions,
    #[token("left_functions")]
    LeftFunctions,
    #[token("right_functions")]
    RightFunctions,
    #[token("func")]
    Func,
    #[token("input")]
    Input,
    #[token("output")]
    Output,
    #[token("state")]
    State,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("path")]
    Path,
    #[token("goto")]
    Goto,
    #[token("if")]
    If,

    // ── Wire action arrows ──
    #[token("->")]
    TransferRight,
    #[token("<-")]
    TransferLeft,
    #[token("=>")]
    SendRight,
    /// Also the less-or-equal operator inside expressions.
    #[token("<=")]
    SendLeft,

    // ── Structure symbols ──
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("..")]
    DotDot,
    #[token("=")]
    Equals,

    // ── Expression operators (passed through to emitted C) ──
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Bar,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,

    // ── Literals ──
    /// Unsigned decimal integer literal.
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    // ── Identifier ──
    //
    // Placed after keywords — logos prioritises fixed `#[token]` matches
    // over regex for the same length, so `state` matches State, not Ident.
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),
}

impl Token {
    /// The C-fragment text of an expression operator token, if it is one.
    pub fn op_text(&self) -> Option<&'static str> {
        Some(match self {
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::GtEq => ">=",
            Token::SendLeft => "<=",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Amp => "&",
            Token::Bar => "|",
            Token::Caret => "^",
            Token::Bang => "!",
            Token::Tilde => "~",
            _ => return None,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Parameters => write!(f, "parameters"),
            Token::Variables => write!(f, "variables"),
            Token::SharedFunctions => write!(f, "shared_functions"),
            Token::LeftFunctions => write!(f, "left_functions"),
            Token::RightFunctions => write!(f, "right_functions"),
            Token::Func => write!(f, "func"),
            Token::Input => write!(f, "input"),
            Token::Output => write!(f, "output"),
            Token::State => write!(f, "state"),
            Token::For => write!(f, "for"),
            Token::In => write!(f, "in"),
            Token::Path => write!(f, "path"),
            Token::Goto => write!(f, "goto"),
            Token::If => write!(f, "if"),
            Token::TransferRight => write!(f, "->"),
            Token::TransferLeft => write!(f, "<-"),
            Token::SendRight => write!(f, "=>"),
            Token::SendLeft => write!(f, "<="),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Semi => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::DotDot => write!(f, ".."),
            Token::Equals => write!(f, "="),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident(name) => write!(f, "{name}"),
            other => match other.op_text() {
                Some(text) => write!(f, "{text}"),
                None => write!(f, "<token>"),
            },
        }
    }
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex a com2 source string into tokens.
///
/// Returns all successfully parsed tokens together with any errors for
/// unrecognised characters. Lexing is non-fatal: errors are collected and
/// the lexer continues past bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
