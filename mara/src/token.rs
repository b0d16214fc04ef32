//! Tokens produced by the [`Lexer`](crate::lexer::Lexer).
use crate::span::Span;

/// The kind of a lexical token.
///
/// Literal tokens keep their source text; the constant pool parses them
/// later, so an out-of-range literal is reported once, by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Integer literal: `42`, `-7`, `0xff`, `1_000`.
    Int(String),
    /// Real literal: `3.14`, `-0.5`, `1.5e10`.
    Real(String),

    /// Identifier starting (after underscores) with a lowercase letter.
    ValueId(String),
    /// Identifier starting (after underscores) with an uppercase letter.
    TypeId(String),
    /// Operator made of symbol characters, e.g. `+`, `<=`, `^`.
    SymbolId(String),

    Module,
    End,
    Def,
    Val,
    Var,
    If,
    Else,
    While,
    True,
    False,

    /// `=` on its own.
    Assign,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// Statement terminator: `;` or a newline outside `()`/`[]`.
    Term,

    Eof,
    /// An unrecognized character.
    Error(String),
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Real(_) => "real",
            Self::ValueId(_) => "identifier",
            Self::TypeId(_) => "type name",
            Self::SymbolId(_) => "operator",
            Self::Module => "`module`",
            Self::End => "`end`",
            Self::Def => "`def`",
            Self::Val => "`val`",
            Self::Var => "`var`",
            Self::If => "`if`",
            Self::Else => "`else`",
            Self::While => "`while`",
            Self::True => "`true`",
            Self::False => "`false`",
            Self::Assign => "`=`",
            Self::Comma => "`,`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::Term => "end of statement",
            Self::Eof => "end of input",
            Self::Error(_) => "error",
        }
    }

    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "module" => Self::Module,
            "end" => Self::End,
            "def" => Self::Def,
            "val" => Self::Val,
            "var" => Self::Var,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether a token of this kind can be the last token of an operand.
    /// Used to tell a binary `-` from the sign of a literal.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            Self::Int(_)
                | Self::Real(_)
                | Self::ValueId(_)
                | Self::TypeId(_)
                | Self::True
                | Self::False
                | Self::RParen
                | Self::RBracket
                | Self::RBrace
        )
    }
}

/// A token with its location and the exact text it was lexed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }
}
