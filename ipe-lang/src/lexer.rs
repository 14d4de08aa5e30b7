//! Lexer for IPE
//!
//! Tokenizes IPE source into spanned tokens. Keywords accept both the
//! accented and the unaccented spelling (`função`/`funcao`).

use logos::Logos;
use serde::Serialize;

use crate::error::{Error, Result};

/// Integer literal payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntLiteral {
    pub value: i64,
    /// Written with an `L` suffix
    pub long: bool,
}

/// Floating literal payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatLiteral {
    pub value: f64,
    /// Written with an `f` suffix
    pub single: bool,
}

/// Why a slice could not be tokenized
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    #[default]
    UnexpectedCharacter,
    IntegerOverflow,
    InvalidEscape,
    InvalidCharLiteral,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // Program structure
    #[token("programa")]
    Programa,
    #[token("unidade")]
    Unidade,
    #[token("importe")]
    Importe,
    #[token("var")]
    Var,
    #[token("estrutura")]
    Estrutura,
    #[token("tipo")]
    Tipo,

    // Functions
    #[token("função")]
    #[token("funcao")]
    Funcao,
    #[token("externa")]
    Externa,
    #[token("ref")]
    Ref,
    #[token("retorne")]
    Retorne,

    // Control flow
    #[token("se")]
    Se,
    #[token("senão")]
    #[token("senao")]
    Senao,
    #[token("enquanto")]
    Enquanto,
    #[token("faça")]
    #[token("faca")]
    Faca,
    #[token("para")]
    Para,
    #[token("pare")]
    Pare,

    // Console
    #[token("leia")]
    Leia,
    #[token("escreva")]
    Escreva,
    #[token("escrevaln")]
    Escrevaln,

    // Literals and casts
    #[token("verdadeiro")]
    Verdadeiro,
    #[token("falso")]
    Falso,
    #[token("nulo")]
    Nulo,
    #[token("cast")]
    Cast,

    // Primitive types
    #[token("void")]
    TVoid,
    #[token("bool")]
    TBool,
    #[token("byte")]
    TByte,
    #[token("char")]
    TChar,
    #[token("short")]
    TShort,
    #[token("int")]
    TInt,
    #[token("long")]
    TLong,
    #[token("float")]
    TFloat,
    #[token("double")]
    TDouble,

    // Identifiers
    #[regex(r"[\p{L}_][\p{L}\p{N}_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Literals
    #[regex(r"[0-9]+[lL]?", int_literal)]
    #[regex(r"0[xX][0-9a-fA-F]+[lL]?", int_literal)]
    Int(IntLiteral),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[fF]?", float_literal)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fF]?", float_literal)]
    Float(FloatLiteral),

    #[regex(r"'([^'\\\n]|\\.)*'", char_literal)]
    Char(u16),

    #[regex(r#""([^"\\\n]|\\.)*""#, string_literal)]
    Str(String),

    // Operators
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
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    Ushr,

    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // Assignment
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token(">>>=")]
    UshrEq,

    // Delimiters
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}

fn int_literal(lex: &mut logos::Lexer<Token>) -> std::result::Result<IntLiteral, LexErrorKind> {
    let text = lex.slice();
    let (digits, long) = match text.strip_suffix(['l', 'L']) {
        Some(digits) => (digits, true),
        None => (text, false),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    };
    value
        .map(|value| IntLiteral { value, long })
        .map_err(|_| LexErrorKind::IntegerOverflow)
}

fn float_literal(lex: &mut logos::Lexer<Token>) -> std::result::Result<FloatLiteral, LexErrorKind> {
    let text = lex.slice();
    let (digits, single) = match text.strip_suffix(['f', 'F']) {
        Some(digits) => (digits, true),
        None => (text, false),
    };
    digits
        .parse::<f64>()
        .map(|value| FloatLiteral { value, single })
        .map_err(|_| LexErrorKind::UnexpectedCharacter)
}

fn char_literal(lex: &mut logos::Lexer<Token>) -> std::result::Result<u16, LexErrorKind> {
    let text = lex.slice();
    let units: Vec<u16> = unescape(&text[1..text.len() - 1])?.encode_utf16().collect();
    match units.as_slice() {
        [unit] => Ok(*unit),
        _ => Err(LexErrorKind::InvalidCharLiteral),
    }
}

fn string_literal(lex: &mut logos::Lexer<Token>) -> std::result::Result<String, LexErrorKind> {
    let text = lex.slice();
    unescape(&text[1..text.len() - 1])
}

fn unescape(body: &str) -> std::result::Result<String, LexErrorKind> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('\'') => '\'',
            Some('"') => '"',
            _ => return Err(LexErrorKind::InvalidEscape),
        };
        out.push(escaped);
    }
    Ok(out)
}

/// Source location span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, col: usize) -> Self {
        Self { start, end, line, col }
    }

    pub fn dummy() -> Self {
        Self::default()
    }

    /// Merge two spans into one that covers both
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            col: if self.line <= other.line { self.col } else { other.col },
        }
    }
}

/// Token with source location
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

pub struct Lexer<'s> {
    source: &'s str,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self { source }
    }

    /// Tokenize returning tokens without spans
    pub fn tokenize(&self) -> Result<Vec<Token>> {
        Ok(self.tokenize_with_spans()?.into_iter().map(|st| st.token).collect())
    }

    /// Tokenize returning tokens with source spans
    pub fn tokenize_with_spans(&self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        let mut lex = Token::lexer(self.source);

        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(self.source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        while let Some(token) = lex.next() {
            let byte_span = lex.span();
            let (line, col) = offset_to_line_col(&line_starts, byte_span.start);
            let span = Span::new(byte_span.start, byte_span.end, line, col);

            match token {
                Ok(token) => tokens.push(SpannedToken { token, span }),
                Err(kind) => {
                    let slice = &self.source[byte_span];
                    let message = match kind {
                        LexErrorKind::IntegerOverflow => {
                            format!("integer literal '{}' does not fit in 64 bits", slice)
                        }
                        LexErrorKind::InvalidEscape => {
                            format!("unknown escape sequence in {}", slice)
                        }
                        LexErrorKind::InvalidCharLiteral => {
                            format!("character literal {} must hold exactly one character", slice)
                        }
                        LexErrorKind::UnexpectedCharacter
                            if slice.starts_with('"') || slice.starts_with('\'') =>
                        {
                            "unterminated literal".to_string()
                        }
                        LexErrorKind::UnexpectedCharacter => {
                            format!("unexpected character: '{}'", slice)
                        }
                    };
                    return Err(Error::LexError { message, span });
                }
            }
        }

        Ok(tokens)
    }
}

/// Byte offset to 1-based line and column
fn offset_to_line_col(line_starts: &[usize], offset: usize) -> (usize, usize) {
    let line = line_starts.partition_point(|&start| start <= offset);
    let line_start = line_starts.get(line.saturating_sub(1)).copied().unwrap_or(0);
    (line, offset - line_start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i64) -> Token {
        Token::Int(IntLiteral { value, long: false })
    }

    #[test]
    fn test_keywords_accept_both_spellings() {
        let tokens = Lexer::new("função funcao senão senao faça faca").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Funcao,
                Token::Funcao,
                Token::Senao,
                Token::Senao,
                Token::Faca,
                Token::Faca,
            ]
        );
    }

    #[test]
    fn test_accented_identifiers() {
        let tokens = Lexer::new("posição _x1 maçã").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("posição".to_string()),
                Token::Ident("_x1".to_string()),
                Token::Ident("maçã".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = Lexer::new("42 0x7F 7L 3000000000 1.5 2.5f 1e3").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                int(42),
                int(0x7F),
                Token::Int(IntLiteral { value: 7, long: true }),
                int(3_000_000_000),
                Token::Float(FloatLiteral { value: 1.5, single: false }),
                Token::Float(FloatLiteral { value: 2.5, single: true }),
                Token::Float(FloatLiteral { value: 1000.0, single: false }),
            ]
        );
    }

    #[test]
    fn test_integer_overflow() {
        let err = Lexer::new("99999999999999999999").tokenize().unwrap_err();
        assert!(matches!(err, Error::LexError { .. }));
    }

    #[test]
    fn test_char_and_string_escapes() {
        let tokens = Lexer::new(r#"'a' '\n' "olá\t\"mundo\"""#).tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Char('a' as u16),
                Token::Char('\n' as u16),
                Token::Str("olá\t\"mundo\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_bad_escape_and_unterminated() {
        assert!(Lexer::new(r#""a\q""#).tokenize().is_err());
        let err = Lexer::new("\"aberto").tokenize().unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_operators_longest_match() {
        let tokens = Lexer::new(">>>= >>> >>= >> >= ++ += &&").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::UshrEq,
                Token::Ushr,
                Token::ShrEq,
                Token::Shr,
                Token::Ge,
                Token::PlusPlus,
                Token::PlusEq,
                Token::AndAnd,
            ]
        );
    }

    #[test]
    fn test_comments_and_spans() {
        let source = "// linha\n/* bloco\n ** */ var x";
        let tokens = Lexer::new(source).tokenize_with_spans().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].token, Token::Var);
        assert_eq!((tokens[0].span.line, tokens[0].span.col), (3, 8));
    }
}
