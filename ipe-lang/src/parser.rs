//! Parser for IPE
//!
//! Recursive descent over the spanned token stream. Produces the AST only;
//! names and types are checked by the code generator.

use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::{Span, SpannedToken, Token};

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(&mut self) -> Result<Program> {
        let header = self.parse_header()?;
        let mut items = Vec::new();

        while !self.is_at_end() {
            items.push(self.parse_item()?);
        }

        Ok(Program { header, items })
    }

    // ===== Item Parsing =====

    fn parse_header(&mut self) -> Result<Header> {
        let span = self.current_span();
        let kind = match self.peek_token() {
            Some(Token::Programa) => UnitKind::Program,
            Some(Token::Unidade) => UnitKind::Unit,
            _ => {
                return Ok(Header {
                    kind: UnitKind::Program,
                    name: None,
                    span,
                });
            }
        };
        self.advance();
        let name = self.expect_ident()?;
        self.expect(Token::Semi)?;
        Ok(Header {
            kind,
            name: Some(name),
            span: span.merge(&self.prev_span()),
        })
    }

    fn parse_item(&mut self) -> Result<Item> {
        match self.peek_token() {
            Some(Token::Importe) => self.parse_import(),
            Some(Token::Estrutura) => self.parse_struct(),
            Some(Token::Tipo) => self.parse_type_alias(),
            Some(Token::Funcao) => self.parse_function(false),
            Some(Token::Externa) => {
                self.advance();
                self.parse_function(true)
            }
            Some(Token::Var) => {
                let decl = self.parse_var_decl()?;
                self.expect(Token::Semi)?;
                Ok(Item::Var(decl))
            }
            Some(Token::Programa) | Some(Token::Unidade) => {
                Err(self.error("Header must be the first declaration of the file"))
            }
            _ => Ok(Item::Stmt(self.parse_stmt()?)),
        }
    }

    fn parse_import(&mut self) -> Result<Item> {
        let start = self.current_span();
        self.expect(Token::Importe)?;
        let mut names = Vec::new();
        loop {
            let span = self.current_span();
            names.push((self.expect_ident()?, span));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Semi)?;
        Ok(Item::Import {
            names,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_struct(&mut self) -> Result<Item> {
        let start = self.current_span();
        self.expect(Token::Estrutura)?;
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;

        let mut fields = Vec::new();
        while !matches!(self.peek_token(), Some(Token::RBrace) | None) {
            let span = self.current_span();
            let field = self.expect_ident()?;
            self.expect(Token::Colon)?;
            let ty = self.parse_type()?;
            self.expect(Token::Semi)?;
            fields.push(FieldDecl {
                name: field,
                ty,
                span: span.merge(&self.prev_span()),
            });
        }
        self.expect(Token::RBrace)?;

        Ok(Item::Struct {
            name,
            fields,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_type_alias(&mut self) -> Result<Item> {
        let start = self.current_span();
        self.expect(Token::Tipo)?;
        let name = self.expect_ident()?;
        self.expect(Token::Eq)?;
        let ty = self.parse_type()?;
        self.expect(Token::Semi)?;
        Ok(Item::TypeAlias {
            name,
            ty,
            span: start.merge(&self.prev_span()),
        })
    }

    /// `função nome(params): tipo { ... }`, or the `externa` form ending in `;`
    fn parse_function(&mut self, is_extern: bool) -> Result<Item> {
        let start = self.current_span();
        self.expect(Token::Funcao)?;
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let params = self.parse_params()?;
        self.expect(Token::RParen)?;

        let ret = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = if is_extern {
            self.expect(Token::Semi)?;
            None
        } else {
            Some(self.parse_block()?)
        };

        Ok(Item::Function(FunctionDecl {
            name,
            params,
            ret,
            body,
            is_extern,
            span: start.merge(&self.prev_span()),
        }))
    }

    fn parse_params(&mut self) -> Result<Vec<ParamDecl>> {
        let mut params = Vec::new();
        if matches!(self.peek_token(), Some(Token::RParen)) {
            return Ok(params);
        }

        loop {
            let span = self.current_span();
            let by_ref = self.eat(&Token::Ref);
            let name = self.expect_ident()?;
            self.expect(Token::Colon)?;
            let ty = self.parse_type()?;
            params.push(ParamDecl {
                name,
                ty,
                by_ref,
                span: span.merge(&self.prev_span()),
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        Ok(params)
    }

    /// `var a, b: tipo = valor` without the trailing `;`
    fn parse_var_decl(&mut self) -> Result<VarDecl> {
        let start = self.current_span();
        self.expect(Token::Var)?;

        let mut names = Vec::new();
        loop {
            let span = self.current_span();
            names.push((self.expect_ident()?, span));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Colon)?;
        let ty = self.parse_type()?;
        let init = if self.eat(&Token::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(VarDecl {
            names,
            ty,
            init,
            span: start.merge(&self.prev_span()),
        })
    }

    // ===== Type Parsing =====

    fn parse_type(&mut self) -> Result<TypeExpr> {
        let start = self.current_span();
        let base = match self.peek_token() {
            Some(Token::TVoid) => TypeBase::Primitive(PrimitiveType::Void),
            Some(Token::TBool) => TypeBase::Primitive(PrimitiveType::Bool),
            Some(Token::TByte) => TypeBase::Primitive(PrimitiveType::Byte),
            Some(Token::TChar) => TypeBase::Primitive(PrimitiveType::Char),
            Some(Token::TShort) => TypeBase::Primitive(PrimitiveType::Short),
            Some(Token::TInt) => TypeBase::Primitive(PrimitiveType::Int),
            Some(Token::TLong) => TypeBase::Primitive(PrimitiveType::Long),
            Some(Token::TFloat) => TypeBase::Primitive(PrimitiveType::Float),
            Some(Token::TDouble) => TypeBase::Primitive(PrimitiveType::Double),
            Some(Token::Ident(name)) => TypeBase::Named(name.clone()),
            _ => return Err(self.error("Expected type")),
        };
        self.advance();

        let mut suffixes: Vec<TypeSuffix> = Vec::new();
        loop {
            match self.peek_token() {
                Some(Token::Star) => {
                    self.advance();
                    suffixes.push(TypeSuffix::Pointer);
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let dim = self.parse_dimension()?;
                    self.expect(Token::RBracket)?;
                    match suffixes.last_mut() {
                        Some(TypeSuffix::Array(dims)) => dims.push(dim),
                        _ => suffixes.push(TypeSuffix::Array(vec![dim])),
                    }
                }
                _ => break,
            }
        }

        Ok(TypeExpr {
            base,
            suffixes,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_dimension(&mut self) -> Result<u32> {
        match self.peek_token() {
            Some(Token::Int(lit)) if lit.value > 0 && lit.value <= u32::MAX as i64 => {
                let dim = lit.value as u32;
                self.advance();
                Ok(dim)
            }
            _ => Err(self.error("Expected positive array dimension")),
        }
    }

    // ===== Statement Parsing =====

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !matches!(self.peek_token(), Some(Token::RBrace) | None) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(Token::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_token() {
            Some(Token::LBrace) => StmtKind::Block(self.parse_block()?),
            Some(Token::Var) => {
                let decl = self.parse_var_decl()?;
                self.expect(Token::Semi)?;
                StmtKind::Var(decl)
            }
            Some(Token::Se) => self.parse_if()?,
            Some(Token::Enquanto) => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = Box::new(self.parse_stmt()?);
                StmtKind::While { condition, body }
            }
            Some(Token::Faca) => {
                self.advance();
                let body = Box::new(self.parse_stmt()?);
                self.expect(Token::Enquanto)?;
                let condition = self.parse_condition()?;
                self.expect(Token::Semi)?;
                StmtKind::DoWhile { body, condition }
            }
            Some(Token::Para) => self.parse_for()?,
            Some(Token::Pare) => {
                self.advance();
                self.expect(Token::Semi)?;
                StmtKind::Break
            }
            Some(Token::Retorne) => {
                self.advance();
                let value = if matches!(self.peek_token(), Some(Token::Semi)) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(Token::Semi)?;
                StmtKind::Return(value)
            }
            Some(Token::Leia) => {
                self.advance();
                let args = self.parse_io_args()?;
                StmtKind::Read(args)
            }
            Some(Token::Escreva) | Some(Token::Escrevaln) => {
                let newline = matches!(self.peek_token(), Some(Token::Escrevaln));
                self.advance();
                let args = self.parse_io_args()?;
                StmtKind::Print { args, newline }
            }
            Some(Token::Semi) => {
                self.advance();
                StmtKind::Empty
            }
            Some(_) => {
                let expr = self.parse_expr()?;
                self.expect(Token::Semi)?;
                StmtKind::Expr(expr)
            }
            None => return Err(self.error("Expected statement")),
        };

        Ok(Stmt::new(kind, start.merge(&self.prev_span())))
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        self.expect(Token::Se)?;
        let condition = self.parse_condition()?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.eat(&Token::Senao) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.expect(Token::Para)?;
        self.expect(Token::LParen)?;

        let mut init = Vec::new();
        if !matches!(self.peek_token(), Some(Token::Semi)) {
            loop {
                if matches!(self.peek_token(), Some(Token::Var)) {
                    init.push(ForInit::Var(self.parse_var_decl()?));
                } else {
                    init.push(ForInit::Expr(self.parse_expr()?));
                }
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::Semi)?;

        let condition = if matches!(self.peek_token(), Some(Token::Semi)) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Token::Semi)?;

        let mut update = Vec::new();
        if !matches!(self.peek_token(), Some(Token::RParen)) {
            loop {
                update.push(self.parse_expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        let body = Box::new(self.parse_stmt()?);
        Ok(StmtKind::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn parse_condition(&mut self) -> Result<Expr> {
        self.expect(Token::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(Token::RParen)?;
        Ok(condition)
    }

    /// Comma separated operands of `leia`/`escreva`, up to `;`
    fn parse_io_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if !matches!(self.peek_token(), Some(Token::Semi)) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::Semi)?;
        Ok(args)
    }

    // ===== Expression Parsing =====

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let target = self.parse_logical_or()?;

        let op = match self.peek_token() {
            Some(Token::Eq) => None,
            Some(Token::PlusEq) => Some(BinOp::Add),
            Some(Token::MinusEq) => Some(BinOp::Sub),
            Some(Token::StarEq) => Some(BinOp::Mul),
            Some(Token::SlashEq) => Some(BinOp::Div),
            Some(Token::PercentEq) => Some(BinOp::Mod),
            Some(Token::AmpEq) => Some(BinOp::BitAnd),
            Some(Token::PipeEq) => Some(BinOp::BitOr),
            Some(Token::CaretEq) => Some(BinOp::BitXor),
            Some(Token::ShlEq) => Some(BinOp::Shl),
            Some(Token::ShrEq) => Some(BinOp::Shr),
            Some(Token::UshrEq) => Some(BinOp::Ushr),
            _ => return Ok(target),
        };
        self.advance();

        // right associative
        let value = self.parse_assignment()?;
        let span = target.span.merge(&value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        self.parse_binary_level(0)
    }

    /// Left-associative binary levels, loosest first
    fn parse_binary_level(&mut self, level: usize) -> Result<Expr> {
        if level == BINARY_LEVELS {
            return self.parse_unary();
        }

        let mut left = self.parse_binary_level(level + 1)?;
        while let Some(op) = self.peek_token().and_then(|t| binary_op(level, t)) {
            self.advance();
            let right = self.parse_binary_level(level + 1)?;
            let span = left.span.merge(&right.span);
            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.current_span();
        let op = match self.peek_token() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Tilde) => UnaryOp::BitNot,
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Amp) => UnaryOp::AddrOf,
            Some(Token::Star) => UnaryOp::Deref,
            Some(Token::PlusPlus) | Some(Token::MinusMinus) => {
                let increment = matches!(self.peek_token(), Some(Token::PlusPlus));
                self.advance();
                let expr = self.parse_unary()?;
                let span = start.merge(&expr.span);
                return Ok(Expr::new(
                    ExprKind::IncDec {
                        increment,
                        prefix: true,
                        expr: Box::new(expr),
                    },
                    span,
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();

        let expr = self.parse_unary()?;
        let span = start.merge(&expr.span);

        // fold negative integer literals so that i32::MIN stays an int
        if let (UnaryOp::Neg, ExprKind::Int { value, long }) = (op, &expr.kind) {
            return Ok(Expr::new(
                ExprKind::Int {
                    value: value.wrapping_neg(),
                    long: *long,
                },
                span,
            ));
        }

        Ok(Expr::new(
            ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek_token() {
                Some(Token::LParen) => {
                    let ExprKind::Ident(name) = &expr.kind else {
                        return Err(self.error("Expected function name before '('"));
                    };
                    let name = name.clone();
                    self.advance();
                    let args = self.parse_args()?;
                    self.expect(Token::RParen)?;
                    let span = expr.span.merge(&self.prev_span());
                    expr = Expr::new(ExprKind::Call { name, args }, span);
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let mut indices = vec![self.parse_expr()?];
                    while self.eat(&Token::Comma) {
                        indices.push(self.parse_expr()?);
                    }
                    self.expect(Token::RBracket)?;
                    let span = expr.span.merge(&self.prev_span());

                    expr = match expr.kind {
                        // a[i][j] is the same access as a[i, j]
                        ExprKind::Index { base, indices: mut prev } => {
                            prev.extend(indices);
                            Expr::new(ExprKind::Index { base, indices: prev }, span)
                        }
                        kind => Expr::new(
                            ExprKind::Index {
                                base: Box::new(Expr::new(kind, expr.span)),
                                indices,
                            },
                            span,
                        ),
                    };
                }
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_ident()?;
                    let span = expr.span.merge(&self.prev_span());
                    expr = Expr::new(
                        ExprKind::Field {
                            base: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                Some(Token::PlusPlus) | Some(Token::MinusMinus) => {
                    let increment = matches!(self.peek_token(), Some(Token::PlusPlus));
                    self.advance();
                    let span = expr.span.merge(&self.prev_span());
                    expr = Expr::new(
                        ExprKind::IncDec {
                            increment,
                            prefix: false,
                            expr: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.current_span();
        let kind = match self.peek_token() {
            Some(Token::Int(lit)) => ExprKind::Int {
                value: lit.value,
                long: lit.long,
            },
            Some(Token::Float(lit)) => ExprKind::Float {
                value: lit.value,
                single: lit.single,
            },
            Some(Token::Char(c)) => ExprKind::Char(*c),
            Some(Token::Str(s)) => ExprKind::Str(s.clone()),
            Some(Token::Verdadeiro) => ExprKind::Bool(true),
            Some(Token::Falso) => ExprKind::Bool(false),
            Some(Token::Nulo) => ExprKind::Null,
            Some(Token::Ident(name)) => ExprKind::Ident(name.clone()),
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                return Ok(Expr::new(inner.kind, span.merge(&self.prev_span())));
            }
            Some(Token::Cast) => {
                self.advance();
                self.expect(Token::Lt)?;
                let ty = self.parse_type()?;
                self.expect(Token::Gt)?;
                self.expect(Token::LParen)?;
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                return Ok(Expr::new(
                    ExprKind::Cast {
                        ty,
                        expr: Box::new(expr),
                    },
                    span.merge(&self.prev_span()),
                ));
            }
            _ => return Err(self.error("Expected expression")),
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek_token(), Some(Token::RParen)) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        Ok(args)
    }

    // ===== Helper Methods =====

    /// Peek at the current token (without span)
    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|st| &st.token)
    }

    /// Get the span of the current token
    fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(st) => st.span,
            // end of input: point just past the last token
            None => self.prev_span(),
        }
    }

    /// Get the span of the previous token
    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens.get(self.pos - 1).map(|st| st.span).unwrap_or(Span::dummy())
        } else {
            Span::dummy()
        }
    }

    fn advance(&mut self) -> Option<&SpannedToken> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume the token if it matches
    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.peek_token() {
            Some(token) if std::mem::discriminant(token) == std::mem::discriminant(&expected) => {
                self.advance();
                Ok(())
            }
            Some(found) => Err(self.error(&format!("Expected {:?}, found {:?}", expected, found))),
            None => Err(self.error(&format!("Expected {:?}, found end of input", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek_token() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("Expected identifier")),
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::ParseError {
            message: message.to_string(),
            span: self.current_span(),
        }
    }
}

const BINARY_LEVELS: usize = 10;

/// Operator for `token` at precedence `level` (0 binds loosest)
fn binary_op(level: usize, token: &Token) -> Option<BinOp> {
    let op = match (level, token) {
        (0, Token::OrOr) => BinOp::Or,
        (1, Token::AndAnd) => BinOp::And,
        (2, Token::Pipe) => BinOp::BitOr,
        (3, Token::Caret) => BinOp::BitXor,
        (4, Token::Amp) => BinOp::BitAnd,
        (5, Token::EqEq) => BinOp::Eq,
        (5, Token::Ne) => BinOp::Ne,
        (6, Token::Lt) => BinOp::Lt,
        (6, Token::Le) => BinOp::Le,
        (6, Token::Gt) => BinOp::Gt,
        (6, Token::Ge) => BinOp::Ge,
        (7, Token::Shl) => BinOp::Shl,
        (7, Token::Shr) => BinOp::Shr,
        (7, Token::Ushr) => BinOp::Ushr,
        (8, Token::Plus) => BinOp::Add,
        (8, Token::Minus) => BinOp::Sub,
        (9, Token::Star) => BinOp::Mul,
        (9, Token::Slash) => BinOp::Div,
        (9, Token::Percent) => BinOp::Mod,
        _ => return None,
    };
    Some(op)
}
