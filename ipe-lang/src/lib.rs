//! # IPE - Linguagem imperativa com palavras-chave em português
//!
//! Front end and code generator of the IPE toolchain. Source files are
//! compiled into an [`ipe_core::Image`] that the stack VM in `ipe-core`
//! executes.
//!
//! ## Example
//!
//! ```ipe
//! programa ola;
//! importe sistema;
//!
//! função dobro(x: int): int {
//!     retorne x * 2;
//! }
//!
//! escrevaln "dobro de 21 = ", dobro(21);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! IPE Source (.ipe)
//!     ↓ lexer
//! Token Stream
//!     ↓ parser
//! AST
//!     ↓ compiler (declare, resolve, codegen per unit)
//! Assemblers with pending labels
//!     ↓ linker
//! Image (.ipec)
//!     ↓ ipe_core::Machine
//! Execution
//! ```

pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod manifest;
pub mod parser;
pub mod scope;
pub mod source;
pub mod symbols;
pub mod types;

pub use ast::{Expr, ExprKind, Item, Program, Stmt, StmtKind, UnitKind};
pub use compiler::{Compiler, CompilerConfig};
pub use error::{Diagnostic, Error, ErrorKind, Result};
pub use lexer::{Lexer, Span, SpannedToken, Token};
pub use manifest::{BuildConfig, MANIFEST_FILE, Manifest, Package, create_manifest};
pub use parser::Parser;
pub use source::{FileProvider, MemoryProvider, SourceProvider};
pub use types::{Type, WidthClass};

use ipe_core::Image;

/// Parse IPE source code into an AST
pub fn parse(source: &str) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize_with_spans()?;
    Parser::new(tokens).parse()
}

/// Compile a single program; imports other than `sistema` are not available
pub fn compile(source: &str) -> Result<Image> {
    let mut compiler = Compiler::with_provider(CompilerConfig::default(), Box::new(MemoryProvider::new()));
    if compiler.compile_source("main", source) {
        compiler
            .take_image()
            .ok_or_else(|| Error::internal("compilation succeeded without an image"))
    } else {
        Err(compiler
            .take_error()
            .unwrap_or_else(|| Error::internal("compilation failed without a diagnostic")))
    }
}
