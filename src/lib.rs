//! rill - front-end for a small, safety-oriented language for writing
//! parsers of binary container formats.
//!
//! Architecture:
//! ```text
//! Source -> Lex -> Parse -> Type Check -> later passes
//!            |        |          |
//!        token map   AST    annotated AST
//! ```
//!
//! This crate is the front-end core: the token map ([`token`]), the AST
//! ([`ast`]), and the type checker ([`check`]). Lexing source text,
//! surface parsing and code generation live elsewhere; the parser is
//! expected to build nodes through the [`ast::Arena`] constructors and
//! hand the file to [`check::Checker::check_file`], which annotates the
//! AST in place for the passes that follow.

pub mod ast;
pub mod check;
pub mod error;
pub mod token;

pub use check::Checker;
pub use error::{CheckError, ErrorKind, Result};
