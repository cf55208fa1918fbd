//! Error types for the rill front-end.

use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckError>;

/// An error produced while checking a file, decorated with the source
/// location of the construct that was being checked when it occurred.
#[derive(Debug, Error)]
#[error("check: {kind} at {file}:{line}")]
pub struct CheckError {
    pub kind: ErrorKind,
    pub file: Arc<str>,
    pub line: u32,
}

impl CheckError {
    pub fn new(kind: ErrorKind, file: Arc<str>, line: u32) -> Self {
        Self { kind, file, line }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    // ==== Structural ====
    #[error("unrecognized node kind {kind} for {context}")]
    UnrecognizedKind {
        kind: &'static str,
        context: &'static str,
    },

    #[error("internal error: unchecked type expression {type_expr:?}")]
    InternalUncheckedTypeExpr { type_expr: String },

    #[error("internal error: {0}")]
    Internal(&'static str),

    #[error("expression recursion depth too large")]
    ExprTooDeep,

    #[error("type expression recursion depth too large")]
    TypeExprTooDeep,

    // ==== Lexical ====
    #[error("invalid numeric literal {literal:?}")]
    InvalidNumericLiteral { literal: String },

    // ==== Scope ====
    #[error("duplicate variable {name:?}")]
    DuplicateVar { name: String },

    #[error("duplicate struct {name:?}")]
    DuplicateStruct { name: String },

    #[error("unrecognized identifier {name:?}")]
    UnknownIdent { name: String },

    #[error("no matching while statement for {jump}")]
    NoJumpTarget { jump: String },

    #[error("no field named {field:?} found in struct type {struct_name:?} for expression {expr:?}")]
    NoSuchField {
        field: String,
        struct_name: String,
        expr: String,
    },

    #[error("no struct type {type_name:?} found for expression {expr:?}")]
    NoSuchStruct { type_name: String, expr: String },

    #[error("{name:?} is not a type")]
    NotAType { name: String },

    // ==== Typing ====
    #[error("{context} {expr:?}, of type {type_name:?}, does not have a boolean type")]
    NotBoolean {
        context: String,
        expr: String,
        type_name: String,
    },

    #[error("{context} {expr:?}, of type {type_name:?}, does not have a numeric type")]
    NonNumeric {
        context: String,
        expr: String,
        type_name: String,
    },

    #[error("{context}: {lhs:?} and {rhs:?}, of types {lhs_type:?} and {rhs_type:?}, do not have compatible types")]
    IncompatibleTypes {
        context: String,
        lhs: String,
        rhs: String,
        lhs_type: String,
        rhs_type: String,
    },

    #[error("cannot shift ideal number {lhs:?} by non-ideal number {rhs:?}")]
    IdealShift { lhs: String, rhs: String },

    #[error("cannot assign {rhs:?} of type {rhs_type:?} to {lhs:?} of type {lhs_type:?}")]
    NotAssignable {
        lhs: String,
        rhs: String,
        lhs_type: String,
        rhs_type: String,
    },

    #[error("cannot convert expression {expr:?}, of type {from:?}, as type {to:?}")]
    CannotConvert {
        expr: String,
        from: String,
        to: String,
    },

    #[error("unsupported package or decorator for dot expression {expr:?}")]
    UnsupportedDecoratorForDot { expr: String },

    #[error("unrecognized type expression {type_expr:?}")]
    UnrecognizedTypeExpr { type_expr: String },

    #[error("unrecognized expression form for {expr:?}")]
    UnrecognizedExprForm { expr: String },

    #[error("unrecognized operator in expression {expr:?}")]
    UnrecognizedOperator { expr: String },

    // ==== Constant folding ====
    #[error("division by zero in constant expression {expr:?}")]
    DivByZero { expr: String },

    #[error("shift count {shift:?} out of range in constant expression {expr:?}")]
    ShiftOutOfRange { shift: String, expr: String },

    #[error("{expr:?} is not a compile-time constant")]
    NotConstant { expr: String },

    #[error("not yet implemented: {what}")]
    Unimplemented { what: &'static str },
}
