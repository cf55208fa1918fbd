//! Type checking for rill.
//!
//! A single synchronous pass over a parsed file: resolves identifiers
//! against function-local scope, infers the implicit type of every
//! expression, folds constant expressions with big integers, validates
//! statement and jump structure, and annotates each node in place.
//!
//! The first error wins: the checker returns immediately and nothing is
//! retried. Annotations written before the failure remain; `TYPE_CHECKED`
//! is monotonic, so a node carrying it was checked without error.

use indexmap::IndexMap;
use num_bigint::{BigInt, Sign};
use num_traits::{One, ToPrimitive, Zero};

use crate::ast::{Arena, Flags, Loc, NodeId, NodeKind, MAX_EXPR_DEPTH, MAX_TYPE_EXPR_DEPTH};
use crate::error::{CheckError, ErrorKind, Result};
use crate::token::{Key, Map, TokenFlags, ID};

/// Per-function state, alive while one function body is being checked.
struct FuncState {
    /// The `Func` node being checked.
    func: NodeId,
    /// Declared explicit types of locals and parameters, including the
    /// implicit `in` and `out` parameter structs.
    local_vars: IndexMap<ID, NodeId>,
}

/// Walks a file's declarations and annotates the AST.
///
/// The struct registry spans the whole file and is completed before any
/// function body is checked, so structs and funcs may forward-reference
/// each other freely.
pub struct Checker<'a> {
    tm: &'a Map,
    arena: &'a mut Arena,
    structs: IndexMap<ID, NodeId>,
    func: Option<FuncState>,
    /// Enclosing `While` nodes, innermost last. Pushed around each while
    /// body and popped on every exit path, error included.
    jump_targets: Vec<NodeId>,
    /// Location of the construct currently being checked; decorates
    /// every error.
    err_loc: Loc,
}

impl<'a> Checker<'a> {
    pub fn new(tm: &'a Map, arena: &'a mut Arena) -> Self {
        Checker {
            tm,
            arena,
            structs: IndexMap::new(),
            func: None,
            jump_targets: Vec::new(),
            err_loc: Loc::default(),
        }
    }

    /// The structs registered so far, by name.
    pub fn structs(&self) -> &IndexMap<ID, NodeId> {
        &self.structs
    }

    fn fail(&self, kind: ErrorKind) -> CheckError {
        CheckError::new(kind, self.err_loc.file.clone(), self.err_loc.line)
    }

    fn set_err_loc(&mut self, id: NodeId) {
        self.err_loc = self.arena.node(id).loc().clone();
    }

    // ==== Declarations ====

    pub fn check_file(&mut self, file: NodeId) -> Result<()> {
        self.set_err_loc(file);
        let decls = match self.arena.node(file).kind() {
            NodeKind::File { decls } => decls.clone(),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a file",
                }));
            }
        };

        // Structs first: the registry must be complete before any
        // function body is checked.
        for &decl in &decls {
            match self.arena.node(decl).kind() {
                NodeKind::Use { .. } => {
                    // Resolution of the used package is deferred.
                    self.set_err_loc(decl);
                    self.arena.set_type_checked(decl);
                }
                NodeKind::Struct { .. } => self.check_struct(decl)?,
                _ => {}
            }
        }
        for &decl in &decls {
            match self.arena.node(decl).kind() {
                NodeKind::Use { .. } | NodeKind::Struct { .. } => {}
                NodeKind::Func { .. } => self.check_func(decl)?,
                k => {
                    let kind = k.name();
                    return Err(self.fail(ErrorKind::UnrecognizedKind {
                        kind,
                        context: "a top-level declaration",
                    }));
                }
            }
        }
        self.arena.set_type_checked(file);
        Ok(())
    }

    fn check_struct(&mut self, id: NodeId) -> Result<()> {
        self.set_err_loc(id);
        let (name, fields) = match self.arena.node(id).kind() {
            NodeKind::Struct { name, fields } => (*name, fields.clone()),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a struct declaration",
                }));
            }
        };
        if self.structs.contains_key(&name) {
            return Err(self.fail(ErrorKind::DuplicateStruct {
                name: name.str(self.tm).to_string(),
            }));
        }
        for &field in &fields {
            self.check_field(field)?;
        }
        self.structs.insert(name, id);
        self.arena.set_type_checked(id);
        Ok(())
    }

    fn check_field(&mut self, id: NodeId) -> Result<()> {
        self.set_err_loc(id);
        let (x_type, default_value) = match self.arena.node(id).kind() {
            NodeKind::Field {
                x_type,
                default_value,
                ..
            } => (*x_type, *default_value),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a struct field",
                }));
            }
        };
        self.check_type_expr(x_type, 0)?;
        if let Some(value) = default_value {
            self.check_expr(value, 0)?;
            // TODO: check that the default is assignable to the field type.
        }
        self.arena.set_type_checked(id);
        Ok(())
    }

    fn check_func(&mut self, id: NodeId) -> Result<()> {
        self.set_err_loc(id);
        let (in_params, out_params, asserts, body) = match self.arena.node(id).kind() {
            NodeKind::Func {
                in_params,
                out_params,
                asserts,
                body,
                ..
            } => (*in_params, *out_params, asserts.clone(), body.clone()),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a func declaration",
                }));
            }
        };

        self.check_param_struct(in_params)?;
        self.check_param_struct(out_params)?;

        // The parameter structs are reachable from expressions as the
        // implicit locals `in` and `out`, typed by bare name.
        let loc = self.arena.node(id).loc().clone();
        let in_type = self.arena.new_type_expr(
            loc.clone(),
            ID::default(),
            ID::from_key(Key::IN),
            None,
            None,
            None,
        );
        let out_type =
            self.arena
                .new_type_expr(loc, ID::default(), ID::from_key(Key::OUT), None, None, None);
        let mut local_vars = IndexMap::new();
        local_vars.insert(ID::from_key(Key::IN), in_type);
        local_vars.insert(ID::from_key(Key::OUT), out_type);
        self.func = Some(FuncState {
            func: id,
            local_vars,
        });

        let result = self.check_func_parts(&asserts, &body);

        self.func = None;
        debug_assert!(self.jump_targets.is_empty());
        self.jump_targets.clear();
        result?;

        self.arena.set_type_checked(id);
        Ok(())
    }

    fn check_param_struct(&mut self, id: NodeId) -> Result<()> {
        let fields = match self.arena.node(id).kind() {
            NodeKind::Struct { fields, .. } => fields.clone(),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a parameter list",
                }));
            }
        };
        for &field in &fields {
            self.check_field(field)?;
        }
        self.arena.set_type_checked(id);
        Ok(())
    }

    fn check_func_parts(&mut self, asserts: &[NodeId], body: &[NodeId]) -> Result<()> {
        // Collect every var declaration up front, so the whole body can
        // reference any local regardless of statement order.
        for &stmt in body {
            self.check_vars(stmt)?;
        }
        for &assert in asserts {
            self.check_assert(assert)?;
            self.arena.set_type_checked(assert);
        }
        for &stmt in body {
            self.check_statement(stmt)?;
        }
        Ok(())
    }

    // ==== Var pre-pass ====

    /// Registers `Var` declarations, descending into statement lists but
    /// not into expression subtrees.
    fn check_vars(&mut self, id: NodeId) -> Result<()> {
        self.set_err_loc(id);
        if let NodeKind::Var { name, x_type, .. } = self.arena.node(id).kind() {
            let (name, x_type) = (*name, *x_type);
            let duplicate = self
                .func
                .as_ref()
                .map_or(false, |f| f.local_vars.contains_key(&name));
            if duplicate {
                return Err(self.fail(ErrorKind::DuplicateVar {
                    name: name.str(self.tm).to_string(),
                }));
            }
            self.check_type_expr(x_type, 0)?;
            if let Some(f) = self.func.as_mut() {
                f.local_vars.insert(name, x_type);
            }
            return Ok(());
        }
        let children: Vec<NodeId> = self
            .arena
            .node(id)
            .sub_lists()
            .iter()
            .flat_map(|list| list.iter().copied())
            .collect();
        for child in children {
            self.check_vars(child)?;
        }
        Ok(())
    }

    // ==== Statements ====

    fn check_statement(&mut self, id: NodeId) -> Result<()> {
        self.set_err_loc(id);
        match self.arena.node(id).kind() {
            NodeKind::Assert { .. } => self.check_assert(id)?,

            NodeKind::Assign { .. } => self.check_assign(id)?,

            // The whole else-if chain is handled, and marked, in one go.
            NodeKind::If { .. } => return self.check_if_chain(id),

            NodeKind::Jump { .. } => self.check_jump(id)?,

            NodeKind::Return { value } => {
                if let Some(value) = *value {
                    self.check_expr(value, 0)?;
                    // TODO: check the value is assignable to the out
                    // parameters of the enclosing func.
                }
            }

            NodeKind::Var { x_type, value, .. } => {
                let (x_type, value) = (*x_type, *value);
                if !self.arena.node(x_type).type_checked() {
                    let type_expr = self.arena.type_str(x_type, self.tm);
                    return Err(self.fail(ErrorKind::InternalUncheckedTypeExpr { type_expr }));
                }
                if let Some(value) = value {
                    self.check_expr(value, 0)?;
                    // TODO: check the value is assignable to the declared
                    // type.
                }
            }

            NodeKind::While { .. } => self.check_while(id)?,

            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a statement",
                }));
            }
        }
        self.arena.set_type_checked(id);
        Ok(())
    }

    fn check_if_chain(&mut self, id: NodeId) -> Result<()> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            let (cond, else_if, body_if_true, body_if_false) = match self.arena.node(n).kind() {
                NodeKind::If {
                    cond,
                    else_if,
                    body_if_true,
                    body_if_false,
                } => (*cond, *else_if, body_if_true.clone(), body_if_false.clone()),
                k => {
                    let kind = k.name();
                    return Err(self.fail(ErrorKind::UnrecognizedKind {
                        kind,
                        context: "an else-if chain",
                    }));
                }
            };
            self.check_expr(cond, 0)?;
            self.require_bool(cond, "if condition")?;
            for &stmt in &body_if_true {
                self.check_statement(stmt)?;
            }
            for &stmt in &body_if_false {
                self.check_statement(stmt)?;
            }
            cur = else_if;
        }

        // Mark in a second pass: a failure in a later clause must leave
        // the earlier clauses unmarked.
        let mut cur = Some(id);
        while let Some(n) = cur {
            self.arena.set_type_checked(n);
            cur = match self.arena.node(n).kind() {
                NodeKind::If { else_if, .. } => *else_if,
                _ => None,
            };
        }
        Ok(())
    }

    fn check_jump(&mut self, id: NodeId) -> Result<()> {
        let (keyword, label) = match self.arena.node(id).kind() {
            NodeKind::Jump { keyword, label, .. } => (*keyword, *label),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a jump",
                }));
            }
        };

        let mut target = None;
        if !label.is_nil() {
            for &w in self.jump_targets.iter().rev() {
                if self.while_label(w) == label {
                    target = Some(w);
                    break;
                }
            }
        } else {
            target = self.jump_targets.last().copied();
        }
        let Some(target) = target else {
            let mut jump = keyword.str(self.tm).to_string();
            if !label.is_nil() {
                jump.push(':');
                jump.push_str(label.str(self.tm));
            }
            return Err(self.fail(ErrorKind::NoJumpTarget { jump }));
        };

        let flag = if keyword.key() == Key::BREAK {
            Flags::HAS_BREAK
        } else {
            Flags::HAS_CONTINUE
        };
        self.arena.set_flags(target, flag);
        self.arena.set_jump_target(id, target);
        Ok(())
    }

    fn check_while(&mut self, id: NodeId) -> Result<()> {
        let (cond, asserts, body) = match self.arena.node(id).kind() {
            NodeKind::While {
                cond,
                asserts,
                body,
                ..
            } => (*cond, asserts.clone(), body.clone()),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a while statement",
                }));
            }
        };
        self.check_expr(cond, 0)?;
        self.require_bool(cond, "while condition")?;
        for &assert in &asserts {
            self.check_assert(assert)?;
            self.arena.set_type_checked(assert);
        }

        // The stack must be restored on every exit path, error included.
        self.jump_targets.push(id);
        let result = self.check_body(&body);
        self.jump_targets.pop();
        result
    }

    fn check_body(&mut self, stmts: &[NodeId]) -> Result<()> {
        for &stmt in stmts {
            self.check_statement(stmt)?;
        }
        Ok(())
    }

    fn while_label(&self, id: NodeId) -> ID {
        match self.arena.node(id).kind() {
            NodeKind::While { label, .. } => *label,
            _ => ID::default(),
        }
    }

    fn check_assert(&mut self, id: NodeId) -> Result<()> {
        let (cond, args) = match self.arena.node(id).kind() {
            NodeKind::Assert { cond, args, .. } => (*cond, args.clone()),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "an assert",
                }));
            }
        };
        self.check_expr(cond, 0)?;
        self.require_bool(cond, "assert condition")?;
        for &arg in &args {
            let value = match self.arena.node(arg).kind() {
                NodeKind::Arg { value, .. } => *value,
                k => {
                    let kind = k.name();
                    return Err(self.fail(ErrorKind::UnrecognizedKind {
                        kind,
                        context: "an assert reason argument",
                    }));
                }
            };
            self.check_expr(value, 0)?;
            self.arena.set_type_checked(arg);
        }
        // TODO: check that the reason arguments have no side effects.
        Ok(())
    }

    // ==== Assignment ====

    fn check_assign(&mut self, id: NodeId) -> Result<()> {
        let (op, lhs, rhs) = match self.arena.node(id).kind() {
            NodeKind::Assign { op, lhs, rhs } => (*op, *lhs, *rhs),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "an assignment",
                }));
            }
        };
        self.check_expr(lhs, 0)?;
        self.check_expr(rhs, 0)?;
        let l_type = self.expr_type(lhs)?;
        let r_type = self.expr_type(rhs)?;

        if op.key() == Key::EQ {
            if (self.arena.type_is_ideal(r_type) && self.arena.type_is_num(l_type))
                || self.arena.type_eq_ignoring_refinements(l_type, r_type)
            {
                return Ok(());
            }
            return Err(self.fail(ErrorKind::NotAssignable {
                lhs: self.arena.expr_str(lhs, self.tm),
                rhs: self.arena.expr_str(rhs, self.tm),
                lhs_type: self.arena.type_str(l_type, self.tm),
                rhs_type: self.arena.type_str(r_type, self.tm),
            }));
        }

        if !self.arena.type_is_num(l_type) {
            return Err(self.fail(ErrorKind::NonNumeric {
                context: format!("assignment {:?} assignee", op.str(self.tm)),
                expr: self.arena.expr_str(lhs, self.tm),
                type_name: self.arena.type_str(l_type, self.tm),
            }));
        }

        // A shift count may have any numeric type, sized or not.
        if matches!(op.key(), Key::SHIFT_L_EQ | Key::SHIFT_R_EQ) {
            if self.arena.type_is_num(r_type) {
                return Ok(());
            }
            return Err(self.fail(ErrorKind::NonNumeric {
                context: format!("assignment {:?} shift count", op.str(self.tm)),
                expr: self.arena.expr_str(rhs, self.tm),
                type_name: self.arena.type_str(r_type, self.tm),
            }));
        }

        if self.arena.type_is_ideal(r_type)
            || self.arena.type_eq_ignoring_refinements(l_type, r_type)
        {
            return Ok(());
        }
        Err(self.fail(ErrorKind::IncompatibleTypes {
            context: format!("assignment {:?}", op.str(self.tm)),
            lhs: self.arena.expr_str(lhs, self.tm),
            rhs: self.arena.expr_str(rhs, self.tm),
            lhs_type: self.arena.type_str(l_type, self.tm),
            rhs_type: self.arena.type_str(r_type, self.tm),
        }))
    }

    // ==== Expressions ====

    fn expr_parts(
        &self,
        id: NodeId,
    ) -> Result<(ID, ID, Option<NodeId>, Option<NodeId>, Option<NodeId>, Vec<NodeId>)> {
        match self.arena.node(id).kind() {
            NodeKind::Expr {
                op,
                name,
                lhs,
                mhs,
                rhs,
                args,
            } => Ok((*op, *name, *lhs, *mhs, *rhs, args.clone())),
            k => {
                let kind = k.name();
                Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "an expression",
                }))
            }
        }
    }

    /// The implicit type of an already-checked expression.
    fn expr_type(&self, id: NodeId) -> Result<NodeId> {
        self.arena
            .node(id)
            .m_type()
            .ok_or_else(|| self.fail(ErrorKind::Internal("expression checked but has no type")))
    }

    fn check_expr(&mut self, id: NodeId, depth: u32) -> Result<()> {
        if depth > MAX_EXPR_DEPTH {
            return Err(self.fail(ErrorKind::ExprTooDeep));
        }
        let depth = depth + 1;

        let (op, ..) = self.expr_parts(id)?;
        let category = op.flags()
            & (TokenFlags::UNARY_OP | TokenFlags::BINARY_OP | TokenFlags::ASSOCIATIVE_OP);
        if category.is_empty() {
            self.check_expr_other(id, depth)?;
        } else if category == TokenFlags::UNARY_OP {
            self.check_expr_unary_op(id, depth)?;
        } else if category == TokenFlags::BINARY_OP {
            self.check_expr_binary_op(id, depth)?;
        } else if category == TokenFlags::ASSOCIATIVE_OP {
            self.check_expr_associative_op(id, depth)?;
        } else {
            return Err(self.fail(ErrorKind::UnrecognizedOperator {
                expr: self.arena.expr_str(id, self.tm),
            }));
        }
        self.arena.set_type_checked(id);
        Ok(())
    }

    fn check_expr_other(&mut self, id: NodeId, depth: u32) -> Result<()> {
        let (op, name, lhs, _, _, args) = self.expr_parts(id)?;

        if op.is_nil() {
            if name.is_num_literal() {
                let s = name.str(self.tm);
                let Some(value) = parse_numeric_literal(s) else {
                    return Err(self.fail(ErrorKind::InvalidNumericLiteral {
                        literal: s.to_string(),
                    }));
                };
                let ideal = self.arena.ideal_type();
                self.arena.set_const_value(id, value);
                self.arena.set_m_type(id, ideal);
                return Ok(());
            }
            if name.is_ident() {
                if let Some(f) = &self.func {
                    if let Some(&x_type) = f.local_vars.get(&name) {
                        self.arena.set_m_type(id, x_type);
                        return Ok(());
                    }
                }
                // TODO: look for global names: constants, funcs, structs.
                return Err(self.fail(ErrorKind::UnknownIdent {
                    name: name.str(self.tm).to_string(),
                }));
            }
            match name.key() {
                Key::FALSE => {
                    let bool_type = self.arena.bool_type();
                    self.arena.set_const_value(id, BigInt::zero());
                    self.arena.set_m_type(id, bool_type);
                    return Ok(());
                }
                Key::TRUE => {
                    let bool_type = self.arena.bool_type();
                    self.arena.set_const_value(id, BigInt::one());
                    self.arena.set_m_type(id, bool_type);
                    return Ok(());
                }
                Key::UNDERSCORE => {
                    return Err(self.fail(ErrorKind::Unimplemented {
                        what: "the _ expression",
                    }));
                }
                Key::THIS => {
                    return Err(self.fail(ErrorKind::Unimplemented {
                        what: "the this expression",
                    }));
                }
                _ => {}
            }
        } else {
            match op.key() {
                Key::OPEN_PAREN => return self.check_call(id, lhs, &args, depth),
                Key::OPEN_BRACKET => {
                    return Err(self.fail(ErrorKind::Unimplemented {
                        what: "index expressions",
                    }));
                }
                Key::COLON => {
                    return Err(self.fail(ErrorKind::Unimplemented {
                        what: "slice expressions",
                    }));
                }
                Key::DOT => return self.check_dot(id, depth),
                _ => {}
            }
        }
        Err(self.fail(ErrorKind::UnrecognizedExprForm {
            expr: self.arena.expr_str(id, self.tm),
        }))
    }

    fn check_call(
        &mut self,
        id: NodeId,
        callee: Option<NodeId>,
        args: &[NodeId],
        depth: u32,
    ) -> Result<()> {
        let Some(callee) = callee else {
            return Err(self.fail(ErrorKind::Internal("call expression without a callee")));
        };
        let call_flags = self.arena.node(id).flags();

        // Only two call shapes resolve so far.
        // TODO: general call resolution against declared func signatures.

        // The suspendible byte read `in.src.read_u8?()` yields a byte.
        if self.is_in_src_read_u8(callee)
            && call_flags.contains(Flags::SUSPENDIBLE)
            && args.is_empty()
        {
            self.check_expr(callee, depth)?;
            let u8_type = self.arena.u8_type();
            self.arena.set_m_type(id, u8_type);
            return Ok(());
        }

        // The pure `receiver.low_bits(n:k)` yields the receiver's type.
        // The selector itself is typed as a byte until type expressions
        // can describe func types.
        if self.is_low_bits(callee) && !call_flags.contains(Flags::IMPURE) && args.len() == 1 {
            let receiver = match self.arena.node(callee).kind() {
                NodeKind::Expr { lhs: Some(lhs), .. } => *lhs,
                _ => {
                    return Err(self.fail(ErrorKind::Internal("selector without a receiver")));
                }
            };
            self.check_expr(receiver, depth)?;
            let u8_type = self.arena.u8_type();
            self.arena.set_type_checked(callee);
            self.arena.set_m_type(callee, u8_type);
            for &arg in args {
                self.check_arg(arg, depth)?;
            }
            let receiver_type = self.expr_type(receiver)?;
            self.arena.set_m_type(id, receiver_type);
            return Ok(());
        }

        Err(self.fail(ErrorKind::Unimplemented {
            what: "general function call resolution",
        }))
    }

    /// Matches the shape `in.src.read_u8`, outermost selector first.
    fn is_in_src_read_u8(&self, expr: NodeId) -> bool {
        let NodeKind::Expr {
            op,
            name,
            lhs: Some(lhs),
            ..
        } = self.arena.node(expr).kind()
        else {
            return false;
        };
        if op.key() != Key::DOT || name.key() != Key::READ_U8 {
            return false;
        }
        let lhs = *lhs;
        let NodeKind::Expr {
            op,
            name,
            lhs: Some(lhs),
            ..
        } = self.arena.node(lhs).kind()
        else {
            return false;
        };
        if op.key() != Key::DOT || name.key() != Key::SRC {
            return false;
        }
        let lhs = *lhs;
        matches!(
            self.arena.node(lhs).kind(),
            NodeKind::Expr { op, name, .. } if op.is_nil() && name.key() == Key::IN
        )
    }

    /// Matches the shape `receiver.low_bits`.
    fn is_low_bits(&self, expr: NodeId) -> bool {
        // TODO: also check the argument list is a single `n:...` arg.
        matches!(
            self.arena.node(expr).kind(),
            NodeKind::Expr { op, name, .. }
                if op.key() == Key::DOT && name.key() == Key::LOW_BITS
        )
    }

    fn check_arg(&mut self, id: NodeId, depth: u32) -> Result<()> {
        let value = match self.arena.node(id).kind() {
            NodeKind::Arg { value, .. } => *value,
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a call argument",
                }));
            }
        };
        self.check_expr(value, depth)?;
        self.arena.set_type_checked(id);
        Ok(())
    }

    fn check_dot(&mut self, id: NodeId, depth: u32) -> Result<()> {
        let (_, name, lhs, ..) = self.expr_parts(id)?;
        let Some(lhs) = lhs else {
            return Err(self.fail(ErrorKind::Internal("selector without a receiver")));
        };
        self.check_expr(lhs, depth)?;

        let mut l_type = self.expr_type(lhs)?;
        while self.arena.type_pkg_or_dec(l_type).key() == Key::PTR {
            match self.arena.type_inner(l_type) {
                Some(inner) => l_type = inner,
                None => {
                    return Err(self.fail(ErrorKind::Internal("ptr type without an inner type")));
                }
            }
        }
        if !self.arena.type_pkg_or_dec(l_type).is_nil() {
            // TODO: selectors on package-qualified and array types.
            return Err(self.fail(ErrorKind::UnsupportedDecoratorForDot {
                expr: self.arena.expr_str(id, self.tm),
            }));
        }

        let type_name = self.arena.type_name(l_type);
        let mut target = None;
        if let Some(f) = &self.func {
            match type_name.key() {
                Key::IN | Key::OUT => {
                    target = match self.arena.node(f.func).kind() {
                        NodeKind::Func {
                            in_params,
                            out_params,
                            ..
                        } => Some(if type_name.key() == Key::IN {
                            *in_params
                        } else {
                            *out_params
                        }),
                        _ => None,
                    };
                }
                Key::BUF1 => {
                    // A buf1 read yields bytes. Stands in until type
                    // expressions can describe the buffer methods.
                    let u8_type = self.arena.u8_type();
                    self.arena.set_m_type(id, u8_type);
                    return Ok(());
                }
                _ => target = self.structs.get(&type_name).copied(),
            }
        }
        let Some(target) = target else {
            return Err(self.fail(ErrorKind::NoSuchStruct {
                type_name: type_name.str(self.tm).to_string(),
                expr: self.arena.expr_str(lhs, self.tm),
            }));
        };

        let fields = match self.arena.node(target).kind() {
            NodeKind::Struct { fields, .. } => fields.clone(),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a struct",
                }));
            }
        };
        for &field in &fields {
            if let NodeKind::Field {
                name: field_name,
                x_type,
                ..
            } = self.arena.node(field).kind()
            {
                if *field_name == name {
                    let x_type = *x_type;
                    self.arena.set_m_type(id, x_type);
                    return Ok(());
                }
            }
        }
        Err(self.fail(ErrorKind::NoSuchField {
            field: name.str(self.tm).to_string(),
            struct_name: type_name.str(self.tm).to_string(),
            expr: self.arena.expr_str(id, self.tm),
        }))
    }

    fn check_expr_unary_op(&mut self, id: NodeId, depth: u32) -> Result<()> {
        let (op, _, _, _, rhs, _) = self.expr_parts(id)?;
        let Some(rhs) = rhs else {
            return Err(self.fail(ErrorKind::Internal("unary operator without an operand")));
        };
        self.check_expr(rhs, depth)?;
        let r_type = self.expr_type(rhs)?;

        match op.key() {
            Key::X_UNARY_PLUS | Key::X_UNARY_MINUS => {
                if !self.arena.type_is_numeric(r_type) {
                    return Err(self.fail(ErrorKind::NonNumeric {
                        context: format!("unary {:?} operand", op.ambiguous_form().str(self.tm)),
                        expr: self.arena.expr_str(rhs, self.tm),
                        type_name: self.arena.type_str(r_type, self.tm),
                    }));
                }
                let cv = self.arena.node(rhs).const_value().cloned();
                if let Some(cv) = cv {
                    let cv = if op.key() == Key::X_UNARY_MINUS { -cv } else { cv };
                    self.arena.set_const_value(id, cv);
                }
                self.arena.set_m_type(id, r_type);
                Ok(())
            }
            Key::X_UNARY_NOT => {
                if !self.arena.type_is_bool(r_type) {
                    return Err(self.fail(ErrorKind::NotBoolean {
                        context: format!("unary {:?} operand", op.ambiguous_form().str(self.tm)),
                        expr: self.arena.expr_str(rhs, self.tm),
                        type_name: self.arena.type_str(r_type, self.tm),
                    }));
                }
                let cv = self.arena.node(rhs).const_value().cloned();
                if let Some(cv) = cv {
                    self.arena.set_const_value(id, btoi(cv.is_zero()));
                }
                let bool_type = self.arena.bool_type();
                self.arena.set_m_type(id, bool_type);
                Ok(())
            }
            _ => Err(self.fail(ErrorKind::UnrecognizedOperator {
                expr: self.arena.expr_str(id, self.tm),
            })),
        }
    }

    fn check_expr_binary_op(&mut self, id: NodeId, depth: u32) -> Result<()> {
        let (op, _, lhs, _, rhs, _) = self.expr_parts(id)?;
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return Err(self.fail(ErrorKind::Internal("binary operator without two operands")));
        };
        self.check_expr(lhs, depth)?;
        let l_type = self.expr_type(lhs)?;

        // For a cast the right side is a type expression, not an operand.
        if op.key() == Key::X_BINARY_AS {
            self.check_type_expr(rhs, 0)?;
            if self.arena.type_is_numeric(l_type) && self.arena.type_is_num(rhs) {
                self.arena.set_m_type(id, rhs);
                return Ok(());
            }
            return Err(self.fail(ErrorKind::CannotConvert {
                expr: self.arena.expr_str(lhs, self.tm),
                from: self.arena.type_str(l_type, self.tm),
                to: self.arena.type_str(rhs, self.tm),
            }));
        }

        self.check_expr(rhs, depth)?;
        let r_type = self.expr_type(rhs)?;

        match op.key() {
            // Equality has no category restriction.
            Key::X_BINARY_NOT_EQ | Key::X_BINARY_EQ_EQ => {}
            Key::X_BINARY_AND | Key::X_BINARY_OR => {
                self.require_bool_operand(op, lhs, l_type)?;
                self.require_bool_operand(op, rhs, r_type)?;
            }
            _ => {
                self.require_numeric_operand(op, lhs, l_type)?;
                self.require_numeric_operand(op, rhs, r_type)?;
            }
        }

        match op.key() {
            Key::X_BINARY_SHIFT_L | Key::X_BINARY_SHIFT_R => {
                // An ideal shiftee with a sized count has no type to
                // give the result.
                if self.arena.type_is_ideal(l_type) && !self.arena.type_is_ideal(r_type) {
                    return Err(self.fail(ErrorKind::IdealShift {
                        lhs: self.arena.expr_str(lhs, self.tm),
                        rhs: self.arena.expr_str(rhs, self.tm),
                    }));
                }
            }
            _ => {
                if !self.arena.type_eq_ignoring_refinements(l_type, r_type)
                    && !self.arena.type_is_ideal(l_type)
                    && !self.arena.type_is_ideal(r_type)
                {
                    return Err(self.fail(ErrorKind::IncompatibleTypes {
                        context: format!("binary {:?}", op.ambiguous_form().str(self.tm)),
                        lhs: self.arena.expr_str(lhs, self.tm),
                        rhs: self.arena.expr_str(rhs, self.tm),
                        lhs_type: self.arena.type_str(l_type, self.tm),
                        rhs_type: self.arena.type_str(r_type, self.tm),
                    }));
                }
            }
        }

        let l_value = self.arena.node(lhs).const_value().cloned();
        let r_value = self.arena.node(rhs).const_value().cloned();
        if let (Some(l), Some(r)) = (l_value, r_value) {
            self.fold_binary_op(id, op, rhs, l, r)?;
        }

        if is_comparison(op.key()) {
            let bool_type = self.arena.bool_type();
            self.arena.set_m_type(id, bool_type);
        } else if !self.arena.type_is_ideal(l_type) {
            self.arena.set_m_type(id, l_type);
        } else {
            self.arena.set_m_type(id, r_type);
        }
        Ok(())
    }

    fn fold_binary_op(
        &mut self,
        id: NodeId,
        op: ID,
        rhs: NodeId,
        l: BigInt,
        r: BigInt,
    ) -> Result<()> {
        let value = match op.key() {
            Key::X_BINARY_PLUS => l + r,
            Key::X_BINARY_MINUS => l - r,
            Key::X_BINARY_STAR => l * r,
            Key::X_BINARY_SLASH => {
                if r.is_zero() {
                    return Err(self.fail(ErrorKind::DivByZero {
                        expr: self.arena.expr_str(id, self.tm),
                    }));
                }
                // Truncated toward zero. Whether refinement arithmetic
                // wants Euclidean division instead is still open.
                l / r
            }
            Key::X_BINARY_SHIFT_L | Key::X_BINARY_SHIFT_R => {
                if r.sign() == Sign::Minus || r > BigInt::from(0xFFFF) {
                    return Err(self.fail(ErrorKind::ShiftOutOfRange {
                        shift: self.arena.expr_str(rhs, self.tm),
                        expr: self.arena.expr_str(id, self.tm),
                    }));
                }
                let count = r.to_u64().unwrap_or(0) as usize;
                if op.key() == Key::X_BINARY_SHIFT_L {
                    l << count
                } else {
                    l >> count
                }
            }
            Key::X_BINARY_AMP => l & r,
            Key::X_BINARY_AMP_HAT => l & !r,
            Key::X_BINARY_PIPE => l | r,
            Key::X_BINARY_HAT => l ^ r,
            Key::X_BINARY_NOT_EQ => btoi(l != r),
            Key::X_BINARY_LESS_THAN => btoi(l < r),
            Key::X_BINARY_LESS_EQ => btoi(l <= r),
            Key::X_BINARY_EQ_EQ => btoi(l == r),
            Key::X_BINARY_GREATER_EQ => btoi(l >= r),
            Key::X_BINARY_GREATER_THAN => btoi(l > r),
            Key::X_BINARY_AND => btoi(!l.is_zero() && !r.is_zero()),
            Key::X_BINARY_OR => btoi(!l.is_zero() || !r.is_zero()),
            _ => return Ok(()),
        };
        self.arena.set_const_value(id, value);
        Ok(())
    }

    fn check_expr_associative_op(&mut self, _id: NodeId, _depth: u32) -> Result<()> {
        Err(self.fail(ErrorKind::Unimplemented {
            what: "associative operators",
        }))
    }

    // ==== Type expressions ====

    fn check_type_expr(&mut self, id: NodeId, depth: u32) -> Result<()> {
        if depth > MAX_TYPE_EXPR_DEPTH {
            return Err(self.fail(ErrorKind::TypeExprTooDeep));
        }
        let depth = depth + 1;

        let (pkg_or_dec, name, min_or_len, max, inner) = match self.arena.node(id).kind() {
            NodeKind::TypeExpr {
                pkg_or_dec,
                name,
                min_or_len,
                max,
                inner,
            } => (*pkg_or_dec, *name, *min_or_len, *max, *inner),
            k => {
                let kind = k.name();
                return Err(self.fail(ErrorKind::UnrecognizedKind {
                    kind,
                    context: "a type expression",
                }));
            }
        };

        if pkg_or_dec.is_nil() {
            if name.key() == Key::IDEAL {
                // The literal pseudo-type is the checker's own; user type
                // syntax cannot name it.
                return Err(self.fail(ErrorKind::NotAType {
                    name: name.str(self.tm).to_string(),
                }));
            }
            if name.is_num_type() {
                for bound in [min_or_len, max].into_iter().flatten() {
                    self.check_expr(bound, 0)?;
                    if self.arena.node(bound).const_value().is_none() {
                        return Err(self.fail(ErrorKind::NotConstant {
                            expr: self.arena.expr_str(bound, self.tm),
                        }));
                    }
                }
            } else {
                match name.key() {
                    Key::BOOL | Key::BUF1 => {}
                    // TODO: see if the name refers to a registered struct
                    // type.
                    _ => {
                        return Err(self.fail(ErrorKind::NotAType {
                            name: name.str(self.tm).to_string(),
                        }));
                    }
                }
            }
        } else {
            match pkg_or_dec.key() {
                Key::PTR => {
                    let Some(inner) = inner else {
                        return Err(
                            self.fail(ErrorKind::Internal("ptr type without an inner type"))
                        );
                    };
                    self.check_type_expr(inner, depth)?;
                }
                Key::OPEN_BRACKET => {
                    let Some(len) = min_or_len else {
                        return Err(self.fail(ErrorKind::Internal("array type without a length")));
                    };
                    self.check_expr(len, 0)?;
                    if self.arena.node(len).const_value().is_none() {
                        return Err(self.fail(ErrorKind::NotConstant {
                            expr: self.arena.expr_str(len, self.tm),
                        }));
                    }
                    let Some(inner) = inner else {
                        return Err(
                            self.fail(ErrorKind::Internal("array type without an element type"))
                        );
                    };
                    self.check_type_expr(inner, depth)?;
                }
                _ => {
                    // TODO: package-qualified type names.
                    return Err(self.fail(ErrorKind::UnrecognizedTypeExpr {
                        type_expr: self.arena.type_str(id, self.tm),
                    }));
                }
            }
        }
        self.arena.set_type_checked(id);
        Ok(())
    }

    // ==== Shared checks ====

    fn require_bool(&self, expr: NodeId, context: &str) -> Result<()> {
        let m_type = self.expr_type(expr)?;
        if self.arena.type_is_bool(m_type) {
            return Ok(());
        }
        Err(self.fail(ErrorKind::NotBoolean {
            context: context.to_string(),
            expr: self.arena.expr_str(expr, self.tm),
            type_name: self.arena.type_str(m_type, self.tm),
        }))
    }

    fn require_bool_operand(&self, op: ID, operand: NodeId, m_type: NodeId) -> Result<()> {
        if self.arena.type_is_bool(m_type) {
            return Ok(());
        }
        Err(self.fail(ErrorKind::NotBoolean {
            context: format!("binary {:?} operand", op.ambiguous_form().str(self.tm)),
            expr: self.arena.expr_str(operand, self.tm),
            type_name: self.arena.type_str(m_type, self.tm),
        }))
    }

    fn require_numeric_operand(&self, op: ID, operand: NodeId, m_type: NodeId) -> Result<()> {
        if self.arena.type_is_numeric(m_type) {
            return Ok(());
        }
        Err(self.fail(ErrorKind::NonNumeric {
            context: format!("binary {:?} operand", op.ambiguous_form().str(self.tm)),
            expr: self.arena.expr_str(operand, self.tm),
            type_name: self.arena.type_str(m_type, self.tm),
        }))
    }
}

fn is_comparison(key: Key) -> bool {
    matches!(
        key,
        Key::X_BINARY_NOT_EQ
            | Key::X_BINARY_LESS_THAN
            | Key::X_BINARY_LESS_EQ
            | Key::X_BINARY_EQ_EQ
            | Key::X_BINARY_GREATER_EQ
            | Key::X_BINARY_GREATER_THAN
    )
}

fn btoi(b: bool) -> BigInt {
    BigInt::from(u8::from(b))
}

/// Parses a numeric literal with the usual base prefixes: `0x` hex, `0b`
/// binary, `0o` or a bare leading zero octal, decimal otherwise.
fn parse_numeric_literal(s: &str) -> Option<BigInt> {
    let b = s.as_bytes();
    if b.is_empty() {
        return None;
    }
    if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return BigInt::parse_bytes(rest.as_bytes(), 16);
    }
    if let Some(rest) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        return BigInt::parse_bytes(rest.as_bytes(), 2);
    }
    if let Some(rest) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        return BigInt::parse_bytes(rest.as_bytes(), 8);
    }
    if b[0] == b'0' && b.len() > 1 {
        return BigInt::parse_bytes(&b[1..], 8);
    }
    BigInt::parse_bytes(b, 10)
}
