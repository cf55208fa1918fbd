//! AST for the rill front-end.
//!
//! Every node lives in an [`Arena`] owned by the enclosing compilation
//! unit and is addressed by a [`NodeId`] handle. The per-kind payloads are
//! a tagged sum ([`NodeKind`]) so slot patterns are compiler-enforced,
//! while [`Node::sub_nodes`] / [`Node::sub_lists`] project every variant
//! onto the same canonical slot layout so generic traversal can be
//! written once.
//!
//! Nodes are structurally immutable after construction. The type checker
//! only annotates them: the implicit type `m_type`, the folded
//! `const_value`, the `TYPE_CHECKED` flag (monotonic, never cleared), and
//! the non-owning jump-target back-reference on `Jump` nodes.
//!
//! XType is the explicit type written in source (a child slot of `Var`
//! and `Field`); `m_type` is the implicit type deduced for expressions
//! during checking.

use std::sync::Arc;

use bitflags::bitflags;
use num_bigint::BigInt;

use crate::token::{Key, Map, ID};

/// Advisory limit for an expression's recursion depth.
pub const MAX_EXPR_DEPTH: u32 = 255;

/// Advisory limit for a type expression's recursion depth.
pub const MAX_TYPE_EXPR_DEPTH: u32 = 63;

/// Advisory limit for a function body's recursion depth.
pub const MAX_BODY_DEPTH: u32 = 255;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// `f!(x)`: the call or func may have side effects.
        const IMPURE       = 1 << 0;
        /// `f?(x)`: the call or func may suspend. Implies `IMPURE`.
        const SUSPENDIBLE  = 1 << 1;
        /// `pub` vs `pri`.
        const PUBLIC       = 1 << 2;
        /// Set by the checker once a node has checked without error.
        const TYPE_CHECKED = 1 << 3;
        /// Set on a `While` that is the target of a `break`.
        const HAS_BREAK    = 1 << 4;
        /// Set on a `While` that is the target of a `continue`.
        const HAS_CONTINUE = 1 << 5;
    }
}

/// Handle to a node in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Source location, for diagnostics only.
#[derive(Debug, Clone)]
pub struct Loc {
    pub file: Arc<str>,
    pub line: u32,
}

impl Loc {
    pub fn new(file: Arc<str>, line: u32) -> Self {
        Self { file, line }
    }
}

impl Default for Loc {
    fn default() -> Self {
        Self {
            file: Arc::from(""),
            line: 0,
        }
    }
}

#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    flags: Flags,
    const_value: Option<BigInt>,
    m_type: Option<NodeId>,
    loc: Loc,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn type_checked(&self) -> bool {
        self.flags.contains(Flags::TYPE_CHECKED)
    }

    pub fn const_value(&self) -> Option<&BigInt> {
        self.const_value.as_ref()
    }

    pub fn m_type(&self) -> Option<NodeId> {
        self.m_type
    }

    pub fn loc(&self) -> &Loc {
        &self.loc
    }

    /// The canonical `(lhs, mhs, rhs)` child slots of this node.
    pub fn sub_nodes(&self) -> [Option<NodeId>; 3] {
        match &self.kind {
            NodeKind::Invalid | NodeKind::File { .. } | NodeKind::Use { .. } => [None; 3],
            NodeKind::Struct { .. } | NodeKind::Jump { .. } => [None; 3],
            NodeKind::Func {
                in_params,
                out_params,
                ..
            } => [Some(*in_params), None, Some(*out_params)],
            NodeKind::Field {
                x_type,
                default_value,
                ..
            } => [Some(*x_type), None, *default_value],
            NodeKind::Var { x_type, value, .. } => [Some(*x_type), None, *value],
            NodeKind::Arg { value, .. } => [None, None, Some(*value)],
            NodeKind::TypeExpr {
                min_or_len,
                max,
                inner,
                ..
            } => [*min_or_len, *max, *inner],
            NodeKind::Expr { lhs, mhs, rhs, .. } => [*lhs, *mhs, *rhs],
            NodeKind::Assign { lhs, rhs, .. } => [Some(*lhs), None, Some(*rhs)],
            NodeKind::If { cond, else_if, .. } => [Some(*cond), None, *else_if],
            NodeKind::While { cond, .. } => [Some(*cond), None, None],
            NodeKind::Return { value } => [*value, None, None],
            NodeKind::Assert { cond, .. } => [None, None, Some(*cond)],
        }
    }

    /// The canonical `(list0, list1)` child lists of this node.
    pub fn sub_lists(&self) -> [&[NodeId]; 2] {
        match &self.kind {
            NodeKind::File { decls } => [decls, &[]],
            NodeKind::Struct { fields, .. } => [fields, &[]],
            NodeKind::Func { asserts, body, .. } => [asserts, body],
            NodeKind::Expr { args, .. } => [args, &[]],
            NodeKind::If {
                body_if_true,
                body_if_false,
                ..
            } => [body_if_true, body_if_false],
            NodeKind::While { asserts, body, .. } => [asserts, body],
            NodeKind::Assert { args, .. } => [args, &[]],
            _ => [&[], &[]],
        }
    }
}

/// Per-kind payloads. Field roles follow the uniform slot table: `lhs`,
/// `mhs`, `rhs` child slots and `list0`, `list1` child lists, named here
/// by what they hold.
#[derive(Debug)]
pub enum NodeKind {
    Invalid,

    /// A file of source code.
    File { decls: Vec<NodeId> },

    /// `use "path"`.
    Use { path: ID },

    /// `struct name(fields)`.
    Struct { name: ID, fields: Vec<NodeId> },

    /// `func receiver.name(in)(out) { body }`, with optional asserts.
    Func {
        receiver: ID,
        name: ID,
        in_params: NodeId,
        out_params: NodeId,
        asserts: Vec<NodeId>,
        body: Vec<NodeId>,
    },

    /// A `name type = default_value` struct field.
    Field {
        name: ID,
        x_type: NodeId,
        default_value: Option<NodeId>,
    },

    /// `var name type` or `var name type = value`.
    Var {
        name: ID,
        x_type: NodeId,
        value: Option<NodeId>,
    },

    /// A `name:value` call argument.
    Arg { name: ID, value: NodeId },

    /// A type expression such as `u32`, `u32[..4095]`, `pkg.foo`,
    /// `ptr T` or `[8] T`.
    ///
    /// `pkg_or_dec` is nil for a plain named type, a package name for a
    /// qualified one, or the `ptr` / `[` decorator. For `[`,
    /// `min_or_len` is the array length; for a refined named type it is
    /// the minimum bound and `max` the maximum, either possibly absent.
    TypeExpr {
        pkg_or_dec: ID,
        name: ID,
        min_or_len: Option<NodeId>,
        max: Option<NodeId>,
        inner: Option<NodeId>,
    },

    /// An expression. `op` is nil for a leaf (`name` holds an
    /// identifier, literal or keyword), `(` for a call (`lhs` callee,
    /// `args` the `Arg`s), `[` for an index, `:` for a slice, `.` for a
    /// selector (`lhs.name`), or a disambiguated operator: unary with
    /// the operand in `rhs`, binary in `lhs`/`rhs` (`rhs` is a
    /// `TypeExpr` for `as`), associative in `args`.
    Expr {
        op: ID,
        name: ID,
        lhs: Option<NodeId>,
        mhs: Option<NodeId>,
        rhs: Option<NodeId>,
        args: Vec<NodeId>,
    },

    /// `lhs = rhs` or `lhs op= rhs`.
    Assign { op: ID, lhs: NodeId, rhs: NodeId },

    /// `if cond { body_if_true } else ...`: `else_if` chains to the next
    /// `If`, `body_if_false` is the final else block.
    If {
        cond: NodeId,
        else_if: Option<NodeId>,
        body_if_true: Vec<NodeId>,
        body_if_false: Vec<NodeId>,
    },

    /// `while:label cond, asserts { body }`.
    While {
        label: ID,
        cond: NodeId,
        asserts: Vec<NodeId>,
        body: Vec<NodeId>,
    },

    /// `break` or `continue`, with an optional label. `target` is the
    /// back-reference to the enclosing `While`, filled in by the checker.
    Jump {
        keyword: ID,
        label: ID,
        target: Option<NodeId>,
    },

    /// `return` or `return value`.
    Return { value: Option<NodeId> },

    /// `assert cond via "reason"(args)`, or `pre`/`inv`/`post`.
    Assert {
        keyword: ID,
        reason: ID,
        cond: NodeId,
        args: Vec<NodeId>,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Invalid => "Invalid",
            NodeKind::File { .. } => "File",
            NodeKind::Use { .. } => "Use",
            NodeKind::Struct { .. } => "Struct",
            NodeKind::Func { .. } => "Func",
            NodeKind::Field { .. } => "Field",
            NodeKind::Var { .. } => "Var",
            NodeKind::Arg { .. } => "Arg",
            NodeKind::TypeExpr { .. } => "TypeExpr",
            NodeKind::Expr { .. } => "Expr",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::If { .. } => "If",
            NodeKind::While { .. } => "While",
            NodeKind::Jump { .. } => "Jump",
            NodeKind::Return { .. } => "Return",
            NodeKind::Assert { .. } => "Assert",
        }
    }
}

/// Owns every node of a compilation unit. Pre-interns the three type
/// expressions the checker hands out itself: the `ideal` pseudo-type of
/// untyped numeric literals, `bool`, and `u8`.
#[derive(Debug)]
pub struct Arena {
    nodes: Vec<Node>,
    ideal_type: NodeId,
    bool_type: NodeId,
    u8_type: NodeId,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        let mut arena = Arena {
            nodes: Vec::new(),
            ideal_type: NodeId(0),
            bool_type: NodeId(0),
            u8_type: NodeId(0),
        };
        arena.ideal_type = arena.named_type(Key::IDEAL);
        arena.bool_type = arena.named_type(Key::BOOL);
        arena.u8_type = arena.named_type(Key::U8);
        arena
    }

    fn named_type(&mut self, key: Key) -> NodeId {
        self.new_type_expr(Loc::default(), ID::default(), ID::from_key(key), None, None, None)
    }

    /// The pseudo-type of untyped numeric literals.
    pub fn ideal_type(&self) -> NodeId {
        self.ideal_type
    }

    pub fn bool_type(&self) -> NodeId {
        self.bool_type
    }

    pub fn u8_type(&self) -> NodeId {
        self.u8_type
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    fn alloc(&mut self, kind: NodeKind, flags: Flags, loc: Loc) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            flags,
            const_value: None,
            m_type: None,
            loc,
        });
        id
    }

    // ==== Constructors, one per kind ====

    pub fn new_file(&mut self, loc: Loc, decls: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::File { decls }, Flags::empty(), loc)
    }

    pub fn new_use(&mut self, loc: Loc, path: ID) -> NodeId {
        self.alloc(NodeKind::Use { path }, Flags::empty(), loc)
    }

    pub fn new_struct(&mut self, loc: Loc, flags: Flags, name: ID, fields: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Struct { name, fields }, flags, loc)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_func(
        &mut self,
        loc: Loc,
        flags: Flags,
        receiver: ID,
        name: ID,
        in_params: NodeId,
        out_params: NodeId,
        asserts: Vec<NodeId>,
        body: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(
            NodeKind::Func {
                receiver,
                name,
                in_params,
                out_params,
                asserts,
                body,
            },
            flags,
            loc,
        )
    }

    pub fn new_field(
        &mut self,
        loc: Loc,
        name: ID,
        x_type: NodeId,
        default_value: Option<NodeId>,
    ) -> NodeId {
        self.alloc(
            NodeKind::Field {
                name,
                x_type,
                default_value,
            },
            Flags::empty(),
            loc,
        )
    }

    pub fn new_var(&mut self, loc: Loc, name: ID, x_type: NodeId, value: Option<NodeId>) -> NodeId {
        self.alloc(
            NodeKind::Var {
                name,
                x_type,
                value,
            },
            Flags::empty(),
            loc,
        )
    }

    pub fn new_arg(&mut self, loc: Loc, name: ID, value: NodeId) -> NodeId {
        self.alloc(NodeKind::Arg { name, value }, Flags::empty(), loc)
    }

    pub fn new_type_expr(
        &mut self,
        loc: Loc,
        pkg_or_dec: ID,
        name: ID,
        min_or_len: Option<NodeId>,
        max: Option<NodeId>,
        inner: Option<NodeId>,
    ) -> NodeId {
        self.alloc(
            NodeKind::TypeExpr {
                pkg_or_dec,
                name,
                min_or_len,
                max,
                inner,
            },
            Flags::empty(),
            loc,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_expr(
        &mut self,
        loc: Loc,
        flags: Flags,
        op: ID,
        name: ID,
        lhs: Option<NodeId>,
        mhs: Option<NodeId>,
        rhs: Option<NodeId>,
        args: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(
            NodeKind::Expr {
                op,
                name,
                lhs,
                mhs,
                rhs,
                args,
            },
            flags,
            loc,
        )
    }

    pub fn new_assign(&mut self, loc: Loc, op: ID, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.alloc(NodeKind::Assign { op, lhs, rhs }, Flags::empty(), loc)
    }

    pub fn new_if(
        &mut self,
        loc: Loc,
        cond: NodeId,
        else_if: Option<NodeId>,
        body_if_true: Vec<NodeId>,
        body_if_false: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(
            NodeKind::If {
                cond,
                else_if,
                body_if_true,
                body_if_false,
            },
            Flags::empty(),
            loc,
        )
    }

    pub fn new_while(
        &mut self,
        loc: Loc,
        label: ID,
        cond: NodeId,
        asserts: Vec<NodeId>,
        body: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(
            NodeKind::While {
                label,
                cond,
                asserts,
                body,
            },
            Flags::empty(),
            loc,
        )
    }

    pub fn new_jump(&mut self, loc: Loc, keyword: ID, label: ID) -> NodeId {
        self.alloc(
            NodeKind::Jump {
                keyword,
                label,
                target: None,
            },
            Flags::empty(),
            loc,
        )
    }

    pub fn new_return(&mut self, loc: Loc, value: Option<NodeId>) -> NodeId {
        self.alloc(NodeKind::Return { value }, Flags::empty(), loc)
    }

    pub fn new_assert(
        &mut self,
        loc: Loc,
        keyword: ID,
        reason: ID,
        cond: NodeId,
        args: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(
            NodeKind::Assert {
                keyword,
                reason,
                cond,
                args,
            },
            Flags::empty(),
            loc,
        )
    }

    // ==== Traversal ====

    /// Pre-order traversal: visits `id`, then `lhs`, `mhs`, `rhs`, then
    /// each element of `list0` and `list1`. Nil slots are skipped.
    /// Short-circuits on the visitor's first error.
    pub fn walk<E, F>(&self, id: NodeId, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&Arena, NodeId) -> Result<(), E>,
    {
        f(self, id)?;
        for child in self.node(id).sub_nodes().into_iter().flatten() {
            self.walk(child, f)?;
        }
        for i in 0..2 {
            let list = self.node(id).sub_lists()[i];
            for &child in list {
                self.walk(child, f)?;
            }
        }
        Ok(())
    }

    // ==== Annotations (the only mutation after construction) ====

    pub fn set_type_checked(&mut self, id: NodeId) {
        self.node_mut(id).flags |= Flags::TYPE_CHECKED;
    }

    pub fn set_flags(&mut self, id: NodeId, flags: Flags) {
        self.node_mut(id).flags |= flags;
    }

    pub fn set_m_type(&mut self, id: NodeId, m_type: NodeId) {
        self.node_mut(id).m_type = Some(m_type);
    }

    pub fn set_const_value(&mut self, id: NodeId, value: BigInt) {
        self.node_mut(id).const_value = Some(value);
    }

    pub fn set_jump_target(&mut self, id: NodeId, target_id: NodeId) {
        if let NodeKind::Jump { target, .. } = &mut self.node_mut(id).kind {
            *target = Some(target_id);
        } else {
            debug_assert!(false, "set_jump_target on a non-Jump node");
        }
    }

    pub fn jump_target(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id).kind() {
            NodeKind::Jump { target, .. } => *target,
            _ => None,
        }
    }

    // ==== Type-expression predicates ====

    fn as_type_expr(
        &self,
        id: NodeId,
    ) -> Option<(ID, ID, Option<NodeId>, Option<NodeId>, Option<NodeId>)> {
        match self.node(id).kind() {
            NodeKind::TypeExpr {
                pkg_or_dec,
                name,
                min_or_len,
                max,
                inner,
            } => Some((*pkg_or_dec, *name, *min_or_len, *max, *inner)),
            _ => None,
        }
    }

    /// The package or decorator id of a type expression, nil otherwise.
    pub fn type_pkg_or_dec(&self, id: NodeId) -> ID {
        self.as_type_expr(id).map(|t| t.0).unwrap_or_default()
    }

    /// The name id of a type expression, nil otherwise.
    pub fn type_name(&self, id: NodeId) -> ID {
        self.as_type_expr(id).map(|t| t.1).unwrap_or_default()
    }

    /// The inner type of a `ptr` or array type expression.
    pub fn type_inner(&self, id: NodeId) -> Option<NodeId> {
        self.as_type_expr(id).and_then(|t| t.4)
    }

    pub fn type_is_bool(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).kind(),
            NodeKind::TypeExpr {
                pkg_or_dec,
                name,
                min_or_len: None,
                max: None,
                inner: None,
            } if pkg_or_dec.is_nil() && name.key() == Key::BOOL
        )
    }

    pub fn type_is_ideal(&self, id: NodeId) -> bool {
        match self.as_type_expr(id) {
            Some((pkg_or_dec, name, ..)) => pkg_or_dec.is_nil() && name.key() == Key::IDEAL,
            None => false,
        }
    }

    /// An un-decorated named type whose name is a numeric type (the
    /// ideal pseudo-type included).
    pub fn type_is_num(&self, id: NodeId) -> bool {
        match self.as_type_expr(id) {
            Some((pkg_or_dec, name, ..)) => pkg_or_dec.is_nil() && name.is_num_type(),
            None => false,
        }
    }

    pub fn type_is_numeric(&self, id: NodeId) -> bool {
        self.type_is_ideal(id) || self.type_is_num(id)
    }

    /// Whether a named type carries refinement bounds. Array lengths are
    /// not refinements.
    pub fn type_is_refined(&self, id: NodeId) -> bool {
        match self.as_type_expr(id) {
            Some((pkg_or_dec, _, min, max, _)) => {
                pkg_or_dec.key() != Key::OPEN_BRACKET && (min.is_some() || max.is_some())
            }
            None => false,
        }
    }

    pub fn type_eq(&self, a: NodeId, b: NodeId) -> bool {
        self.type_eq_opt(Some(a), Some(b), false)
    }

    pub fn type_eq_ignoring_refinements(&self, a: NodeId, b: NodeId) -> bool {
        self.type_eq_opt(Some(a), Some(b), true)
    }

    fn type_eq_opt(&self, a: Option<NodeId>, b: Option<NodeId>, ignore_refinements: bool) -> bool {
        let (a, b) = match (a, b) {
            (None, None) => return true,
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        if a == b {
            return true;
        }
        let (Some(ta), Some(tb)) = (self.as_type_expr(a), self.as_type_expr(b)) else {
            return false;
        };
        let (a_dec, a_name, a_min, a_max, a_inner) = ta;
        let (b_dec, b_name, b_min, b_max, b_inner) = tb;
        if a_dec != b_dec || a_name != b_name {
            return false;
        }
        if a_dec.key() == Key::OPEN_BRACKET {
            // Array lengths are always significant.
            if !self.bound_eq(a_min, b_min) {
                return false;
            }
        } else if !ignore_refinements
            && !(self.bound_eq(a_min, b_min) && self.bound_eq(a_max, b_max))
        {
            return false;
        }
        self.type_eq_opt(a_inner, b_inner, ignore_refinements)
    }

    /// Bounds and array lengths compare by folded constant value.
    fn bound_eq(&self, a: Option<NodeId>, b: Option<NodeId>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a == b
                    || match (self.node(a).const_value(), self.node(b).const_value()) {
                        (Some(x), Some(y)) => x == y,
                        _ => false,
                    }
            }
            _ => false,
        }
    }

    // ==== Diagnostic rendering ====

    /// Re-prints an expression in surface form, for error messages.
    pub fn expr_str(&self, id: NodeId, tm: &Map) -> String {
        let node = self.node(id);
        match node.kind() {
            NodeKind::Expr {
                op,
                name,
                lhs,
                mhs,
                rhs,
                args,
            } => {
                if op.is_nil() {
                    return name.str(tm).to_string();
                }
                match op.key() {
                    Key::OPEN_PAREN => {
                        let marker = if node.flags().contains(Flags::SUSPENDIBLE) {
                            "?"
                        } else if node.flags().contains(Flags::IMPURE) {
                            "!"
                        } else {
                            ""
                        };
                        let args: Vec<String> =
                            args.iter().map(|&a| self.expr_str(a, tm)).collect();
                        format!(
                            "{}{}({})",
                            self.opt_expr_str(*lhs, tm),
                            marker,
                            args.join(", ")
                        )
                    }
                    Key::OPEN_BRACKET => format!(
                        "{}[{}]",
                        self.opt_expr_str(*lhs, tm),
                        self.opt_expr_str(*rhs, tm)
                    ),
                    Key::COLON => format!(
                        "{}[{}:{}]",
                        self.opt_expr_str(*lhs, tm),
                        self.opt_expr_str(*mhs, tm),
                        self.opt_expr_str(*rhs, tm)
                    ),
                    Key::DOT => format!("{}.{}", self.opt_expr_str(*lhs, tm), name.str(tm)),
                    _ if op.is_unary_op() => {
                        let op_str = op.ambiguous_form().str(tm);
                        let sep = if op_str.ends_with(char::is_alphanumeric) {
                            " "
                        } else {
                            ""
                        };
                        format!("{}{}{}", op_str, sep, self.opt_expr_str(*rhs, tm))
                    }
                    _ if op.is_binary_op() => {
                        let rhs_str = if op.key() == Key::X_BINARY_AS {
                            self.opt_type_str(*rhs, tm)
                        } else {
                            self.opt_expr_str(*rhs, tm)
                        };
                        format!(
                            "{} {} {}",
                            self.opt_expr_str(*lhs, tm),
                            op.ambiguous_form().str(tm),
                            rhs_str
                        )
                    }
                    _ if op.is_associative_op() => {
                        let parts: Vec<String> =
                            args.iter().map(|&a| self.expr_str(a, tm)).collect();
                        parts.join(&format!(" {} ", op.ambiguous_form().str(tm)))
                    }
                    _ => String::new(),
                }
            }
            NodeKind::Arg { name, value } => {
                format!("{}:{}", name.str(tm), self.expr_str(*value, tm))
            }
            NodeKind::TypeExpr { .. } => self.type_str(id, tm),
            _ => String::new(),
        }
    }

    fn opt_expr_str(&self, id: Option<NodeId>, tm: &Map) -> String {
        id.map(|id| self.expr_str(id, tm)).unwrap_or_default()
    }

    /// Re-prints a type expression in surface form, for error messages.
    pub fn type_str(&self, id: NodeId, tm: &Map) -> String {
        let Some((pkg_or_dec, name, min_or_len, max, inner)) = self.as_type_expr(id) else {
            return String::new();
        };
        match pkg_or_dec.key() {
            Key::PTR => format!("ptr {}", self.opt_type_str(inner, tm)),
            Key::OPEN_BRACKET => format!(
                "[{}] {}",
                self.opt_expr_str(min_or_len, tm),
                self.opt_type_str(inner, tm)
            ),
            _ => {
                let mut s = String::new();
                if !pkg_or_dec.is_nil() {
                    s.push_str(pkg_or_dec.str(tm));
                    s.push('.');
                }
                s.push_str(name.str(tm));
                if min_or_len.is_some() || max.is_some() {
                    s.push('[');
                    s.push_str(&self.opt_expr_str(min_or_len, tm));
                    s.push_str("..");
                    s.push_str(&self.opt_expr_str(max, tm));
                    s.push(']');
                }
                s
            }
        }
    }

    fn opt_type_str(&self, id: Option<NodeId>, tm: &Map) -> String {
        id.map(|id| self.type_str(id, tm)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut Arena, id: ID) -> NodeId {
        arena.new_expr(
            Loc::default(),
            Flags::empty(),
            ID::default(),
            id,
            None,
            None,
            None,
            vec![],
        )
    }

    #[test]
    fn constructors_clear_type_checked() {
        let mut arena = Arena::new();
        let mut tm = Map::new();
        let x = tm.insert("x").unwrap();
        let n = leaf(&mut arena, x);
        assert!(!arena.node(n).type_checked());
        assert!(arena.node(n).m_type().is_none());
        assert!(arena.node(n).const_value().is_none());
    }

    #[test]
    fn walk_is_preorder_slots_before_lists() {
        let mut arena = Arena::new();
        let mut tm = Map::new();
        let t = tm.insert("true").unwrap();
        let cond = leaf(&mut arena, t);
        let body_stmt = {
            let v = tm.insert("42").unwrap();
            leaf(&mut arena, v)
        };
        let w = arena.new_while(Loc::default(), ID::default(), cond, vec![], vec![body_stmt]);

        let mut visited = Vec::new();
        arena
            .walk::<(), _>(w, &mut |_, id| {
                visited.push(id);
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, vec![w, cond, body_stmt]);
    }

    #[test]
    fn walk_short_circuits() {
        let mut arena = Arena::new();
        let mut tm = Map::new();
        let t = tm.insert("true").unwrap();
        let cond = leaf(&mut arena, t);
        let w = arena.new_while(Loc::default(), ID::default(), cond, vec![], vec![]);

        let mut count = 0;
        let result = arena.walk::<&str, _>(w, &mut |_, _| {
            count += 1;
            Err("stop")
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(count, 1);
    }

    #[test]
    fn singleton_types() {
        let arena = Arena::new();
        assert!(arena.type_is_ideal(arena.ideal_type()));
        assert!(arena.type_is_num(arena.ideal_type()));
        assert!(arena.type_is_bool(arena.bool_type()));
        assert!(arena.type_is_num(arena.u8_type()));
        assert!(!arena.type_is_bool(arena.u8_type()));
    }

    #[test]
    fn type_eq_ignores_refinements_when_asked() {
        let mut arena = Arena::new();
        let mut tm = Map::new();
        let u32_id = tm.insert("u32").unwrap();

        let plain = arena.new_type_expr(Loc::default(), ID::default(), u32_id, None, None, None);
        let bound = {
            let lit = tm.insert("4095").unwrap();
            let b = arena.new_expr(
                Loc::default(),
                Flags::empty(),
                ID::default(),
                lit,
                None,
                None,
                None,
                vec![],
            );
            arena.set_const_value(b, 4095.into());
            arena.new_type_expr(Loc::default(), ID::default(), u32_id, None, Some(b), None)
        };

        assert!(!arena.type_eq(plain, bound));
        assert!(arena.type_eq_ignoring_refinements(plain, bound));
        assert!(arena.type_is_refined(bound));
        assert!(!arena.type_is_refined(plain));
    }

    #[test]
    fn type_eq_array_lengths_always_compare() {
        let mut arena = Arena::new();
        let mut tm = Map::new();
        let u8_id = tm.insert("u8").unwrap();
        let bracket = ID::from_key(Key::OPEN_BRACKET);

        let mut array = |arena: &mut Arena, tm: &mut Map, len: u32| {
            let lit = tm.insert(&len.to_string()).unwrap();
            let n = arena.new_expr(
                Loc::default(),
                Flags::empty(),
                ID::default(),
                lit,
                None,
                None,
                None,
                vec![],
            );
            arena.set_const_value(n, len.into());
            let elem = arena.new_type_expr(Loc::default(), ID::default(), u8_id, None, None, None);
            arena.new_type_expr(Loc::default(), bracket, ID::default(), Some(n), None, Some(elem))
        };

        let a = array(&mut arena, &mut tm, 8);
        let b = array(&mut arena, &mut tm, 8);
        let c = array(&mut arena, &mut tm, 9);
        assert!(arena.type_eq(a, b));
        assert!(!arena.type_eq(a, c));
        assert!(!arena.type_eq_ignoring_refinements(a, c));
    }

    #[test]
    fn jump_target_back_reference() {
        let mut arena = Arena::new();
        let mut tm = Map::new();
        let t = tm.insert("true").unwrap();
        let cond = leaf(&mut arena, t);
        let j = arena.new_jump(Loc::default(), ID::from_key(Key::BREAK), ID::default());
        let w = arena.new_while(Loc::default(), ID::default(), cond, vec![], vec![j]);

        assert_eq!(arena.jump_target(j), None);
        arena.set_jump_target(j, w);
        assert_eq!(arena.jump_target(j), Some(w));
    }

    #[test]
    fn render_exprs_and_types() {
        let mut arena = Arena::new();
        let mut tm = Map::new();
        let x = tm.insert("x").unwrap();
        let ten = tm.insert("10").unwrap();
        let lhs = leaf(&mut arena, x);
        let rhs = leaf(&mut arena, ten);
        let lt = arena.new_expr(
            Loc::default(),
            Flags::empty(),
            ID::from_key(Key::X_BINARY_LESS_THAN),
            ID::default(),
            Some(lhs),
            None,
            Some(rhs),
            vec![],
        );
        assert_eq!(arena.expr_str(lt, &tm), "x < 10");

        let u32_id = tm.insert("u32").unwrap();
        let bound = leaf(&mut arena, tm.insert("4095").unwrap());
        let refined =
            arena.new_type_expr(Loc::default(), ID::default(), u32_id, None, Some(bound), None);
        assert_eq!(arena.type_str(refined, &tm), "u32[..4095]");

        let elem = arena.new_type_expr(Loc::default(), ID::default(), u32_id, None, None, None);
        let ptr = arena.new_type_expr(
            Loc::default(),
            ID::from_key(Key::PTR),
            ID::default(),
            None,
            None,
            Some(elem),
        );
        assert_eq!(arena.type_str(ptr, &tm), "ptr u32");
    }
}
