//! End-to-end tests for the rill front-end: build ASTs through the
//! public constructors, run the checker, inspect the annotations.

use std::sync::Arc;

use num_bigint::BigInt;

use rill::ast::{Arena, Flags, Loc, NodeId};
use rill::error::ErrorKind;
use rill::token::{Key, Map, ID};
use rill::Checker;

/// Builder for test ASTs.
struct Ast {
    tm: Map,
    arena: Arena,
    file: Arc<str>,
    line: u32,
}

impl Ast {
    fn new() -> Self {
        Ast {
            tm: Map::new(),
            arena: Arena::new(),
            file: Arc::from("test.rill"),
            line: 0,
        }
    }

    fn loc(&mut self) -> Loc {
        self.line += 1;
        Loc::new(self.file.clone(), self.line)
    }

    fn id(&mut self, s: &str) -> ID {
        self.tm.insert(s).expect("token map full")
    }

    fn leaf(&mut self, s: &str) -> NodeId {
        let name = self.id(s);
        let loc = self.loc();
        self.arena
            .new_expr(loc, Flags::empty(), ID::default(), name, None, None, None, vec![])
    }

    fn unary(&mut self, key: Key, rhs: NodeId) -> NodeId {
        let loc = self.loc();
        self.arena.new_expr(
            loc,
            Flags::empty(),
            ID::from_key(key),
            ID::default(),
            None,
            None,
            Some(rhs),
            vec![],
        )
    }

    fn binary(&mut self, key: Key, lhs: NodeId, rhs: NodeId) -> NodeId {
        let loc = self.loc();
        self.arena.new_expr(
            loc,
            Flags::empty(),
            ID::from_key(key),
            ID::default(),
            Some(lhs),
            None,
            Some(rhs),
            vec![],
        )
    }

    fn dot(&mut self, lhs: NodeId, name: &str) -> NodeId {
        let name = self.id(name);
        let loc = self.loc();
        self.arena.new_expr(
            loc,
            Flags::empty(),
            ID::from_key(Key::DOT),
            name,
            Some(lhs),
            None,
            None,
            vec![],
        )
    }

    fn call(&mut self, flags: Flags, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        let loc = self.loc();
        self.arena.new_expr(
            loc,
            flags,
            ID::from_key(Key::OPEN_PAREN),
            ID::default(),
            Some(callee),
            None,
            None,
            args,
        )
    }

    fn named_type(&mut self, s: &str) -> NodeId {
        let name = self.id(s);
        let loc = self.loc();
        self.arena
            .new_type_expr(loc, ID::default(), name, None, None, None)
    }

    fn refined_type(&mut self, s: &str, min: Option<NodeId>, max: Option<NodeId>) -> NodeId {
        let name = self.id(s);
        let loc = self.loc();
        self.arena
            .new_type_expr(loc, ID::default(), name, min, max, None)
    }

    fn var(&mut self, name: &str, type_name: &str, value: Option<NodeId>) -> NodeId {
        let x_type = self.named_type(type_name);
        self.var_typed(name, x_type, value)
    }

    fn var_typed(&mut self, name: &str, x_type: NodeId, value: Option<NodeId>) -> NodeId {
        let name = self.id(name);
        let loc = self.loc();
        self.arena.new_var(loc, name, x_type, value)
    }

    fn assign(&mut self, op: Key, lhs: NodeId, rhs: NodeId) -> NodeId {
        let loc = self.loc();
        self.arena.new_assign(loc, ID::from_key(op), lhs, rhs)
    }

    fn field(&mut self, name: &str, type_name: &str) -> NodeId {
        let x_type = self.named_type(type_name);
        let name = self.id(name);
        let loc = self.loc();
        self.arena.new_field(loc, name, x_type, None)
    }

    fn r#if(&mut self, cond: NodeId, else_if: Option<NodeId>, body: Vec<NodeId>) -> NodeId {
        let loc = self.loc();
        self.arena.new_if(loc, cond, else_if, body, vec![])
    }

    fn r#while(&mut self, label: &str, cond: NodeId, body: Vec<NodeId>) -> NodeId {
        let label = if label.is_empty() {
            ID::default()
        } else {
            self.id(label)
        };
        let loc = self.loc();
        self.arena.new_while(loc, label, cond, vec![], body)
    }

    fn jump(&mut self, keyword: Key, label: &str) -> NodeId {
        let label = if label.is_empty() {
            ID::default()
        } else {
            self.id(label)
        };
        let loc = self.loc();
        self.arena.new_jump(loc, ID::from_key(keyword), label)
    }

    /// A func with the given in-parameter fields and body, wrapped in a
    /// file ready for checking.
    fn file_with_func(&mut self, in_fields: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
        let loc = self.loc();
        let in_params = self
            .arena
            .new_struct(loc.clone(), Flags::empty(), ID::default(), in_fields);
        let out_params = self
            .arena
            .new_struct(loc.clone(), Flags::empty(), ID::default(), vec![]);
        let name = self.id("f");
        let func = self.arena.new_func(
            loc.clone(),
            Flags::empty(),
            ID::default(),
            name,
            in_params,
            out_params,
            vec![],
            body,
        );
        self.arena.new_file(loc, vec![func])
    }

    fn check(&mut self, file: NodeId) -> rill::Result<()> {
        let mut checker = Checker::new(&self.tm, &mut self.arena);
        checker.check_file(file)
    }

    fn m_type(&self, expr: NodeId) -> NodeId {
        self.arena.node(expr).m_type().expect("expression not typed")
    }

    fn const_value(&self, expr: NodeId) -> BigInt {
        self.arena
            .node(expr)
            .const_value()
            .expect("expression not constant")
            .clone()
    }
}

// ==== Concrete end-to-end scenarios ====

#[test]
fn var_initializer_folds_and_is_ideal() {
    let mut ast = Ast::new();
    let three = ast.leaf("3");
    let four = ast.leaf("4");
    let sum = ast.binary(Key::X_BINARY_PLUS, three, four);
    let var = ast.var("x", "u32", Some(sum));
    let file = ast.file_with_func(vec![], vec![var]);

    ast.check(file).unwrap();

    assert_eq!(ast.const_value(sum), BigInt::from(7));
    assert!(ast.arena.type_is_ideal(ast.m_type(sum)));
    assert!(ast.arena.node(var).type_checked());
    assert!(ast.arena.node(file).type_checked());
}

#[test]
fn if_chain_is_marked_all_or_nothing() {
    let mut ast = Ast::new();
    let var = ast.var("x", "u32", None);

    let x2 = ast.leaf("x");
    let twenty = ast.leaf("20");
    let cond2 = ast.binary(Key::X_BINARY_LESS_THAN, x2, twenty);
    let elif = ast.r#if(cond2, None, vec![]);

    let x1 = ast.leaf("x");
    let ten = ast.leaf("10");
    let cond1 = ast.binary(Key::X_BINARY_LESS_THAN, x1, ten);
    let head = ast.r#if(cond1, Some(elif), vec![]);

    let file = ast.file_with_func(vec![], vec![var, head]);
    ast.check(file).unwrap();

    assert!(ast.arena.type_is_bool(ast.m_type(cond1)));
    assert!(ast.arena.type_is_bool(ast.m_type(cond2)));
    assert!(ast.arena.node(head).type_checked());
    assert!(ast.arena.node(elif).type_checked());
}

#[test]
fn failing_else_if_leaves_chain_unmarked() {
    let mut ast = Ast::new();
    let bad = ast.leaf("3");
    let elif = ast.r#if(bad, None, vec![]);
    let good = ast.leaf("true");
    let head = ast.r#if(good, Some(elif), vec![]);
    let file = ast.file_with_func(vec![], vec![head]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotBoolean { .. }));
    assert!(!ast.arena.node(head).type_checked());
    assert!(!ast.arena.node(elif).type_checked());
}

#[test]
fn labelled_break_resolves_to_outer_while() {
    let mut ast = Ast::new();
    let brk = ast.jump(Key::BREAK, "outer");
    let inner_cond = ast.leaf("true");
    let inner = ast.r#while("", inner_cond, vec![brk]);
    let outer_cond = ast.leaf("true");
    let outer = ast.r#while("outer", outer_cond, vec![inner]);
    let file = ast.file_with_func(vec![], vec![outer]);

    ast.check(file).unwrap();

    assert_eq!(ast.arena.jump_target(brk), Some(outer));
    assert!(ast.arena.node(outer).flags().contains(Flags::HAS_BREAK));
    assert!(!ast.arena.node(inner).flags().contains(Flags::HAS_BREAK));
}

#[test]
fn unlabelled_continue_resolves_to_innermost_while() {
    let mut ast = Ast::new();
    let cont = ast.jump(Key::CONTINUE, "");
    let inner_cond = ast.leaf("true");
    let inner = ast.r#while("", inner_cond, vec![cont]);
    let outer_cond = ast.leaf("true");
    let outer = ast.r#while("outer", outer_cond, vec![inner]);
    let file = ast.file_with_func(vec![], vec![outer]);

    ast.check(file).unwrap();

    assert_eq!(ast.arena.jump_target(cont), Some(inner));
    assert!(ast.arena.node(inner).flags().contains(Flags::HAS_CONTINUE));
    assert!(!ast.arena.node(outer).flags().contains(Flags::HAS_CONTINUE));
}

#[test]
fn jump_without_target_is_rejected() {
    let mut ast = Ast::new();
    let brk = ast.jump(Key::BREAK, "");
    let file = ast.file_with_func(vec![], vec![brk]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NoJumpTarget { .. }));
}

#[test]
fn shift_in_range_folds() {
    let mut ast = Ast::new();
    let one = ast.leaf("1");
    let twenty = ast.leaf("20");
    let shift = ast.binary(Key::X_BINARY_SHIFT_L, one, twenty);
    let var = ast.var("y", "u8", Some(shift));
    let file = ast.file_with_func(vec![], vec![var]);

    ast.check(file).unwrap();
    assert_eq!(ast.const_value(shift), BigInt::from(1_048_576));
}

#[test]
fn shift_out_of_range_is_rejected() {
    let mut ast = Ast::new();
    let one = ast.leaf("1");
    let count = ast.leaf("0x10000");
    let shift = ast.binary(Key::X_BINARY_SHIFT_L, one, count);
    let var = ast.var("z", "u8", Some(shift));
    let file = ast.file_with_func(vec![], vec![var]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ShiftOutOfRange { .. }));
}

#[test]
fn division_by_constant_zero_is_rejected() {
    let mut ast = Ast::new();
    let one = ast.leaf("1");
    let zero = ast.leaf("0");
    let div = ast.binary(Key::X_BINARY_SLASH, one, zero);
    let var = ast.var("a", "u8", Some(div));
    let file = ast.file_with_func(vec![], vec![var]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DivByZero { .. }));
}

#[test]
fn suspendible_read_u8_call_yields_a_byte() {
    let mut ast = Ast::new();
    let src_field = ast.field("src", "buf1");
    let in_leaf = ast.leaf("in");
    let in_src = ast.dot(in_leaf, "src");
    let callee = ast.dot(in_src, "read_u8");
    let call = ast.call(Flags::SUSPENDIBLE | Flags::IMPURE, callee, vec![]);
    let var = ast.var("v", "u8", None);
    let v = ast.leaf("v");
    let assign = ast.assign(Key::EQ, v, call);
    let file = ast.file_with_func(vec![src_field], vec![var, assign]);

    ast.check(file).unwrap();

    let call_type = ast.m_type(call);
    assert_eq!(ast.arena.type_str(call_type, &ast.tm), "u8");
    assert!(ast.arena.node(call).type_checked());
    assert!(ast.arena.node(assign).type_checked());
}

#[test]
fn low_bits_call_yields_the_receiver_type() {
    let mut ast = Ast::new();
    let var_x = ast.var("x", "u32", None);
    let recv = ast.leaf("x");
    let callee = ast.dot(recv, "low_bits");
    let n_value = ast.leaf("4");
    let n_name = ast.id("n");
    let loc = ast.loc();
    let arg = ast.arena.new_arg(loc, n_name, n_value);
    let call = ast.call(Flags::empty(), callee, vec![arg]);
    let var_y = ast.var("y", "u32", Some(call));
    let file = ast.file_with_func(vec![], vec![var_x, var_y]);

    ast.check(file).unwrap();

    assert_eq!(ast.arena.type_str(ast.m_type(call), &ast.tm), "u32");
    assert!(ast.arena.node(arg).type_checked());
}

// ==== Universal invariants and property laws ====

#[test]
fn too_deep_expression_is_rejected_unannotated() {
    let mut ast = Ast::new();
    let mut expr = ast.leaf("1");
    let root = {
        for _ in 0..300 {
            expr = ast.unary(Key::X_UNARY_MINUS, expr);
        }
        expr
    };
    let var = ast.var("x", "u32", Some(root));
    let file = ast.file_with_func(vec![], vec![var]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ExprTooDeep));
    assert!(!ast.arena.node(root).type_checked());
    assert!(ast.arena.node(root).m_type().is_none());
}

#[test]
fn duplicate_local_variable_is_rejected() {
    let mut ast = Ast::new();
    let first = ast.var("x", "u32", None);
    let second = ast.var("x", "u8", None);
    let file = ast.file_with_func(vec![], vec![first, second]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateVar { .. }));
}

#[test]
fn unknown_identifier_is_rejected() {
    let mut ast = Ast::new();
    let y = ast.leaf("y");
    let var = ast.var("x", "u32", Some(y));
    let file = ast.file_with_func(vec![], vec![var]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownIdent { .. }));
}

#[test]
fn ideal_assignment_accepted_sized_mismatch_rejected() {
    let mut ast = Ast::new();
    let var_x = ast.var("x", "u32", None);
    let var_y = ast.var("y", "u8", None);
    let x1 = ast.leaf("x");
    let three = ast.leaf("3");
    let ok = ast.assign(Key::EQ, x1, three);
    let x2 = ast.leaf("x");
    let y = ast.leaf("y");
    let bad = ast.assign(Key::EQ, x2, y);
    let file = ast.file_with_func(vec![], vec![var_x, var_y, ok, bad]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotAssignable { .. }));
    // The failure came after the first assignment checked.
    assert!(ast.arena.node(ok).type_checked());
    assert!(!ast.arena.node(bad).type_checked());
}

#[test]
fn explicit_cast_bridges_sized_types() {
    let mut ast = Ast::new();
    let var_x = ast.var("x", "u32", None);
    let var_y = ast.var("y", "u8", None);
    let x = ast.leaf("x");
    let u8_type = ast.named_type("u8");
    let loc = ast.loc();
    let cast = ast.arena.new_expr(
        loc,
        Flags::empty(),
        ID::from_key(Key::X_BINARY_AS),
        ID::default(),
        Some(x),
        None,
        Some(u8_type),
        vec![],
    );
    let y = ast.leaf("y");
    let assign = ast.assign(Key::EQ, y, cast);
    let file = ast.file_with_func(vec![], vec![var_x, var_y, assign]);

    ast.check(file).unwrap();
    assert_eq!(ast.m_type(cast), u8_type);
}

#[test]
fn cast_to_non_numeric_type_is_rejected() {
    let mut ast = Ast::new();
    let var_x = ast.var("x", "u32", None);
    let x = ast.leaf("x");
    let bool_type = ast.named_type("bool");
    let loc = ast.loc();
    let cast = ast.arena.new_expr(
        loc,
        Flags::empty(),
        ID::from_key(Key::X_BINARY_AS),
        ID::default(),
        Some(x),
        None,
        Some(bool_type),
        vec![],
    );
    let var_y = ast.var_typed("y", bool_type, Some(cast));
    let file = ast.file_with_func(vec![], vec![var_x, var_y]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CannotConvert { .. }));
}

#[test]
fn compound_assignment_rules() {
    let mut ast = Ast::new();
    let var_x = ast.var("x", "u32", None);
    let var_y = ast.var("y", "u8", None);

    // x += 1 is fine: the right side is ideal.
    let x1 = ast.leaf("x");
    let one = ast.leaf("1");
    let plus_eq = ast.assign(Key::PLUS_EQ, x1, one);

    // x <<= y is fine: a shift count only needs a numeric type.
    let x2 = ast.leaf("x");
    let y1 = ast.leaf("y");
    let shift_eq = ast.assign(Key::SHIFT_L_EQ, x2, y1);

    let file = ast.file_with_func(vec![], vec![var_x, var_y, plus_eq, shift_eq]);
    ast.check(file).unwrap();

    // x += y mixes distinct sized types.
    let mut ast = Ast::new();
    let var_x = ast.var("x", "u32", None);
    let var_y = ast.var("y", "u8", None);
    let x = ast.leaf("x");
    let y = ast.leaf("y");
    let bad = ast.assign(Key::PLUS_EQ, x, y);
    let file = ast.file_with_func(vec![], vec![var_x, var_y, bad]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IncompatibleTypes { .. }));
}

#[test]
fn compound_assignment_to_boolean_is_rejected() {
    let mut ast = Ast::new();
    let var_b = ast.var("b", "bool", None);
    let b = ast.leaf("b");
    let one = ast.leaf("1");
    let bad = ast.assign(Key::PLUS_EQ, b, one);
    let file = ast.file_with_func(vec![], vec![var_b, bad]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NonNumeric { .. }));
}

#[test]
fn if_condition_must_be_boolean() {
    let mut ast = Ast::new();
    let three = ast.leaf("3");
    let bad_if = ast.r#if(three, None, vec![]);
    let file = ast.file_with_func(vec![], vec![bad_if]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotBoolean { .. }));
}

#[test]
fn ideal_shifted_by_sized_count_is_rejected() {
    let mut ast = Ast::new();
    let var_y = ast.var("y", "u8", None);
    let one = ast.leaf("1");
    let y = ast.leaf("y");
    let shift = ast.binary(Key::X_BINARY_SHIFT_L, one, y);
    let var_a = ast.var("a", "u32", Some(shift));
    let file = ast.file_with_func(vec![], vec![var_y, var_a]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IdealShift { .. }));
}

#[test]
fn constant_folding_operator_table() {
    let cases: &[(Key, i64, i64, i64)] = &[
        (Key::X_BINARY_PLUS, 7, 3, 10),
        (Key::X_BINARY_MINUS, 7, 3, 4),
        (Key::X_BINARY_STAR, 7, 3, 21),
        (Key::X_BINARY_SLASH, 10, 3, 3),
        (Key::X_BINARY_AMP, 6, 3, 2),
        (Key::X_BINARY_PIPE, 6, 3, 7),
        (Key::X_BINARY_HAT, 6, 3, 5),
        (Key::X_BINARY_AMP_HAT, 6, 3, 4),
        (Key::X_BINARY_SHIFT_L, 3, 4, 48),
        (Key::X_BINARY_SHIFT_R, 48, 4, 3),
        (Key::X_BINARY_LESS_THAN, 1, 5, 1),
        (Key::X_BINARY_LESS_EQ, 5, 5, 1),
        (Key::X_BINARY_EQ_EQ, 5, 4, 0),
        (Key::X_BINARY_NOT_EQ, 5, 4, 1),
        (Key::X_BINARY_GREATER_EQ, 4, 5, 0),
        (Key::X_BINARY_GREATER_THAN, 5, 4, 1),
    ];
    for &(op, l, r, expected) in cases {
        let mut ast = Ast::new();
        let lhs = ast.leaf(&l.to_string());
        let rhs = ast.leaf(&r.to_string());
        let expr = ast.binary(op, lhs, rhs);
        let var = ast.var("x", "u32", Some(expr));
        let file = ast.file_with_func(vec![], vec![var]);

        ast.check(file).unwrap();
        assert_eq!(
            ast.const_value(expr),
            BigInt::from(expected),
            "op key {:?}",
            op
        );
    }
}

#[test]
fn division_truncates_toward_zero() {
    let mut ast = Ast::new();
    let seven = ast.leaf("7");
    let neg_seven = ast.unary(Key::X_UNARY_MINUS, seven);
    let two = ast.leaf("2");
    let div = ast.binary(Key::X_BINARY_SLASH, neg_seven, two);
    let var = ast.var("x", "u32", Some(div));
    let file = ast.file_with_func(vec![], vec![var]);

    ast.check(file).unwrap();
    assert_eq!(ast.const_value(div), BigInt::from(-3));
}

#[test]
fn boolean_operators_fold_and_type_as_bool() {
    let mut ast = Ast::new();
    let t = ast.leaf("true");
    let f = ast.leaf("false");
    let and = ast.binary(Key::X_BINARY_AND, t, f);
    let var = ast.var("b", "bool", None);
    let b = ast.leaf("b");
    let assign = ast.assign(Key::EQ, b, and);
    let file = ast.file_with_func(vec![], vec![var, assign]);

    ast.check(file).unwrap();
    assert_eq!(ast.const_value(and), BigInt::from(0));
    assert!(ast.arena.type_is_bool(ast.m_type(and)));
    assert_eq!(ast.const_value(t), BigInt::from(1));
    assert_eq!(ast.const_value(f), BigInt::from(0));
}

#[test]
fn unary_not_requires_boolean() {
    let mut ast = Ast::new();
    let three = ast.leaf("3");
    let not = ast.unary(Key::X_UNARY_NOT, three);
    let var = ast.var("b", "bool", None);
    let b = ast.leaf("b");
    let assign = ast.assign(Key::EQ, b, not);
    let file = ast.file_with_func(vec![], vec![var, assign]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotBoolean { .. }));
}

#[test]
fn index_and_slice_expressions_are_unimplemented() {
    let mut ast = Ast::new();
    let var_x = ast.var("x", "u32", None);
    let x = ast.leaf("x");
    let zero = ast.leaf("0");
    let loc = ast.loc();
    let index = ast.arena.new_expr(
        loc,
        Flags::empty(),
        ID::from_key(Key::OPEN_BRACKET),
        ID::default(),
        Some(x),
        None,
        Some(zero),
        vec![],
    );
    let var_y = ast.var("y", "u32", Some(index));
    let file = ast.file_with_func(vec![], vec![var_x, var_y]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::Unimplemented {
            what: "index expressions"
        }
    ));
}

#[test]
fn refinement_bounds_must_be_constant() {
    let mut ast = Ast::new();
    let var_a = ast.var("a", "u32", None);
    let a = ast.leaf("a");
    let refined = ast.refined_type("u32", None, Some(a));
    let var_x = ast.var_typed("x", refined, None);
    let file = ast.file_with_func(vec![], vec![var_a, var_x]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotConstant { .. }));
}

#[test]
fn constant_refinement_bounds_are_accepted() {
    let mut ast = Ast::new();
    let bound = ast.leaf("4095");
    let refined = ast.refined_type("u32", None, Some(bound));
    let var_x = ast.var_typed("x", refined, None);
    let x = ast.leaf("x");
    let three = ast.leaf("3");
    let assign = ast.assign(Key::EQ, x, three);
    let file = ast.file_with_func(vec![], vec![var_x, assign]);

    ast.check(file).unwrap();
    assert!(ast.arena.node(refined).type_checked());
    assert_eq!(ast.const_value(bound), BigInt::from(4095));
}

#[test]
fn in_parameter_selection_types_the_selector() {
    let mut ast = Ast::new();
    let width = ast.field("width", "u32");
    let in_leaf = ast.leaf("in");
    let sel = ast.dot(in_leaf, "width");
    let var_w = ast.var("w", "u32", None);
    let w = ast.leaf("w");
    let assign = ast.assign(Key::EQ, w, sel);
    let file = ast.file_with_func(vec![width], vec![var_w, assign]);

    ast.check(file).unwrap();
    assert_eq!(ast.arena.type_str(ast.m_type(sel), &ast.tm), "u32");
    assert!(ast.arena.node(assign).type_checked());
}

#[test]
fn struct_types_in_type_expressions_are_still_rejected() {
    let mut ast = Ast::new();
    let name = ast.id("config");
    let loc = ast.loc();
    let config = ast.arena.new_struct(loc.clone(), Flags::empty(), name, vec![]);
    let var = ast.var("c", "config", None);
    let in_params = ast
        .arena
        .new_struct(loc.clone(), Flags::empty(), ID::default(), vec![]);
    let out_params = ast
        .arena
        .new_struct(loc.clone(), Flags::empty(), ID::default(), vec![]);
    let fname = ast.id("f");
    let func = ast.arena.new_func(
        loc.clone(),
        Flags::empty(),
        ID::default(),
        fname,
        in_params,
        out_params,
        vec![],
        vec![var],
    );
    let file = ast.arena.new_file(loc, vec![config, func]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotAType { .. }));
}

#[test]
fn missing_struct_field_is_rejected() {
    let mut ast = Ast::new();
    let src_field = ast.field("src", "buf1");
    let in_leaf = ast.leaf("in");
    let sel = ast.dot(in_leaf, "dst");
    let var_v = ast.var("v", "u8", None);
    let v = ast.leaf("v");
    let assign = ast.assign(Key::EQ, v, sel);
    let file = ast.file_with_func(vec![src_field], vec![var_v, assign]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NoSuchField { .. }));
}

#[test]
fn duplicate_struct_declaration_is_rejected() {
    let mut ast = Ast::new();
    let name = ast.id("config");
    let loc = ast.loc();
    let first = ast.arena.new_struct(loc.clone(), Flags::empty(), name, vec![]);
    let second = ast.arena.new_struct(loc.clone(), Flags::empty(), name, vec![]);
    let file = ast.arena.new_file(loc, vec![first, second]);

    let err = ast.check(file).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateStruct { .. }));
}

#[test]
fn rechecking_a_checked_file_is_a_no_op() {
    let mut ast = Ast::new();
    let three = ast.leaf("3");
    let four = ast.leaf("4");
    let sum = ast.binary(Key::X_BINARY_PLUS, three, four);
    let var = ast.var("x", "u32", Some(sum));
    let file = ast.file_with_func(vec![], vec![var]);

    ast.check(file).unwrap();
    let flags_before = ast.arena.node(sum).flags();

    // A fresh checker over the same arena re-derives the same facts.
    ast.check(file).unwrap();
    assert_eq!(ast.arena.node(sum).flags(), flags_before);
    assert!(ast.arena.node(file).type_checked());
    assert_eq!(ast.const_value(sum), BigInt::from(7));
}

#[test]
fn errors_carry_the_statement_location() {
    let mut ast = Ast::new();
    let one = ast.leaf("1");
    let zero = ast.leaf("0");
    let div = ast.binary(Key::X_BINARY_SLASH, one, zero);
    let var = ast.var("a", "u8", Some(div));
    let file = ast.file_with_func(vec![], vec![var]);

    let err = ast.check(file).unwrap_err();
    assert_eq!(&*err.file, "test.rill");
    assert_eq!(err.line, ast.arena.node(var).loc().line);
    let rendered = err.to_string();
    assert!(rendered.contains("test.rill"), "got {rendered:?}");
}
