mod common;

use common::*;
use sole_ast::Module;
use sole_core::{LinearityError, check_module};
use sole_ir::{DropStrategy, DropTarget};

#[test]
fn reusing_a_linear_binding_is_rejected() {
    let m = fixture_module(vec![fn_decl(
        "use_twice",
        vec![("db", named("DB"))],
        named("Unit"),
        block(
            vec![expr_stmt(call_ext(10, "db.send", vec![var(11, "db")]))],
            Some(call_ext(20, "db.send", vec![var(21, "db")])),
        ),
    )]);
    let err = check_module(&m).expect_err("second consuming use must be rejected");
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:?}");
    match &diags[0] {
        LinearityError::UseAfterConsume { name, .. } => assert_eq!(name, "db"),
        other => panic!("expected UseAfterConsume, got {other:?}"),
    }
}

#[test]
fn nonlinear_values_can_be_reused_freely() {
    let m = fixture_module(vec![fn_decl(
        "twice",
        vec![("p", named("Point"))],
        named("Point"),
        block(
            vec![let_(10, "q", named("Point"), var(11, "p"))],
            Some(var(20, "p")),
        ),
    )]);
    check_module(&m).expect("nonlinear reuse is fine");
}

#[test]
fn field_access_is_a_legal_consuming_use() {
    let m = fixture_module(vec![fn_decl(
        "unwrap",
        vec![("w", named("Wrap"))],
        named("DB"),
        block(vec![], Some(member(10, var(11, "w"), "db"))),
    )]);
    check_module(&m).expect("one field access consumes the value once");
}

#[test]
fn second_dot_access_reports_the_access_form() {
    let m = fixture_module(vec![fn_decl(
        "unwrap_twice",
        vec![("w", named("Wrap"))],
        named("DB"),
        block(
            vec![let_(10, "x", named("DB"), member(11, var(12, "w"), "db"))],
            Some(member(20, var(21, "w"), "db")),
        ),
    )]);
    let err = check_module(&m).expect_err("w is already consumed");
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:?}");
    match &diags[0] {
        LinearityError::LinearTypeUsedTwice { name, ty, .. } => {
            assert_eq!(name, "w");
            assert_eq!(ty, "Wrap");
        }
        other => panic!("expected LinearTypeUsedTwice, got {other:?}"),
    }
}

#[test]
fn record_of_reusable_fields_is_still_consumed_wholesale() {
    let mut types = fixture_types();
    types.push(ty_decl(
        "Cred",
        &[],
        vec![variant(
            "C",
            vec![("user", named("String")), ("pass", named("String"))],
        )],
        None,
    ));
    let peek_twice = fn_decl(
        "peek_twice",
        vec![("c", named("Cred"))],
        named("String"),
        block(
            vec![let_(10, "u", named("String"), member(11, var(12, "c"), "user"))],
            Some(member(20, var(21, "c"), "pass")),
        ),
    );
    let m = Module {
        types: types.clone(),
        drop_impls: Vec::new(),
        externs: fixture_externs(),
        functions: vec![peek_twice],
    };
    let err = check_module(&m).expect_err("each projection takes the whole record");
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert!(
        matches!(&diags[0], LinearityError::LinearTypeUsedTwice { name, .. } if name == "c"),
        "{diags:?}"
    );

    let split = fn_decl(
        "split",
        vec![("c", named("Cred"))],
        named("String"),
        block(
            vec![],
            Some(match_(
                10,
                var(11, "c"),
                vec![arm(
                    12,
                    pat_ctor(13, "Cred", "C", vec![bname(14, "user"), bname(15, "pass")]),
                    block(vec![], Some(var(20, "user"))),
                )],
            )),
        ),
    );
    let m = Module {
        types,
        drop_impls: Vec::new(),
        externs: fixture_externs(),
        functions: vec![split],
    };
    check_module(&m).expect("one match surrenders every field at once");
}

#[test]
fn bare_read_after_field_access_is_use_after_consume() {
    let m = fixture_module(vec![fn_decl(
        "read_back",
        vec![("w", named("Wrap"))],
        named("Wrap"),
        block(
            vec![let_discard(10, named("DB"), member(11, var(12, "w"), "db"))],
            Some(var(20, "w")),
        ),
    )]);
    let err = check_module(&m).expect_err("w is gone after the field read");
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert!(
        matches!(&diags[0], LinearityError::UseAfterConsume { name, .. } if name == "w"),
        "{diags:?}"
    );
}

#[test]
fn borrowing_leaves_the_value_live() {
    let m = fixture_module(vec![fn_decl(
        "observe",
        vec![("db", named("DB"))],
        named("Unit"),
        block(
            vec![
                expr_stmt(call_ext(10, "db.stat", vec![var(11, "db")])),
                expr_stmt(call_ext(20, "db.stat", vec![var(21, "db")])),
            ],
            None,
        ),
    )]);
    let ir = check_module(&m).expect("borrows do not consume");
    let func = &ir.functions["observe"];
    // db stayed live, so the parameter releases at the end of the body.
    assert_eq!(func.body.exit_drops.len(), 1, "{:?}", func.body.exit_drops);
    let release = &func.body.exit_drops[0];
    match (&release.target, &release.strategy) {
        (DropTarget::Binding(name), DropStrategy::Custom { hook }) => {
            assert_eq!(name, "db");
            assert_eq!(hook, "db_close");
        }
        other => panic!("expected custom release of db, got {other:?}"),
    }
}

#[test]
fn borrow_after_consume_is_rejected() {
    let m = fixture_module(vec![fn_decl(
        "late_look",
        vec![("db", named("DB"))],
        named("Unit"),
        block(
            vec![
                expr_stmt(call_ext(10, "db.send", vec![var(11, "db")])),
                expr_stmt(call_ext(20, "db.stat", vec![var(21, "db")])),
            ],
            None,
        ),
    )]);
    let err = check_module(&m).expect_err("cannot observe a consumed value");
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert!(
        matches!(&diags[0], LinearityError::UseAfterConsume { name, .. } if name == "db"),
        "{diags:?}"
    );
}

#[test]
fn reusable_binding_requires_a_nonlin_type() {
    let m = fixture_module(vec![fn_decl(
        "keep",
        vec![],
        named("Unit"),
        block(
            vec![let_reusable(
                10,
                "xs",
                applied("List", vec![named("DB")]),
                ctor(11, "List", vec![named("DB")], "Nil", vec![]),
            )],
            None,
        ),
    )]);
    let err = check_module(&m).expect_err("List DB is linear");
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:?}");
    match &diags[0] {
        LinearityError::TraitConstraintUnsatisfied { subject, ty, .. } => {
            assert!(subject.contains("xs"), "{subject}");
            assert_eq!(ty, "List DB");
        }
        other => panic!("expected TraitConstraintUnsatisfied, got {other:?}"),
    }
}

#[test]
fn reusable_binding_on_nonlin_type_reads_many_times() {
    let list_int = || applied("List", vec![named("Int")]);
    let m = fixture_module(vec![fn_decl(
        "reread",
        vec![],
        list_int(),
        block(
            vec![
                let_reusable(
                    10,
                    "xs",
                    list_int(),
                    ctor(11, "List", vec![named("Int")], "Nil", vec![]),
                ),
                let_(20, "ys", list_int(), var(21, "xs")),
            ],
            Some(var(30, "xs")),
        ),
    )]);
    check_module(&m).expect("List Int is NonLin");
}

#[test]
fn user_function_arguments_are_consumed() {
    let consume = fn_decl(
        "consume",
        vec![("d", named("DB"))],
        named("Unit"),
        block(
            vec![expr_stmt(call_ext(10, "db.send", vec![var(11, "d")]))],
            None,
        ),
    );
    let caller = fn_decl(
        "caller",
        vec![],
        named("Unit"),
        block(
            vec![
                let_(20, "db", named("DB"), call_ext(21, "db.open", vec![])),
                expr_stmt(call_fn(30, "consume", vec![], vec![var(31, "db")])),
            ],
            Some(call_ext(40, "db.stat", vec![var(41, "db")])),
        ),
    );
    let m = fixture_module(vec![consume, caller]);
    let err = check_module(&m).expect_err("db moved into consume");
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:?}");
    assert!(
        matches!(&diags[0], LinearityError::UseAfterConsume { name, .. } if name == "db"),
        "{diags:?}"
    );
}
