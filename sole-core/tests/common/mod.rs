#![allow(dead_code)]

//! Hand-built syntax trees for exercising the checker without a front end.
//! Every helper takes an offset so spans stay distinct enough to tell
//! diagnostics apart.

use sole_ast::{
    Binder, Block, Callee, Deriving, DropImpl, Expr, ExprKind, ExternParam, ExternSig, FieldDef,
    FnDecl, Ident, LetStmt, MatchArm, Module, Param, ParamEffect, Pattern, Span, Stmt, TraitBound,
    TypeDecl, TypeParam, TypeRef, VariantDef, span,
};

pub fn ident(name: &str) -> Ident {
    Ident::new(span(0, name.len()), name.to_string())
}

pub fn sp(at: usize) -> Span {
    span(at, 1)
}

pub fn named(name: &str) -> TypeRef {
    TypeRef::Named {
        span: span(0, 0),
        name: ident(name),
        args: Vec::new(),
    }
}

pub fn applied(name: &str, args: Vec<TypeRef>) -> TypeRef {
    TypeRef::Named {
        span: span(0, 0),
        name: ident(name),
        args,
    }
}

pub fn pvar(name: &str) -> TypeRef {
    TypeRef::Param {
        span: span(0, 0),
        name: ident(name),
    }
}

pub fn fn_ty(params: Vec<TypeRef>, ret: TypeRef) -> TypeRef {
    TypeRef::Fn {
        span: span(0, 0),
        params,
        ret: Box::new(ret),
    }
}

pub fn variant(name: &str, fields: Vec<(&str, TypeRef)>) -> VariantDef {
    VariantDef {
        span: span(0, 0),
        name: ident(name),
        fields: fields
            .into_iter()
            .map(|(fname, ty)| FieldDef {
                span: span(0, 0),
                name: ident(fname),
                ty,
            })
            .collect(),
    }
}

pub fn ty_decl(
    name: &str,
    params: &[&str],
    variants: Vec<VariantDef>,
    deriving: Option<Deriving>,
) -> TypeDecl {
    TypeDecl {
        span: span(0, 0),
        name: ident(name),
        params: params
            .iter()
            .map(|p| TypeParam {
                span: span(0, 0),
                name: ident(p),
            })
            .collect(),
        variants,
        deriving,
    }
}

pub fn nonlin(wheres: &[&str]) -> Deriving {
    Deriving {
        span: span(0, 0),
        cap: ident("NonLin"),
        wheres: wheres.iter().map(|p| bound(p)).collect(),
    }
}

pub fn bound(param: &str) -> TraitBound {
    TraitBound {
        span: span(0, 0),
        param: ident(param),
        cap: ident("NonLin"),
    }
}

pub fn extern_sig(name: &str, params: Vec<(TypeRef, ParamEffect)>, ret: TypeRef) -> ExternSig {
    ExternSig {
        span: span(0, 0),
        name: ident(name),
        params: params
            .into_iter()
            .map(|(ty, effect)| ExternParam {
                span: span(0, 0),
                ty,
                effect,
            })
            .collect(),
        ret,
    }
}

pub fn var(at: usize, name: &str) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::Var(Ident::new(sp(at), name.to_string())),
    }
}

pub fn int(at: usize, value: i64) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::IntLit(value),
    }
}

pub fn string(at: usize, value: &str) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::StringLit(value.to_string()),
    }
}

pub fn member(at: usize, base: Expr, field: &str) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::Member {
            base: Box::new(base),
            field: ident(field),
        },
    }
}

pub fn call_fn(at: usize, name: &str, type_args: Vec<TypeRef>, args: Vec<Expr>) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::Call {
            callee: Callee::Fn(ident(name)),
            type_args,
            args,
        },
    }
}

pub fn call_val(at: usize, callee: Expr, args: Vec<Expr>) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::Call {
            callee: Callee::Value(Box::new(callee)),
            type_args: Vec::new(),
            args,
        },
    }
}

pub fn call_ext(at: usize, name: &str, args: Vec<Expr>) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::Call {
            callee: Callee::Extern(ident(name)),
            type_args: Vec::new(),
            args,
        },
    }
}

pub fn ctor(at: usize, ty: &str, type_args: Vec<TypeRef>, variant: &str, args: Vec<Expr>) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::Ctor {
            ty: ident(ty),
            type_args,
            variant: ident(variant),
            args,
        },
    }
}

pub fn match_(at: usize, scrutinee: Expr, arms: Vec<MatchArm>) -> Expr {
    Expr {
        span: sp(at),
        kind: ExprKind::Match {
            scrutinee: Box::new(scrutinee),
            arms,
        },
    }
}

pub fn arm(at: usize, pat: Pattern, body: Block) -> MatchArm {
    MatchArm {
        span: sp(at),
        pat,
        body,
    }
}

pub fn wildcard(at: usize) -> Pattern {
    Pattern::Wildcard { span: sp(at) }
}

pub fn pat_ctor(at: usize, ty: &str, variant: &str, binders: Vec<Binder>) -> Pattern {
    Pattern::Ctor {
        span: sp(at),
        ty: ident(ty),
        variant: ident(variant),
        binders,
    }
}

pub fn bname(at: usize, name: &str) -> Binder {
    Binder::Name(Ident::new(sp(at), name.to_string()))
}

pub fn bdiscard(at: usize) -> Binder {
    Binder::Discard(sp(at))
}

pub fn let_(at: usize, name: &str, ty: TypeRef, init: Expr) -> Stmt {
    Stmt::Let(LetStmt {
        span: sp(at),
        binder: bname(at, name),
        reusable: false,
        ty,
        init,
    })
}

pub fn let_reusable(at: usize, name: &str, ty: TypeRef, init: Expr) -> Stmt {
    Stmt::Let(LetStmt {
        span: sp(at),
        binder: bname(at, name),
        reusable: true,
        ty,
        init,
    })
}

pub fn let_discard(at: usize, ty: TypeRef, init: Expr) -> Stmt {
    Stmt::Let(LetStmt {
        span: sp(at),
        binder: bdiscard(at),
        reusable: false,
        ty,
        init,
    })
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

pub fn block(stmts: Vec<Stmt>, tail: Option<Expr>) -> Block {
    Block {
        span: span(0, 0),
        stmts,
        tail,
    }
}

pub fn fn_decl(name: &str, params: Vec<(&str, TypeRef)>, ret: TypeRef, body: Block) -> FnDecl {
    generic_fn(name, &[], &[], params, ret, body)
}

pub fn generic_fn(
    name: &str,
    type_params: &[&str],
    bounds: &[&str],
    params: Vec<(&str, TypeRef)>,
    ret: TypeRef,
    body: Block,
) -> FnDecl {
    FnDecl {
        span: span(0, 0),
        name: ident(name),
        type_params: type_params
            .iter()
            .map(|p| TypeParam {
                span: span(0, 0),
                name: ident(p),
            })
            .collect(),
        constraints: bounds.iter().map(|p| bound(p)).collect(),
        params: params
            .into_iter()
            .enumerate()
            .map(|(i, (pname, ty))| Param {
                span: sp(i),
                name: Ident::new(sp(i), pname.to_string()),
                ty,
            })
            .collect(),
        ret,
        body,
    }
}

/// The shared declaration set every test module builds on:
/// `DB` is linear with a custom destructor, `Token` is linear without one,
/// `Wrap` carries a `DB`, `Point` derives `NonLin`, and `List a` derives it
/// conditionally.
pub fn fixture_types() -> Vec<TypeDecl> {
    vec![
        ty_decl(
            "DB",
            &[],
            vec![variant("Handle", vec![("fd", named("Int"))])],
            None,
        ),
        ty_decl(
            "Token",
            &[],
            vec![variant("T", vec![("id", named("Int"))])],
            None,
        ),
        ty_decl(
            "Wrap",
            &[],
            vec![variant("W", vec![("db", named("DB"))])],
            None,
        ),
        ty_decl(
            "Point",
            &[],
            vec![variant("P", vec![("x", named("Int")), ("y", named("Int"))])],
            Some(nonlin(&[])),
        ),
        ty_decl(
            "List",
            &["a"],
            vec![
                variant("Nil", vec![]),
                variant(
                    "Cons",
                    vec![
                        ("head", pvar("a")),
                        ("tail", applied("List", vec![pvar("a")])),
                    ],
                ),
            ],
            Some(nonlin(&["a"])),
        ),
    ]
}

pub fn fixture_externs() -> Vec<ExternSig> {
    vec![
        extern_sig("db.open", vec![], named("DB")),
        extern_sig(
            "db.stat",
            vec![(named("DB"), ParamEffect::Borrows)],
            named("Unit"),
        ),
        extern_sig(
            "db.send",
            vec![(named("DB"), ParamEffect::Consumes)],
            named("Unit"),
        ),
        extern_sig(
            "io.puts",
            vec![(named("String"), ParamEffect::Borrows)],
            named("Unit"),
        ),
    ]
}

pub fn fixture_module(functions: Vec<FnDecl>) -> Module {
    Module {
        types: fixture_types(),
        drop_impls: vec![DropImpl {
            span: span(0, 0),
            ty: ident("DB"),
            hook: ident("db_close"),
        }],
        externs: fixture_externs(),
        functions,
    }
}
