#![forbid(unsafe_code)]

use std::fmt;

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

pub type Ident = Spanned<String>;

/// One compilation unit as handed over by the front end: type declarations,
/// destructor implementations, runtime primitive signatures, and function
/// bodies. Everything is already name-resolved, type-inferred, and desugared
/// (pipes rewritten to nested calls, match arms flattened to variant + field
/// binder lists).
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub types: Vec<TypeDecl>,
    pub drop_impls: Vec<DropImpl>,
    pub externs: Vec<ExternSig>,
    pub functions: Vec<FnDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeDecl {
    pub span: Span,
    pub name: Ident,
    pub params: Vec<TypeParam>,
    pub variants: Vec<VariantDef>,
    pub deriving: Option<Deriving>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParam {
    pub span: Span,
    pub name: Ident,
}

/// `deriving(NonLin)` or the conditional `auto NonLin for T where a: NonLin`
/// form; `wheres` is empty for the unconditional spelling.
#[derive(Clone, Debug, PartialEq)]
pub struct Deriving {
    pub span: Span,
    pub cap: Ident,
    pub wheres: Vec<TraitBound>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraitBound {
    pub span: Span,
    pub param: Ident,
    pub cap: Ident,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariantDef {
    pub span: Span,
    pub name: Ident,
    pub fields: Vec<FieldDef>,
}

/// Positional fields arrive from the desugarer with numeric names.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub span: Span,
    pub name: Ident,
    pub ty: TypeRef,
}

/// `impl Drop for T`; the front end lowers the implementation body to a named
/// procedure and hands this pass only the hook to call.
#[derive(Clone, Debug, PartialEq)]
pub struct DropImpl {
    pub span: Span,
    pub ty: Ident,
    pub hook: Ident,
}

/// Signature of a runtime primitive such as `io.puts` or `psql.open`. Each
/// parameter carries its ownership effect explicitly; primitives are the only
/// callees that may observe a value without taking it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternSig {
    pub span: Span,
    pub name: Ident,
    pub params: Vec<ExternParam>,
    pub ret: TypeRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternParam {
    pub span: Span,
    pub ty: TypeRef,
    pub effect: ParamEffect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamEffect {
    /// The callee takes ownership; passing the argument is a consuming use.
    Consumes,
    /// The callee only observes the value; the argument stays live.
    Borrows,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FnDecl {
    pub span: Span,
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub constraints: Vec<TraitBound>,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
    pub tail: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let(LetStmt),
    Expr(Expr),
}

/// `let x = e` / `let! x = e` / `let _ = e`, with the binding's resolved type
/// supplied by inference.
#[derive(Clone, Debug, PartialEq)]
pub struct LetStmt {
    pub span: Span,
    pub binder: Binder,
    pub reusable: bool,
    pub ty: TypeRef,
    pub init: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Binder {
    Name(Ident),
    Discard(Span),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeRef {
    Named {
        span: Span,
        name: Ident,
        args: Vec<TypeRef>,
    },
    /// Reference to a type parameter of the enclosing declaration.
    Param { span: Span, name: Ident },
    Fn {
        span: Span,
        params: Vec<TypeRef>,
        ret: Box<TypeRef>,
    },
    Tuple { span: Span, items: Vec<TypeRef> },
}

impl TypeRef {
    pub fn span(&self) -> Span {
        match self {
            TypeRef::Named { span, .. }
            | TypeRef::Param { span, .. }
            | TypeRef::Fn { span, .. }
            | TypeRef::Tuple { span, .. } => *span,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, args, .. } => {
                write!(f, "{}", name.node)?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            TypeRef::Param { name, .. } => write!(f, "{}", name.node),
            TypeRef::Fn { params, ret, .. } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
            TypeRef::Tuple { items, .. } => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Var(Ident),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(String),
    UnitLit,
    /// `base.field`
    Member { base: Box<Expr>, field: Ident },
    Call {
        callee: Callee,
        type_args: Vec<TypeRef>,
        args: Vec<Expr>,
    },
    /// `Ty.Variant { field: value, ... }`, desugared to positional order.
    Ctor {
        ty: Ident,
        type_args: Vec<TypeRef>,
        variant: Ident,
        args: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Callee {
    /// Module-level function, resolved by name.
    Fn(Ident),
    /// Runtime primitive, e.g. `io.puts`.
    Extern(Ident),
    /// A function-typed value (parameter or local binding).
    Value(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchArm {
    pub span: Span,
    pub pat: Pattern,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Wildcard { span: Span },
    /// Flat variant pattern; binders are positional against the variant's
    /// field list.
    Ctor {
        span: Span,
        ty: Ident,
        variant: Ident,
        binders: Vec<Binder>,
    },
    Tuple { span: Span, binders: Vec<Binder> },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Wildcard { span }
            | Pattern::Ctor { span, .. }
            | Pattern::Tuple { span, .. } => *span,
        }
    }
}
