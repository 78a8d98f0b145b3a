#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use sole_ast::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FnId(pub u32);

/// Identity of a value that never got a surface name: a discarded result
/// that still needs its destructor to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TempId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DropId(pub u32);

/// Checked module: the input shape with destructor calls made explicit.
#[derive(Clone, Debug)]
pub struct ModuleIr {
    pub functions: BTreeMap<String, FnIr>,
    /// Types with a custom `impl Drop`, mapped to the procedure to call.
    pub drop_hooks: BTreeMap<String, String>,
}

impl ModuleIr {
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
            drop_hooks: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FnIr {
    pub id: FnId,
    pub name: String,
    pub span: Span,
    pub params: Vec<ParamIr>,
    pub ret: String,
    pub body: BlockIr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamIr {
    pub name: String,
    pub ty: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockIr {
    pub span: Span,
    pub stmts: Vec<StmtIr>,
    pub tail: Option<ExprIr>,
    /// Destructor calls inserted at scope exit, already ordered. They run
    /// after the tail expression is evaluated.
    pub exit_drops: Vec<DropIr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtIr {
    /// `let` binding that survives into the output.
    Let {
        span: Span,
        name: String,
        ty: String,
        init: ExprIr,
    },
    /// A discarded value that must stay addressable until its drop runs.
    LetTemp {
        span: Span,
        temp: TempId,
        ty: String,
        init: ExprIr,
    },
    /// A value evaluated for effect only, nothing left to release.
    Discard { span: Span, expr: ExprIr },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DropIr {
    pub id: DropId,
    /// Where the dropped value was introduced.
    pub span: Span,
    pub target: DropTarget,
    pub ty: String,
    pub strategy: DropStrategy,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DropTarget {
    Binding(String),
    Temp(TempId),
    /// The value matched by the enclosing arm's wildcard pattern.
    Scrutinee,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DropStrategy {
    /// `impl Drop for T` exists: call the hook, never recurse into fields.
    Custom { hook: String },
    /// Default drop: dispatch on the live constructor and release its
    /// droppable fields in declaration order.
    Fields { variants: Vec<VariantRelease> },
}

/// Release plan for one constructor. Tuple values use a single group with an
/// empty constructor name and positional field names.
#[derive(Clone, Debug, PartialEq)]
pub struct VariantRelease {
    pub variant: String,
    pub fields: Vec<FieldRelease>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldRelease {
    pub field: String,
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprIr {
    pub span: Span,
    pub kind: ExprIrKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprIrKind {
    Var {
        name: String,
        /// This read consumed a linear binding.
        consumes: bool,
        /// No later read of the binding exists on this path.
        last_use: bool,
    },
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
    Field {
        base: Box<ExprIr>,
        field: String,
    },
    Call {
        callee: CalleeIr,
        args: Vec<ExprIr>,
    },
    Ctor {
        ty: String,
        variant: String,
        args: Vec<ExprIr>,
    },
    Tuple(Vec<ExprIr>),
    Match {
        scrutinee: Box<ExprIr>,
        arms: Vec<ArmIr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CalleeIr {
    Fn(String),
    Extern(String),
    Value(Box<ExprIr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArmIr {
    pub span: Span,
    pub pattern: PatternIr,
    pub body: BlockIr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternIr {
    Wildcard,
    Ctor {
        ty: String,
        variant: String,
        binders: Vec<BinderIr>,
    },
    Tuple { binders: Vec<BinderIr> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum BinderIr {
    Name(String),
    /// `_` against a field whose type still needs releasing.
    Temp(TempId),
    /// `_` against a field with nothing to release.
    Ignore,
}

#[derive(Default, Debug)]
pub struct IdGen {
    next_temp: u32,
    next_drop: u32,
}

impl IdGen {
    pub fn fresh_temp(&mut self) -> TempId {
        let id = TempId(self.next_temp);
        self.next_temp += 1;
        id
    }

    pub fn fresh_drop(&mut self) -> DropId {
        let id = DropId(self.next_drop);
        self.next_drop += 1;
        id
    }
}
