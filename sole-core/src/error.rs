use sole_ast::Span;

use miette::Diagnostic;
use thiserror::Error;

/// Per-function diagnostics. Collected per body and reported together; one
/// function's errors never stop another function from being checked.
#[derive(Clone, Debug, Error, Diagnostic)]
pub enum LinearityError {
    #[error("linear binding `{name}` is used after it was already consumed")]
    #[diagnostic(code(sole::linear::use_after_consume))]
    UseAfterConsume {
        name: String,
        #[label("used again here")]
        use_span: Span,
        #[label("consumed here")]
        consumed_span: Span,
    },

    #[error("linear value `{name}` of type `{ty}` is accessed twice")]
    #[diagnostic(
        code(sole::linear::used_twice),
        help("a field access consumes the whole linear value; match once and bind every field you need")
    )]
    LinearTypeUsedTwice {
        name: String,
        ty: String,
        #[label("second access here")]
        use_span: Span,
        #[label("whole value consumed here")]
        consumed_span: Span,
    },

    #[error("linear binding `{name}` of type `{ty}` is never consumed")]
    #[diagnostic(
        code(sole::linear::unconsumed),
        help("consume `{name}`, return it, or give `{ty}` an `impl Drop`")
    )]
    UnconsumedLinearBinding {
        name: String,
        ty: String,
        #[label("declared here")]
        decl_span: Span,
    },

    #[error("`{name}` is consumed in some branches but not in others")]
    #[diagnostic(code(sole::linear::inconsistent_branches))]
    InconsistentBranchConsumption {
        name: String,
        #[label("the arms of this match disagree")]
        match_span: Span,
        #[label("declared here")]
        decl_span: Span,
    },

    #[error("`{ty}` does not satisfy `{cap}`, required by {subject}")]
    #[diagnostic(code(sole::linear::constraint_unsatisfied))]
    TraitConstraintUnsatisfied {
        subject: String,
        cap: String,
        ty: String,
        #[label("requirement arises here")]
        span: Span,
    },
}

/// Failures while deriving trait facts. These poison every downstream fact,
/// so they abort the unit before any function body is looked at.
#[derive(Clone, Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("`{ty}` cannot derive `NonLin`: field `{field_path}` has linear type `{field_ty}`")]
    #[diagnostic(code(sole::registry::constraint_unsatisfied))]
    DerivingUnsatisfied {
        ty: String,
        field_path: String,
        field_ty: String,
        #[label("derivation declared here")]
        deriving_span: Span,
        #[label("this field is linear")]
        field_span: Span,
    },

    #[error("capability derivation for `{ty}` is invalid: {reason}")]
    #[diagnostic(code(sole::registry::invalid_derivation))]
    InvalidRecursiveDerivation {
        ty: String,
        reason: String,
        #[label]
        span: Span,
    },
}

/// Outcome of `check_module` when the module is rejected.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckFailure {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error("linearity checking rejected the module")]
    #[diagnostic(code(sole::linear::rejected))]
    Functions {
        #[related]
        errors: Vec<LinearityError>,
    },
}

impl CheckFailure {
    /// The collected function-level diagnostics, empty for registry failures.
    pub fn diagnostics(&self) -> &[LinearityError] {
        match self {
            CheckFailure::Registry(_) => &[],
            CheckFailure::Functions { errors } => errors,
        }
    }
}
