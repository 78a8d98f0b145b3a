use std::collections::HashSet;

use sole_ast::{Span, TraitBound, TypeRef};

use crate::error::LinearityError;
use crate::registry::{Linearity, TraitRegistry};
use crate::sigs::FnSig;
use crate::types::{build_subst, is_primitive};

/// `NonLin` facts granted by the enclosing signature's `where` clauses.
#[derive(Clone, Debug, Default)]
pub struct ConstraintEnv {
    nonlin_params: HashSet<String>,
}

impl ConstraintEnv {
    pub fn from_bounds(bounds: &[TraitBound]) -> Self {
        let mut nonlin_params = HashSet::new();
        for bound in bounds {
            debug_assert_eq!(bound.cap.node, "NonLin", "unknown capability in bound");
            if bound.cap.node == "NonLin" {
                nonlin_params.insert(bound.param.node.clone());
            }
        }
        Self { nonlin_params }
    }

    pub fn proves_nonlin(&self, param: &str) -> bool {
        self.nonlin_params.contains(param)
    }

    pub fn assumed(&self) -> &HashSet<String> {
        &self.nonlin_params
    }
}

/// Evidence for a `NonLin` judgment. The checker only needs yes or no; the
/// shape exists so tests can pin down which rule fired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Witness {
    /// Primitive type.
    Builtin,
    /// Unconditional derivation on the named type.
    Declared { ty: String },
    /// Conditional derivation, with evidence for each required argument.
    Conditional { ty: String, parts: Vec<Witness> },
    /// Granted by a `where` bound on the enclosing signature.
    Assumed { param: String },
    /// Function and tuple types, from their components.
    Structural { parts: Vec<Witness> },
}

pub struct TraitSolver<'r> {
    registry: &'r TraitRegistry,
}

impl<'r> TraitSolver<'r> {
    pub fn new(registry: &'r TraitRegistry) -> Self {
        Self { registry }
    }

    /// Evidence that `ty` satisfies `NonLin` under `env`, or `None` when the
    /// type is linear there.
    pub fn prove_nonlin(&self, ty: &TypeRef, env: &ConstraintEnv) -> Option<Witness> {
        match ty {
            TypeRef::Param { name, .. } => {
                env.proves_nonlin(&name.node).then(|| Witness::Assumed {
                    param: name.node.clone(),
                })
            }
            TypeRef::Fn { .. } => Some(Witness::Structural { parts: Vec::new() }),
            TypeRef::Tuple { items, .. } => {
                let parts = items
                    .iter()
                    .map(|item| self.prove_nonlin(item, env))
                    .collect::<Option<Vec<_>>>()?;
                Some(Witness::Structural { parts })
            }
            TypeRef::Named { name, args, .. } => match self.registry.linearity_of(&name.node) {
                Linearity::Never => None,
                Linearity::Always => {
                    if is_primitive(&name.node) {
                        Some(Witness::Builtin)
                    } else {
                        Some(Witness::Declared {
                            ty: name.node.clone(),
                        })
                    }
                }
                Linearity::Conditional(required) => {
                    let decl = self.registry.decl(&name.node)?;
                    let mut parts = Vec::with_capacity(required.len());
                    for param in &required {
                        let idx = decl
                            .params
                            .iter()
                            .position(|tp| tp.name.node == *param)?;
                        parts.push(self.prove_nonlin(args.get(idx)?, env)?);
                    }
                    Some(Witness::Conditional {
                        ty: name.node.clone(),
                        parts,
                    })
                }
            },
        }
    }

    /// Instantiates the callee's `where` clauses at a call site and reports
    /// every clause the instantiation fails to satisfy.
    pub fn check_call(
        &self,
        sig: &FnSig,
        type_args: &[TypeRef],
        env: &ConstraintEnv,
        call_span: Span,
    ) -> Vec<LinearityError> {
        let subst = build_subst(&sig.type_params, type_args);
        let mut errors = Vec::new();
        for bound in &sig.constraints {
            let Some(arg) = subst.get(&bound.param.node) else {
                continue;
            };
            if self.prove_nonlin(arg, env).is_none() {
                errors.push(LinearityError::TraitConstraintUnsatisfied {
                    subject: format!("type parameter `{}` of `{}`", bound.param.node, sig.name),
                    cap: bound.cap.node.clone(),
                    ty: arg.to_string(),
                    span: call_span,
                });
            }
        }
        errors
    }
}
