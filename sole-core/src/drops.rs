use sole_ast::{Span, TypeRef};
use sole_ir::DropStrategy;

use crate::registry::TraitRegistry;

/// What a scheduled release refers to, in checker terms. The lowerer maps
/// statement and pattern positions onto temporaries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseTarget {
    /// Named binding going out of scope.
    Binding(String),
    /// Discarded value of the statement at this index within its block.
    Stmt(usize),
    /// Value bound by `_` at this binder position of the arm's pattern.
    PatBinder(usize),
    /// The matched value itself, under a wildcard arm.
    Scrutinee,
}

/// One release the checker has decided on, ready for the lowerer to turn
/// into an explicit destructor call.
#[derive(Clone, Debug)]
pub struct PlannedRelease {
    pub target: ReleaseTarget,
    pub ty: String,
    pub strategy: DropStrategy,
    pub span: Span,
}

/// Scope-exit releases under construction. Entries arrive in source order,
/// tagged with their declaration slot, and come out latest-first.
#[derive(Default)]
pub struct ReleaseSet {
    entries: Vec<(u32, PlannedRelease)>,
}

impl ReleaseSet {
    pub fn schedule(
        &mut self,
        registry: &TraitRegistry,
        seq: u32,
        target: ReleaseTarget,
        ty: &TypeRef,
        span: Span,
    ) {
        self.entries.push((
            seq,
            PlannedRelease {
                target,
                ty: ty.to_string(),
                strategy: strategy_for(registry, ty),
                span,
            },
        ));
    }

    /// Releases in execution order, the reverse of declaration order.
    pub fn into_ordered(mut self) -> Vec<PlannedRelease> {
        self.entries.sort_by(|a, b| b.0.cmp(&a.0));
        self.entries.into_iter().map(|(_, release)| release).collect()
    }
}

/// A custom `impl Drop` replaces the field-recursive default outright.
pub fn strategy_for(registry: &TraitRegistry, ty: &TypeRef) -> DropStrategy {
    let hook = match ty {
        TypeRef::Named { name, .. } => registry.custom_drop_hook(&name.node),
        _ => None,
    };
    match hook {
        Some(hook) => DropStrategy::Custom {
            hook: hook.to_string(),
        },
        None => DropStrategy::Fields {
            variants: registry.default_releases(ty),
        },
    }
}
