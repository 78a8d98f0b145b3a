//! Per-function linearity checking. The walk visits every expression exactly
//! once in pre-order, numbering expressions and scopes as it goes; the
//! lowerer repeats the same traversal and uses the numbers to pick up the
//! facts recorded here.

use std::collections::HashMap;

use sole_ast::{
    Binder, Block, Callee, Expr, ExprKind, FnDecl, Ident, LetStmt, MatchArm, ParamEffect,
    Pattern, Span, Stmt, TypeRef,
};

use crate::constraint::{ConstraintEnv, TraitSolver};
use crate::drops::{PlannedRelease, ReleaseSet, ReleaseTarget};
use crate::error::LinearityError;
use crate::registry::TraitRegistry;
use crate::scope::{BindingId, BindingState, ConsumeKind, ScopeStack, Snapshot};
use crate::sigs::SigTable;
use crate::types::{build_subst, named, substitute, unit_ty};

/// Why an expression position reads a variable. Decides whether the read
/// consumes, and which diagnostic a repeated use produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UseCtx {
    Normal,
    Scrutinee,
    Borrow,
    Return,
}

/// Consumption facts for one variable read, keyed by pre-order expression id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarMark {
    pub consumes: bool,
    pub last_use: bool,
}

/// Everything the lowerer needs to rebuild one function with explicit
/// releases: per-read marks and per-scope release plans, both keyed by ids
/// the lowerer recomputes by walking the same tree in the same order.
pub struct FnAnalysis {
    pub var_marks: HashMap<u32, VarMark>,
    pub scope_releases: HashMap<u32, Vec<PlannedRelease>>,
}

pub fn check_fn(
    registry: &TraitRegistry,
    sigs: &SigTable,
    decl: &FnDecl,
) -> Result<FnAnalysis, Vec<LinearityError>> {
    FnChecker::new(registry, sigs, decl).run(decl)
}

struct FnChecker<'a> {
    registry: &'a TraitRegistry,
    sigs: &'a SigTable,
    solver: TraitSolver<'a>,
    env: ConstraintEnv,
    scopes: ScopeStack,
    /// Release plans for every open scope, parallel to the scope stack.
    open: Vec<(u32, ReleaseSet)>,
    finished: HashMap<u32, Vec<PlannedRelease>>,
    diags: Vec<LinearityError>,
    /// Every variable read: expression id, binding, whether it consumed.
    reads: Vec<(u32, BindingId, bool)>,
    next_expr: u32,
    next_scope: u32,
}

impl<'a> FnChecker<'a> {
    fn new(registry: &'a TraitRegistry, sigs: &'a SigTable, decl: &FnDecl) -> Self {
        Self {
            registry,
            sigs,
            solver: TraitSolver::new(registry),
            env: ConstraintEnv::from_bounds(&decl.constraints),
            scopes: ScopeStack::new(),
            open: Vec::new(),
            finished: HashMap::new(),
            diags: Vec::new(),
            reads: Vec::new(),
            next_expr: 0,
            next_scope: 0,
        }
    }

    fn run(mut self, decl: &FnDecl) -> Result<FnAnalysis, Vec<LinearityError>> {
        // Parameters live in a scope of their own wrapping the body block, so
        // body bindings release before parameters do.
        self.enter_scope();
        for param in &decl.params {
            let linear = !self.registry.is_nonlin(&param.ty, self.env.assumed());
            self.scopes
                .declare(param.name.node.clone(), param.ty.clone(), param.name.span, linear);
        }
        self.check_block(&decl.body, UseCtx::Return);
        self.exit_scope();

        if self.diags.is_empty() {
            Ok(self.finalize())
        } else {
            Err(self.diags)
        }
    }

    fn finalize(self) -> FnAnalysis {
        let mut last_read: HashMap<BindingId, u32> = HashMap::new();
        for (expr_id, binding, _) in &self.reads {
            let entry = last_read.entry(*binding).or_insert(*expr_id);
            if *expr_id > *entry {
                *entry = *expr_id;
            }
        }
        let mut var_marks = HashMap::new();
        for (expr_id, binding, consumes) in &self.reads {
            var_marks.insert(
                *expr_id,
                VarMark {
                    consumes: *consumes,
                    last_use: last_read[binding] == *expr_id,
                },
            );
        }
        FnAnalysis {
            var_marks,
            scope_releases: self.finished,
        }
    }

    fn enter_scope(&mut self) -> u32 {
        let id = self.next_scope;
        self.next_scope += 1;
        self.scopes.push_scope();
        self.open.push((id, ReleaseSet::default()));
        id
    }

    /// Scope-exit triage: consumed bindings are done, live droppable ones get
    /// a release, live non-droppable linear ones are an error.
    fn exit_scope(&mut self) {
        let bindings = self.scopes.pop_scope();
        let (scope_id, mut set) = self.open.pop().expect("release stack");
        for binding in &bindings {
            if !binding.linear || !binding.state.is_live() {
                continue;
            }
            if self.registry.needs_drop(&binding.ty) {
                set.schedule(
                    self.registry,
                    binding.seq,
                    ReleaseTarget::Binding(binding.name.clone()),
                    &binding.ty,
                    binding.span,
                );
            } else {
                self.diags.push(LinearityError::UnconsumedLinearBinding {
                    name: binding.name.clone(),
                    ty: binding.ty.to_string(),
                    decl_span: binding.span,
                });
            }
        }
        self.finished.insert(scope_id, set.into_ordered());
    }

    fn schedule(&mut self, seq: u32, target: ReleaseTarget, ty: &TypeRef, span: Span) {
        let (_, set) = self.open.last_mut().expect("release stack");
        set.schedule(self.registry, seq, target, ty, span);
    }

    fn check_block(&mut self, block: &Block, tail_ctx: UseCtx) -> Option<TypeRef> {
        self.enter_scope();
        for (idx, stmt) in block.stmts.iter().enumerate() {
            match stmt {
                Stmt::Let(stmt) => self.check_let(idx, stmt),
                Stmt::Expr(expr) => {
                    let ty = self.check_expr(expr, UseCtx::Normal);
                    let seq = self.scopes.reserve_seq();
                    if let Some(ty) = ty {
                        if self.registry.needs_drop(&ty) {
                            self.schedule(seq, ReleaseTarget::Stmt(idx), &ty, expr.span);
                        }
                    }
                }
            }
        }
        let ty = match &block.tail {
            Some(tail) => self.check_expr(tail, tail_ctx),
            None => Some(unit_ty(block.span)),
        };
        self.exit_scope();
        ty
    }

    fn check_let(&mut self, idx: usize, stmt: &LetStmt) {
        self.check_expr(&stmt.init, UseCtx::Normal);
        match &stmt.binder {
            Binder::Name(name) => {
                let mut linear = !self.registry.is_nonlin(&stmt.ty, self.env.assumed());
                if stmt.reusable {
                    if self.solver.prove_nonlin(&stmt.ty, &self.env).is_none() {
                        self.diags.push(LinearityError::TraitConstraintUnsatisfied {
                            subject: format!("reusable binding `{}`", name.node),
                            cap: "NonLin".to_string(),
                            ty: stmt.ty.to_string(),
                            span: stmt.span,
                        });
                    }
                    // Recovery: treat it as nonlinear so the one mistake does
                    // not cascade into use-after-consume noise.
                    linear = false;
                }
                self.scopes
                    .declare(name.node.clone(), stmt.ty.clone(), name.span, linear);
            }
            Binder::Discard(_) => {
                let seq = self.scopes.reserve_seq();
                if self.registry.needs_drop(&stmt.ty) {
                    self.schedule(seq, ReleaseTarget::Stmt(idx), &stmt.ty, stmt.span);
                }
            }
        }
    }

    /// Checks one expression and reports the type it produces, when that can
    /// be read off the tree. The id handed out here must match the one the
    /// lowerer computes for the same node.
    fn check_expr(&mut self, expr: &Expr, ctx: UseCtx) -> Option<TypeRef> {
        let id = self.next_expr;
        self.next_expr += 1;
        match &expr.kind {
            ExprKind::Var(name) => self.check_var(id, name, expr.span, ctx),
            ExprKind::IntLit(_) => Some(named(expr.span, "Int")),
            ExprKind::FloatLit(_) => Some(named(expr.span, "Float")),
            ExprKind::BoolLit(_) => Some(named(expr.span, "Bool")),
            ExprKind::StringLit(_) => Some(named(expr.span, "String")),
            ExprKind::UnitLit => Some(unit_ty(expr.span)),
            ExprKind::Member { base, field } => self.check_member(base, field, expr.span),
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.check_call(expr.span, callee, type_args, args),
            ExprKind::Ctor {
                ty, type_args, args, ..
            } => {
                for arg in args {
                    self.check_expr(arg, UseCtx::Normal);
                }
                Some(TypeRef::Named {
                    span: expr.span,
                    name: ty.clone(),
                    args: type_args.clone(),
                })
            }
            ExprKind::Tuple(items) => {
                let mut tys = Vec::with_capacity(items.len());
                let mut complete = true;
                for item in items {
                    match self.check_expr(item, UseCtx::Normal) {
                        Some(ty) => tys.push(ty),
                        None => complete = false,
                    }
                }
                complete.then(|| TypeRef::Tuple {
                    span: expr.span,
                    items: tys,
                })
            }
            ExprKind::Match { scrutinee, arms } => self.check_match(expr.span, scrutinee, arms, ctx),
        }
    }

    fn check_var(&mut self, id: u32, name: &Ident, span: Span, ctx: UseCtx) -> Option<TypeRef> {
        let Some(binding) = self.scopes.find(&name.node) else {
            debug_assert!(false, "unresolved name `{}`", name.node);
            return None;
        };
        let (bid, linear, ty) = (binding.id, binding.linear, binding.ty.clone());
        let state = binding.state.clone();

        if !linear {
            self.reads.push((id, bid, false));
            return Some(ty);
        }
        match (ctx, state) {
            (UseCtx::Borrow, BindingState::Live) => {
                self.reads.push((id, bid, false));
            }
            (_, BindingState::Live) => {
                let kind = match ctx {
                    UseCtx::Normal => ConsumeKind::Read,
                    UseCtx::Scrutinee => ConsumeKind::Matched,
                    UseCtx::Return => ConsumeKind::Returned,
                    UseCtx::Borrow => unreachable!(),
                };
                self.scopes.find_mut(&name.node).expect("binding").state =
                    BindingState::Consumed { at: span, kind };
                self.reads.push((id, bid, true));
            }
            (_, BindingState::Consumed { at, .. }) => {
                self.diags.push(LinearityError::UseAfterConsume {
                    name: name.node.clone(),
                    use_span: span,
                    consumed_span: at,
                });
                self.reads.push((id, bid, false));
            }
        }
        Some(ty)
    }

    /// Field access consumes the whole base value when the base is a linear
    /// binding; there are no partial moves. A repeated access through the
    /// dot gets its own diagnostic so the message can name the access form.
    fn check_member(&mut self, base: &Expr, field: &Ident, member_span: Span) -> Option<TypeRef> {
        if let ExprKind::Var(name) = &base.kind {
            let base_id = self.next_expr;
            self.next_expr += 1;
            let Some(binding) = self.scopes.find(&name.node) else {
                debug_assert!(false, "unresolved name `{}`", name.node);
                return None;
            };
            let (bid, linear, base_ty) = (binding.id, binding.linear, binding.ty.clone());
            let state = binding.state.clone();

            if !linear {
                self.reads.push((base_id, bid, false));
            } else {
                match state {
                    BindingState::Live => {
                        self.scopes.find_mut(&name.node).expect("binding").state =
                            BindingState::Consumed {
                                at: member_span,
                                kind: ConsumeKind::FieldAccess(field.node.clone()),
                            };
                        self.reads.push((base_id, bid, true));
                    }
                    BindingState::Consumed { at, .. } => {
                        self.diags.push(LinearityError::LinearTypeUsedTwice {
                            name: name.node.clone(),
                            ty: base_ty.to_string(),
                            use_span: member_span,
                            consumed_span: at,
                        });
                        self.reads.push((base_id, bid, false));
                    }
                }
            }
            return self.project_field(&base_ty, field);
        }
        let base_ty = self.check_expr(base, UseCtx::Normal)?;
        self.project_field(&base_ty, field)
    }

    fn project_field(&self, base_ty: &TypeRef, field: &Ident) -> Option<TypeRef> {
        let TypeRef::Named { name, args, .. } = base_ty else {
            return None;
        };
        let decl = self.registry.decl(&name.node)?;
        let subst = build_subst(&decl.params, args);
        for variant in &decl.variants {
            for f in &variant.fields {
                if f.name.node == field.node {
                    return Some(substitute(&f.ty, &subst));
                }
            }
        }
        None
    }

    fn check_call(
        &mut self,
        span: Span,
        callee: &Callee,
        type_args: &[TypeRef],
        args: &[Expr],
    ) -> Option<TypeRef> {
        match callee {
            Callee::Fn(name) => {
                let sig = self.sigs.function(&name.node);
                debug_assert!(sig.is_some(), "unresolved function `{}`", name.node);
                if let Some(sig) = sig {
                    let errors = self.solver.check_call(sig, type_args, &self.env, span);
                    self.diags.extend(errors);
                }
                for arg in args {
                    self.check_expr(arg, UseCtx::Normal);
                }
                sig.map(|sig| {
                    let subst = build_subst(&sig.type_params, type_args);
                    substitute(&sig.ret, &subst)
                })
            }
            Callee::Extern(name) => {
                let ext = self.sigs.external(&name.node);
                debug_assert!(ext.is_some(), "unresolved extern `{}`", name.node);
                for (idx, arg) in args.iter().enumerate() {
                    let effect = ext
                        .and_then(|e| e.params.get(idx))
                        .map(|p| p.effect)
                        .unwrap_or(ParamEffect::Consumes);
                    // Only a direct variable argument can be lent; anything
                    // compound produces a fresh value the callee observes.
                    let ctx = if effect == ParamEffect::Borrows
                        && matches!(arg.kind, ExprKind::Var(_))
                    {
                        UseCtx::Borrow
                    } else {
                        UseCtx::Normal
                    };
                    self.check_expr(arg, ctx);
                }
                ext.map(|e| e.ret.clone())
            }
            Callee::Value(inner) => {
                let callee_ty = self.check_expr(inner, UseCtx::Normal);
                for arg in args {
                    self.check_expr(arg, UseCtx::Normal);
                }
                match callee_ty {
                    Some(TypeRef::Fn { ret, .. }) => Some(*ret),
                    _ => None,
                }
            }
        }
    }

    fn check_match(
        &mut self,
        span: Span,
        scrutinee: &Expr,
        arms: &[MatchArm],
        ctx: UseCtx,
    ) -> Option<TypeRef> {
        let scrut_ty = self.check_expr(scrutinee, UseCtx::Scrutinee);
        let entry = self.scopes.snapshot();
        let tail_ctx = if ctx == UseCtx::Return {
            UseCtx::Return
        } else {
            UseCtx::Normal
        };

        let mut result_ty = None;
        let mut outcomes: Vec<Snapshot> = Vec::with_capacity(arms.len());
        for (idx, arm) in arms.iter().enumerate() {
            self.scopes.restore(&entry);
            self.enter_scope();
            self.declare_pattern(&arm.pat, scrut_ty.as_ref());
            let body_ty = self.check_block(&arm.body, tail_ctx);
            self.exit_scope();
            if idx == 0 {
                result_ty = body_ty;
            }
            outcomes.push(self.scopes.snapshot());
        }

        match outcomes.first() {
            Some(first) => {
                let mut reported: Vec<String> = Vec::new();
                for other in &outcomes[1..] {
                    let diverging: Vec<(String, Span)> = self
                        .scopes
                        .diverging(first, other)
                        .into_iter()
                        .map(|b| (b.name.clone(), b.span))
                        .collect();
                    for (name, decl_span) in diverging {
                        if !reported.contains(&name) {
                            self.diags
                                .push(LinearityError::InconsistentBranchConsumption {
                                    name: name.clone(),
                                    match_span: span,
                                    decl_span,
                                });
                            reported.push(name);
                        }
                    }
                }
                // Arms that agree all leave the same liveness behind, so the
                // first arm's outcome stands for the whole match.
                self.scopes.restore(first);
            }
            None => self.scopes.restore(&entry),
        }
        result_ty
    }

    fn declare_pattern(&mut self, pat: &Pattern, scrut_ty: Option<&TypeRef>) {
        match pat {
            Pattern::Wildcard { span } => {
                let seq = self.scopes.reserve_seq();
                if let Some(ty) = scrut_ty {
                    if self.registry.needs_drop(ty) {
                        self.schedule(seq, ReleaseTarget::Scrutinee, ty, *span);
                    }
                }
            }
            Pattern::Ctor {
                ty: pat_ty,
                variant,
                binders,
                ..
            } => {
                let field_tys: Vec<TypeRef> = match scrut_ty {
                    Some(TypeRef::Named { name, args, .. }) => {
                        debug_assert_eq!(
                            name.node, pat_ty.node,
                            "pattern type disagrees with scrutinee"
                        );
                        match self.registry.decl(&name.node) {
                            Some(decl) => {
                                let subst = build_subst(&decl.params, args);
                                decl.variants
                                    .iter()
                                    .find(|v| v.name.node == variant.node)
                                    .map(|v| {
                                        v.fields
                                            .iter()
                                            .map(|f| substitute(&f.ty, &subst))
                                            .collect()
                                    })
                                    .unwrap_or_default()
                            }
                            None => Vec::new(),
                        }
                    }
                    _ => Vec::new(),
                };
                for (idx, binder) in binders.iter().enumerate() {
                    self.declare_binder(idx, binder, field_tys.get(idx).cloned());
                }
            }
            Pattern::Tuple { binders, .. } => {
                let item_tys: Vec<TypeRef> = match scrut_ty {
                    Some(TypeRef::Tuple { items, .. }) => items.clone(),
                    _ => Vec::new(),
                };
                for (idx, binder) in binders.iter().enumerate() {
                    self.declare_binder(idx, binder, item_tys.get(idx).cloned());
                }
            }
        }
    }

    fn declare_binder(&mut self, idx: usize, binder: &Binder, field_ty: Option<TypeRef>) {
        match binder {
            Binder::Name(name) => {
                let ty = field_ty.unwrap_or_else(|| unit_ty(name.span));
                let linear = !self.registry.is_nonlin(&ty, self.env.assumed());
                self.scopes.declare(name.node.clone(), ty, name.span, linear);
            }
            Binder::Discard(span) => {
                let seq = self.scopes.reserve_seq();
                if let Some(ty) = field_ty {
                    if self.registry.needs_drop(&ty) {
                        self.schedule(seq, ReleaseTarget::PatBinder(idx), &ty, *span);
                    }
                }
            }
        }
    }
}
