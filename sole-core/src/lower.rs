//! Lowering runs only for functions the checker accepted. It repeats the
//! checker's traversal, assigning the same expression and scope numbers, and
//! spends them on the recorded facts: consumption marks on variable reads,
//! temporaries for discarded values, and destructor calls at scope exits.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use sole_ast::{Binder, Block, Callee, Expr, ExprKind, FnDecl, MatchArm, Module, Pattern, Span, Stmt};
use sole_ir::{
    ArmIr, BinderIr, BlockIr, CalleeIr, DropIr, DropTarget, ExprIr, ExprIrKind, FnId, FnIr,
    IdGen, ModuleIr, ParamIr, PatternIr, StmtIr, TempId,
};

use crate::checker::{FnAnalysis, VarMark, check_fn};
use crate::drops::ReleaseTarget;
use crate::error::{CheckFailure, LinearityError};
use crate::registry::TraitRegistry;
use crate::sigs::SigTable;

/// Checks every function in the module and, on success, hands back the
/// module with consumption marks and destructor calls made explicit.
/// Function bodies are independent once the registry and signature table
/// exist, so they are checked in parallel; diagnostics keep declaration
/// order regardless.
pub fn check_module(module: &Module) -> Result<ModuleIr, CheckFailure> {
    let registry = TraitRegistry::build(module)?;
    let sigs = SigTable::build(module);

    let results: Vec<Result<FnIr, Vec<LinearityError>>> = module
        .functions
        .par_iter()
        .enumerate()
        .map(|(idx, decl)| {
            check_fn(&registry, &sigs, decl)
                .map(|analysis| Lowerer::new(&analysis).lower_fn(FnId(idx as u32), decl))
        })
        .collect();

    let mut errors = Vec::new();
    let mut functions = BTreeMap::new();
    for result in results {
        match result {
            Ok(func) => {
                functions.insert(func.name.clone(), func);
            }
            Err(errs) => errors.extend(errs),
        }
    }
    if !errors.is_empty() {
        return Err(CheckFailure::Functions { errors });
    }

    let mut drop_hooks = BTreeMap::new();
    for (ty, hook) in registry.drop_hooks() {
        drop_hooks.insert(ty.clone(), hook.clone());
    }
    Ok(ModuleIr {
        functions,
        drop_hooks,
    })
}

/// Positions within one scope that needed a temporary. Pattern lowering and
/// drop emission both ask for the temp of the same position, so the ids are
/// cached per scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TempKey {
    Stmt(usize),
    PatBinder(usize),
}

fn matches_key(target: &ReleaseTarget, key: TempKey) -> bool {
    match (target, key) {
        (ReleaseTarget::Stmt(a), TempKey::Stmt(b)) => *a == b,
        (ReleaseTarget::PatBinder(a), TempKey::PatBinder(b)) => *a == b,
        _ => false,
    }
}

struct Lowerer<'a> {
    analysis: &'a FnAnalysis,
    ids: IdGen,
    next_expr: u32,
    next_scope: u32,
    scope_temps: HashMap<u32, HashMap<TempKey, TempId>>,
}

impl<'a> Lowerer<'a> {
    fn new(analysis: &'a FnAnalysis) -> Self {
        Self {
            analysis,
            ids: IdGen::default(),
            next_expr: 0,
            next_scope: 0,
            scope_temps: HashMap::new(),
        }
    }

    fn enter_scope(&mut self) -> u32 {
        let id = self.next_scope;
        self.next_scope += 1;
        id
    }

    fn lower_fn(mut self, id: FnId, decl: &FnDecl) -> FnIr {
        let param_scope = self.enter_scope();
        let mut body = self.lower_block(&decl.body);
        // Parameters release after everything the body scheduled.
        self.append_exit_drops(param_scope, &mut body.exit_drops);
        FnIr {
            id,
            name: decl.name.node.clone(),
            span: decl.span,
            params: decl
                .params
                .iter()
                .map(|p| ParamIr {
                    name: p.name.node.clone(),
                    ty: p.ty.to_string(),
                    span: p.span,
                })
                .collect(),
            ret: decl.ret.to_string(),
            body,
        }
    }

    fn lower_block(&mut self, block: &Block) -> BlockIr {
        let scope_id = self.enter_scope();
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for (idx, stmt) in block.stmts.iter().enumerate() {
            match stmt {
                Stmt::Let(stmt) => {
                    let init = self.lower_expr(&stmt.init);
                    match &stmt.binder {
                        Binder::Name(name) => stmts.push(StmtIr::Let {
                            span: stmt.span,
                            name: name.node.clone(),
                            ty: stmt.ty.to_string(),
                            init,
                        }),
                        Binder::Discard(_) => {
                            stmts.push(self.discarded(scope_id, idx, stmt.span, init));
                        }
                    }
                }
                Stmt::Expr(expr) => {
                    let lowered = self.lower_expr(expr);
                    stmts.push(self.discarded(scope_id, idx, expr.span, lowered));
                }
            }
        }
        let tail = block.tail.as_ref().map(|t| self.lower_expr(t));
        let mut exit_drops = Vec::new();
        self.append_exit_drops(scope_id, &mut exit_drops);
        BlockIr {
            span: block.span,
            stmts,
            tail,
            exit_drops,
        }
    }

    /// A discarded value becomes a temporary when a release was scheduled
    /// for its statement position, and a plain discard otherwise.
    fn discarded(&mut self, scope_id: u32, idx: usize, span: Span, expr: ExprIr) -> StmtIr {
        match self.release_ty(scope_id, TempKey::Stmt(idx)) {
            Some(ty) => StmtIr::LetTemp {
                span,
                temp: self.temp_for(scope_id, TempKey::Stmt(idx)),
                ty,
                init: expr,
            },
            None => StmtIr::Discard { span, expr },
        }
    }

    fn release_ty(&self, scope_id: u32, key: TempKey) -> Option<String> {
        self.analysis
            .scope_releases
            .get(&scope_id)?
            .iter()
            .find(|r| matches_key(&r.target, key))
            .map(|r| r.ty.clone())
    }

    fn temp_for(&mut self, scope_id: u32, key: TempKey) -> TempId {
        if let Some(temp) = self.scope_temps.get(&scope_id).and_then(|m| m.get(&key)) {
            return *temp;
        }
        let temp = self.ids.fresh_temp();
        self.scope_temps.entry(scope_id).or_default().insert(key, temp);
        temp
    }

    fn append_exit_drops(&mut self, scope_id: u32, out: &mut Vec<DropIr>) {
        let Some(releases) = self.analysis.scope_releases.get(&scope_id) else {
            return;
        };
        for release in releases {
            let target = match &release.target {
                ReleaseTarget::Binding(name) => DropTarget::Binding(name.clone()),
                ReleaseTarget::Stmt(idx) => {
                    DropTarget::Temp(self.temp_for(scope_id, TempKey::Stmt(*idx)))
                }
                ReleaseTarget::PatBinder(idx) => {
                    DropTarget::Temp(self.temp_for(scope_id, TempKey::PatBinder(*idx)))
                }
                ReleaseTarget::Scrutinee => DropTarget::Scrutinee,
            };
            out.push(DropIr {
                id: self.ids.fresh_drop(),
                span: release.span,
                target,
                ty: release.ty.clone(),
                strategy: release.strategy.clone(),
            });
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> ExprIr {
        let id = self.next_expr;
        self.next_expr += 1;
        let kind = match &expr.kind {
            ExprKind::Var(name) => {
                let mark = self
                    .analysis
                    .var_marks
                    .get(&id)
                    .copied()
                    .unwrap_or(VarMark {
                        consumes: false,
                        last_use: true,
                    });
                ExprIrKind::Var {
                    name: name.node.clone(),
                    consumes: mark.consumes,
                    last_use: mark.last_use,
                }
            }
            ExprKind::IntLit(v) => ExprIrKind::Int(*v),
            ExprKind::FloatLit(v) => ExprIrKind::Float(*v),
            ExprKind::BoolLit(v) => ExprIrKind::Bool(*v),
            ExprKind::StringLit(v) => ExprIrKind::Str(v.clone()),
            ExprKind::UnitLit => ExprIrKind::Unit,
            ExprKind::Member { base, field } => ExprIrKind::Field {
                base: Box::new(self.lower_expr(base)),
                field: field.node.clone(),
            },
            ExprKind::Call { callee, args, .. } => {
                let callee = match callee {
                    Callee::Fn(name) => CalleeIr::Fn(name.node.clone()),
                    Callee::Extern(name) => CalleeIr::Extern(name.node.clone()),
                    Callee::Value(inner) => CalleeIr::Value(Box::new(self.lower_expr(inner))),
                };
                let args = args.iter().map(|a| self.lower_expr(a)).collect();
                ExprIrKind::Call { callee, args }
            }
            ExprKind::Ctor {
                ty, variant, args, ..
            } => ExprIrKind::Ctor {
                ty: ty.node.clone(),
                variant: variant.node.clone(),
                args: args.iter().map(|a| self.lower_expr(a)).collect(),
            },
            ExprKind::Tuple(items) => {
                ExprIrKind::Tuple(items.iter().map(|i| self.lower_expr(i)).collect())
            }
            ExprKind::Match { scrutinee, arms } => {
                let scrutinee = Box::new(self.lower_expr(scrutinee));
                let arms = arms.iter().map(|arm| self.lower_arm(arm)).collect();
                ExprIrKind::Match { scrutinee, arms }
            }
        };
        ExprIr {
            span: expr.span,
            kind,
        }
    }

    fn lower_arm(&mut self, arm: &MatchArm) -> ArmIr {
        let arm_scope = self.enter_scope();
        let pattern = self.lower_pattern(arm_scope, &arm.pat);
        let mut body = self.lower_block(&arm.body);
        // Pattern temporaries and a wildcard's scrutinee release outlive the
        // arm body, so their drops run after the body's own.
        self.append_exit_drops(arm_scope, &mut body.exit_drops);
        ArmIr {
            span: arm.span,
            pattern,
            body,
        }
    }

    fn lower_pattern(&mut self, scope_id: u32, pat: &Pattern) -> PatternIr {
        match pat {
            Pattern::Wildcard { .. } => PatternIr::Wildcard,
            Pattern::Ctor {
                ty, variant, binders, ..
            } => PatternIr::Ctor {
                ty: ty.node.clone(),
                variant: variant.node.clone(),
                binders: binders
                    .iter()
                    .enumerate()
                    .map(|(idx, b)| self.lower_binder(scope_id, idx, b))
                    .collect(),
            },
            Pattern::Tuple { binders, .. } => PatternIr::Tuple {
                binders: binders
                    .iter()
                    .enumerate()
                    .map(|(idx, b)| self.lower_binder(scope_id, idx, b))
                    .collect(),
            },
        }
    }

    fn lower_binder(&mut self, scope_id: u32, idx: usize, binder: &Binder) -> BinderIr {
        match binder {
            Binder::Name(name) => BinderIr::Name(name.node.clone()),
            Binder::Discard(_) => {
                if self.release_ty(scope_id, TempKey::PatBinder(idx)).is_some() {
                    BinderIr::Temp(self.temp_for(scope_id, TempKey::PatBinder(idx)))
                } else {
                    BinderIr::Ignore
                }
            }
        }
    }
}
