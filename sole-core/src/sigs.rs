use std::collections::HashMap;

use sole_ast::{ExternSig, FnDecl, Module, Span, TraitBound, TypeParam, TypeRef};

/// Callable surface of one module-level function, recorded before any body is
/// walked so calls can be checked in declaration order without forward
/// restrictions.
#[derive(Clone, Debug)]
pub struct FnSig {
    pub name: String,
    pub span: Span,
    pub type_params: Vec<TypeParam>,
    pub constraints: Vec<TraitBound>,
    pub params: Vec<(String, TypeRef)>,
    pub ret: TypeRef,
}

impl FnSig {
    fn of(decl: &FnDecl) -> Self {
        Self {
            name: decl.name.node.clone(),
            span: decl.span,
            type_params: decl.type_params.clone(),
            constraints: decl.constraints.clone(),
            params: decl
                .params
                .iter()
                .map(|p| (p.name.node.clone(), p.ty.clone()))
                .collect(),
            ret: decl.ret.clone(),
        }
    }
}

/// Signatures of everything callable: user functions plus runtime primitives.
/// Primitives are monomorphic and carry per-parameter ownership effects;
/// user functions always take their arguments by value.
pub struct SigTable {
    fns: HashMap<String, FnSig>,
    externs: HashMap<String, ExternSig>,
}

impl SigTable {
    pub fn build(module: &Module) -> Self {
        let mut fns = HashMap::new();
        for decl in &module.functions {
            let prev = fns.insert(decl.name.node.clone(), FnSig::of(decl));
            debug_assert!(
                prev.is_none(),
                "front end delivered duplicate function `{}`",
                decl.name.node
            );
        }
        let mut externs = HashMap::new();
        for ext in &module.externs {
            let prev = externs.insert(ext.name.node.clone(), ext.clone());
            debug_assert!(
                prev.is_none(),
                "front end delivered duplicate extern `{}`",
                ext.name.node
            );
        }
        Self { fns, externs }
    }

    pub fn function(&self, name: &str) -> Option<&FnSig> {
        self.fns.get(name)
    }

    pub fn external(&self, name: &str) -> Option<&ExternSig> {
        self.externs.get(name)
    }
}
