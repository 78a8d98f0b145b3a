use std::collections::HashMap;

use sole_ast::{Ident, Span, TypeParam, TypeRef};

pub const PRIMITIVES: [&str; 5] = ["Int", "Float", "Bool", "String", "Unit"];

pub fn is_primitive(name: &str) -> bool {
    PRIMITIVES.contains(&name)
}

/// Type-parameter instantiation, keyed by parameter name.
pub type Subst = HashMap<String, TypeRef>;

pub fn build_subst(params: &[TypeParam], args: &[TypeRef]) -> Subst {
    debug_assert_eq!(params.len(), args.len());
    params
        .iter()
        .zip(args)
        .map(|(p, a)| (p.name.node.clone(), a.clone()))
        .collect()
}

/// Replaces parameter references with their instantiation. Parameters absent
/// from the map stay as they are (they belong to the enclosing signature).
pub fn substitute(ty: &TypeRef, subst: &Subst) -> TypeRef {
    match ty {
        TypeRef::Param { name, .. } => match subst.get(&name.node) {
            Some(arg) => arg.clone(),
            None => ty.clone(),
        },
        TypeRef::Named { span, name, args } => TypeRef::Named {
            span: *span,
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, subst)).collect(),
        },
        TypeRef::Fn { span, params, ret } => TypeRef::Fn {
            span: *span,
            params: params.iter().map(|p| substitute(p, subst)).collect(),
            ret: Box::new(substitute(ret, subst)),
        },
        TypeRef::Tuple { span, items } => TypeRef::Tuple {
            span: *span,
            items: items.iter().map(|i| substitute(i, subst)).collect(),
        },
    }
}

pub fn named(span: Span, name: &str) -> TypeRef {
    TypeRef::Named {
        span,
        name: Ident::new(span, name.to_string()),
        args: Vec::new(),
    }
}

pub fn unit_ty(span: Span) -> TypeRef {
    named(span, "Unit")
}
