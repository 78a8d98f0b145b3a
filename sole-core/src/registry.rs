use std::collections::{HashMap, HashSet, VecDeque};

use sole_ast::{Module, Span, TypeDecl, TypeRef};
use sole_ir::{FieldRelease, VariantRelease};

use crate::error::RegistryError;
use crate::types::{build_subst, is_primitive, substitute};

/// How a declared type can ever satisfy `NonLin`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Linearity {
    /// Satisfied by every instantiation.
    Always,
    /// `auto NonLin ... where`: satisfied when the listed parameters are.
    Conditional(Vec<String>),
    /// No derivation declared; every instantiation is linear.
    Never,
}

/// Immutable trait facts for one compilation unit: which types satisfy
/// `NonLin`, which carry a custom destructor, and which need a destructor at
/// all. Built once before any function body is checked; afterwards only read.
#[derive(Debug)]
pub struct TraitRegistry {
    decls: HashMap<String, TypeDecl>,
    linearity: HashMap<String, Linearity>,
    drop_hooks: HashMap<String, String>,
}

struct Retraction {
    field_path: String,
    field_ty: String,
    field_span: Span,
    deriving_span: Span,
}

impl TraitRegistry {
    pub fn build(module: &Module) -> Result<Self, RegistryError> {
        let mut decls: HashMap<String, TypeDecl> = HashMap::new();
        for decl in &module.types {
            let prev = decls.insert(decl.name.node.clone(), decl.clone());
            debug_assert!(
                prev.is_none(),
                "front end delivered duplicate type `{}`",
                decl.name.node
            );
        }

        let mut drop_hooks: HashMap<String, String> = HashMap::new();
        for imp in &module.drop_impls {
            if !decls.contains_key(&imp.ty.node) {
                return Err(RegistryError::InvalidRecursiveDerivation {
                    ty: imp.ty.node.clone(),
                    reason: "`impl Drop` targets an undeclared type".to_string(),
                    span: imp.span,
                });
            }
            let prev = drop_hooks.insert(imp.ty.node.clone(), imp.hook.node.clone());
            if prev.is_some() {
                return Err(RegistryError::InvalidRecursiveDerivation {
                    ty: imp.ty.node.clone(),
                    reason: "duplicate `impl Drop`".to_string(),
                    span: imp.span,
                });
            }
        }

        for decl in &module.types {
            validate_decl(decl, &decls)?;
        }

        let linearity = derive_nonlin(module, &decls)?;

        // A custom destructor on a copyable type would run more than once.
        for imp in &module.drop_impls {
            if !matches!(linearity.get(&imp.ty.node), Some(Linearity::Never)) {
                return Err(RegistryError::InvalidRecursiveDerivation {
                    ty: imp.ty.node.clone(),
                    reason: "`impl Drop` requires a linear type".to_string(),
                    span: imp.span,
                });
            }
        }

        Ok(Self {
            decls,
            linearity,
            drop_hooks,
        })
    }

    pub fn decl(&self, name: &str) -> Option<&TypeDecl> {
        self.decls.get(name)
    }

    pub fn linearity_of(&self, name: &str) -> Linearity {
        if is_primitive(name) {
            return Linearity::Always;
        }
        match self.linearity.get(name) {
            Some(l) => l.clone(),
            None => {
                debug_assert!(false, "linearity queried for undeclared type `{name}`");
                Linearity::Never
            }
        }
    }

    pub fn custom_drop_hook(&self, name: &str) -> Option<&str> {
        self.drop_hooks.get(name).map(String::as_str)
    }

    pub fn drop_hooks(&self) -> &HashMap<String, String> {
        &self.drop_hooks
    }

    /// Whether `ty` satisfies `NonLin` under the given set of parameters the
    /// enclosing signature proves `NonLin`.
    pub fn is_nonlin(&self, ty: &TypeRef, assumed: &HashSet<String>) -> bool {
        match ty {
            TypeRef::Param { name, .. } => assumed.contains(&name.node),
            TypeRef::Fn { .. } => true,
            TypeRef::Tuple { items, .. } => items.iter().all(|i| self.is_nonlin(i, assumed)),
            TypeRef::Named { name, args, .. } => match self.linearity_of(&name.node) {
                Linearity::Always => true,
                Linearity::Never => false,
                Linearity::Conditional(required) => {
                    let Some(decl) = self.decls.get(&name.node) else {
                        return false;
                    };
                    required.iter().all(|p| {
                        match decl.params.iter().position(|tp| tp.name.node == *p) {
                            Some(idx) if idx < args.len() => self.is_nonlin(&args[idx], assumed),
                            _ => false,
                        }
                    })
                }
            },
        }
    }

    /// Whether releasing a value of `ty` does anything at all: a custom
    /// `impl Drop` anywhere in the value's field graph makes the drop
    /// non-trivial. Parameters answer `false`; drop knowledge is monomorphic.
    pub fn needs_drop(&self, ty: &TypeRef) -> bool {
        self.needs_drop_inner(ty, &mut HashSet::new())
    }

    fn needs_drop_inner(&self, ty: &TypeRef, visiting: &mut HashSet<String>) -> bool {
        match ty {
            TypeRef::Param { .. } | TypeRef::Fn { .. } => false,
            TypeRef::Tuple { items, .. } => {
                items.iter().any(|i| self.needs_drop_inner(i, visiting))
            }
            TypeRef::Named { name, args, .. } => {
                if is_primitive(&name.node) {
                    return false;
                }
                if self.drop_hooks.contains_key(&name.node) {
                    return true;
                }
                let Some(decl) = self.decls.get(&name.node) else {
                    debug_assert!(false, "drop fact queried for undeclared type `{}`", name.node);
                    return false;
                };
                if !visiting.insert(name.node.clone()) {
                    return false;
                }
                let subst = build_subst(&decl.params, args);
                let found = decl.variants.iter().any(|v| {
                    v.fields
                        .iter()
                        .any(|f| self.needs_drop_inner(&substitute(&f.ty, &subst), visiting))
                });
                visiting.remove(&name.node);
                found
            }
        }
    }

    /// Field-recursive default drop plan for `ty`: per constructor, the
    /// droppable fields in declaration order. Tuple values produce a single
    /// group with an empty constructor name and positional field names.
    pub fn default_releases(&self, ty: &TypeRef) -> Vec<VariantRelease> {
        match ty {
            TypeRef::Tuple { items, .. } => {
                let fields = items
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| self.needs_drop(item))
                    .map(|(idx, item)| FieldRelease {
                        field: idx.to_string(),
                        ty: item.to_string(),
                    })
                    .collect();
                vec![VariantRelease {
                    variant: String::new(),
                    fields,
                }]
            }
            TypeRef::Named { name, args, .. } => {
                let Some(decl) = self.decls.get(&name.node) else {
                    return Vec::new();
                };
                let subst = build_subst(&decl.params, args);
                decl.variants
                    .iter()
                    .map(|v| VariantRelease {
                        variant: v.name.node.clone(),
                        fields: v
                            .fields
                            .iter()
                            .filter_map(|f| {
                                let fty = substitute(&f.ty, &subst);
                                self.needs_drop(&fty).then(|| FieldRelease {
                                    field: f.name.node.clone(),
                                    ty: fty.to_string(),
                                })
                            })
                            .collect(),
                    })
                    .collect()
            }
            TypeRef::Param { .. } | TypeRef::Fn { .. } => Vec::new(),
        }
    }
}

fn validate_decl(decl: &TypeDecl, decls: &HashMap<String, TypeDecl>) -> Result<(), RegistryError> {
    let params: HashSet<&str> = decl.params.iter().map(|p| p.name.node.as_str()).collect();

    if let Some(der) = &decl.deriving {
        if der.cap.node != "NonLin" {
            return Err(RegistryError::InvalidRecursiveDerivation {
                ty: decl.name.node.clone(),
                reason: format!("unknown capability `{}`", der.cap.node),
                span: der.span,
            });
        }
        for w in &der.wheres {
            if w.cap.node != "NonLin" {
                return Err(RegistryError::InvalidRecursiveDerivation {
                    ty: decl.name.node.clone(),
                    reason: format!("unknown capability `{}` in `where` clause", w.cap.node),
                    span: w.span,
                });
            }
            if !params.contains(w.param.node.as_str()) {
                return Err(RegistryError::InvalidRecursiveDerivation {
                    ty: decl.name.node.clone(),
                    reason: format!("`where` clause names unknown parameter `{}`", w.param.node),
                    span: w.span,
                });
            }
        }
    }

    for variant in &decl.variants {
        for field in &variant.fields {
            validate_type_ref(&field.ty, decl, &params, decls).map_err(|reason| {
                RegistryError::InvalidRecursiveDerivation {
                    ty: decl.name.node.clone(),
                    reason: format!(
                        "field `{}.{}` {reason}",
                        variant.name.node, field.name.node
                    ),
                    span: field.span,
                }
            })?;
        }
    }
    Ok(())
}

fn validate_type_ref(
    ty: &TypeRef,
    decl: &TypeDecl,
    params: &HashSet<&str>,
    decls: &HashMap<String, TypeDecl>,
) -> Result<(), String> {
    match ty {
        TypeRef::Param { name, .. } => {
            if params.contains(name.node.as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "refers to parameter `{}` which `{}` does not declare",
                    name.node, decl.name.node
                ))
            }
        }
        TypeRef::Fn {
            params: fn_params,
            ret,
            ..
        } => {
            for p in fn_params {
                validate_type_ref(p, decl, params, decls)?;
            }
            validate_type_ref(ret, decl, params, decls)
        }
        TypeRef::Tuple { items, .. } => {
            for item in items {
                validate_type_ref(item, decl, params, decls)?;
            }
            Ok(())
        }
        TypeRef::Named { name, args, .. } => {
            let arity = if is_primitive(&name.node) {
                0
            } else if let Some(target) = decls.get(&name.node) {
                target.params.len()
            } else {
                return Err(format!("refers to undeclared type `{}`", name.node));
            };
            if args.len() != arity {
                return Err(format!(
                    "applies `{}` to {} type argument(s), expected {}",
                    name.node,
                    args.len(),
                    arity
                ));
            }
            for arg in args {
                validate_type_ref(arg, decl, params, decls)?;
            }
            Ok(())
        }
    }
}

/// Greatest-fixed-point derivation of `NonLin` over the declaration graph.
/// Every type carrying a derivation clause starts as a standing candidate;
/// a candidate is retracted as soon as one of its fields cannot satisfy
/// `NonLin`, and retraction re-examines the types that mention it. A
/// retracted candidate is a compile error, because its clause promised a
/// capability its fields cannot deliver.
fn derive_nonlin(
    module: &Module,
    decls: &HashMap<String, TypeDecl>,
) -> Result<HashMap<String, Linearity>, RegistryError> {
    let mut standing: HashMap<String, bool> = HashMap::new();
    for decl in &module.types {
        standing.insert(decl.name.node.clone(), decl.deriving.is_some());
    }

    // name -> declared types whose fields mention it
    let mut dependents: HashMap<String, HashSet<String>> = HashMap::new();
    for decl in &module.types {
        let mut mentioned = HashSet::new();
        for variant in &decl.variants {
            for field in &variant.fields {
                collect_nominals(&field.ty, &mut mentioned);
            }
        }
        for name in mentioned {
            dependents
                .entry(name)
                .or_default()
                .insert(decl.name.node.clone());
        }
    }

    let mut retractions: HashMap<String, Retraction> = HashMap::new();
    let mut queue: VecDeque<String> = module
        .types
        .iter()
        .filter(|d| d.deriving.is_some())
        .map(|d| d.name.node.clone())
        .collect();
    let mut queued: HashSet<String> = queue.iter().cloned().collect();

    while let Some(name) = queue.pop_front() {
        queued.remove(&name);
        if !standing.get(&name).copied().unwrap_or(false) {
            continue;
        }
        let decl = &decls[&name];
        let Some(bad) = first_unsatisfied_field(decl, &standing, decls) else {
            continue;
        };

        standing.insert(name.clone(), false);
        retractions.insert(
            name.clone(),
            Retraction {
                field_path: bad.0,
                field_ty: bad.1,
                field_span: bad.2,
                deriving_span: decl
                    .deriving
                    .as_ref()
                    .map(|d| d.span)
                    .unwrap_or(decl.span),
            },
        );
        if let Some(deps) = dependents.get(&name) {
            for dep in deps {
                let dep_standing = standing.get(dep).copied().unwrap_or(false);
                if dep_standing && !queued.contains(dep) {
                    queue.push_back(dep.clone());
                    queued.insert(dep.clone());
                }
            }
        }
    }

    // Retractions are reported in declaration order so output is stable.
    for decl in &module.types {
        if let Some(r) = retractions.remove(&decl.name.node) {
            return Err(RegistryError::DerivingUnsatisfied {
                ty: decl.name.node.clone(),
                field_path: r.field_path,
                field_ty: r.field_ty,
                deriving_span: r.deriving_span,
                field_span: r.field_span,
            });
        }
    }

    let mut linearity = HashMap::new();
    for name in crate::types::PRIMITIVES {
        linearity.insert(name.to_string(), Linearity::Always);
    }
    for decl in &module.types {
        let fact = match &decl.deriving {
            None => Linearity::Never,
            Some(der) if der.wheres.is_empty() => Linearity::Always,
            Some(der) => {
                // Conditional parameters in declaration order, deduplicated.
                let mut required = Vec::new();
                for p in &decl.params {
                    if der.wheres.iter().any(|w| w.param.node == p.name.node)
                        && !required.contains(&p.name.node)
                    {
                        required.push(p.name.node.clone());
                    }
                }
                Linearity::Conditional(required)
            }
        };
        linearity.insert(decl.name.node.clone(), fact);
    }
    Ok(linearity)
}

fn first_unsatisfied_field(
    decl: &TypeDecl,
    standing: &HashMap<String, bool>,
    decls: &HashMap<String, TypeDecl>,
) -> Option<(String, String, Span)> {
    let assumed: HashSet<&str> = decl
        .deriving
        .as_ref()
        .map(|d| d.wheres.iter().map(|w| w.param.node.as_str()).collect())
        .unwrap_or_default();

    for variant in &decl.variants {
        for field in &variant.fields {
            if !field_satisfiable(&field.ty, &assumed, standing, decls) {
                return Some((
                    format!("{}.{}", variant.name.node, field.name.node),
                    field.ty.to_string(),
                    field.span,
                ));
            }
        }
    }
    None
}

fn field_satisfiable(
    ty: &TypeRef,
    assumed: &HashSet<&str>,
    standing: &HashMap<String, bool>,
    decls: &HashMap<String, TypeDecl>,
) -> bool {
    match ty {
        TypeRef::Param { name, .. } => assumed.contains(name.node.as_str()),
        TypeRef::Fn { .. } => true,
        TypeRef::Tuple { items, .. } => items
            .iter()
            .all(|i| field_satisfiable(i, assumed, standing, decls)),
        TypeRef::Named { name, args, .. } => {
            if is_primitive(&name.node) {
                return true;
            }
            if !standing.get(&name.node).copied().unwrap_or(false) {
                return false;
            }
            // A standing candidate holds whenever its conditional
            // parameters do; plain candidates require nothing of their args.
            let decl = &decls[&name.node];
            let wheres = decl
                .deriving
                .as_ref()
                .map(|d| d.wheres.as_slice())
                .unwrap_or_default();
            wheres.iter().all(|w| {
                match decl.params.iter().position(|p| p.name.node == w.param.node) {
                    Some(idx) if idx < args.len() => {
                        field_satisfiable(&args[idx], assumed, standing, decls)
                    }
                    _ => false,
                }
            })
        }
    }
}

fn collect_nominals(ty: &TypeRef, out: &mut HashSet<String>) {
    match ty {
        TypeRef::Param { .. } => {}
        TypeRef::Named { name, args, .. } => {
            out.insert(name.node.clone());
            for arg in args {
                collect_nominals(arg, out);
            }
        }
        TypeRef::Fn { params, ret, .. } => {
            for p in params {
                collect_nominals(p, out);
            }
            collect_nominals(ret, out);
        }
        TypeRef::Tuple { items, .. } => {
            for item in items {
                collect_nominals(item, out);
            }
        }
    }
}
