use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, ensure};

use crate::tt::{Expr, Level, Name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Axiom,
    Definition,
    Theorem,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: Name,
    pub univ_params: Vec<Name>,
    pub ty: Expr,
    pub value: Option<Expr>,
    pub kind: DeclarationKind,
}

impl Declaration {
    pub fn axiom(name: Name, univ_params: Vec<Name>, ty: Expr) -> Declaration {
        Declaration {
            name,
            univ_params,
            ty,
            value: None,
            kind: DeclarationKind::Axiom,
        }
    }

    pub fn definition(name: Name, univ_params: Vec<Name>, ty: Expr, value: Expr) -> Declaration {
        Declaration {
            name,
            univ_params,
            ty,
            value: Some(value),
            kind: DeclarationKind::Definition,
        }
    }

    pub fn theorem(name: Name, univ_params: Vec<Name>, ty: Expr, value: Expr) -> Declaration {
        Declaration {
            name,
            univ_params,
            ty,
            value: Some(value),
            kind: DeclarationKind::Theorem,
        }
    }

    pub fn is_theorem(&self) -> bool {
        self.kind == DeclarationKind::Theorem
    }

    pub fn instantiate_type_univ_params(&self, levels: &[Level]) -> Expr {
        self.ty.instantiate_univ_params(&self.univ_params, levels)
    }

    pub fn instantiate_value_univ_params(&self, levels: &[Level]) -> Option<Expr> {
        let value = self.value.as_ref()?;
        Some(value.instantiate_univ_params(&self.univ_params, levels))
    }
}

/// A binary relation registered for rewriting: `R a₁ ⋯ aₙ` relates `a[lhs_pos]` to `a[rhs_pos]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    pub arity: usize,
    pub lhs_pos: usize,
    pub rhs_pos: usize,
    pub refl: Option<Name>,
    pub trans: Option<Name>,
}

impl RelationInfo {
    pub fn new(arity: usize, lhs_pos: usize, rhs_pos: usize) -> RelationInfo {
        RelationInfo {
            arity,
            lhs_pos,
            rhs_pos,
            refl: None,
            trans: None,
        }
    }

    pub fn with_refl(mut self, refl: Name) -> RelationInfo {
        self.refl = Some(refl);
        self
    }

    pub fn with_trans(mut self, trans: Name) -> RelationInfo {
        self.trans = Some(trans);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReducibilityStatus {
    Reducible,
    #[default]
    Semireducible,
    Irreducible,
}

#[derive(Debug, Clone, Default)]
struct AttributeEntries {
    // newest first
    instances: im::Vector<(Name, u32)>,
    fingerprint: u64,
}

#[derive(Debug, Clone)]
struct EnvironmentInner {
    id: usize,
    ancestors: im::HashSet<usize>,
    decls: im::HashMap<Name, Declaration>,
    relations: im::HashMap<Name, RelationInfo>,
    attributes: im::HashMap<Name, AttributeEntries>,
    reducibility: im::HashMap<Name, ReducibilityStatus>,
    reducibility_fingerprint: u64,
}

/// An immutable snapshot of declarations and their annotations.
///
/// Every extension yields a new environment that records its ancestors, so a cache can tell
/// whether a later environment was derived from the one it was built against.
#[derive(Debug, Clone)]
pub struct Environment(Arc<EnvironmentInner>);

static ENV_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn mix(seed: u64, value: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Environment {
        Environment(Arc::new(EnvironmentInner {
            id: ENV_COUNTER.fetch_add(1, Ordering::Relaxed),
            ancestors: im::HashSet::new(),
            decls: im::HashMap::new(),
            relations: im::HashMap::new(),
            attributes: im::HashMap::new(),
            reducibility: im::HashMap::new(),
            reducibility_fingerprint: 0,
        }))
    }

    fn extend(&self, f: impl FnOnce(&mut EnvironmentInner)) -> Environment {
        let mut inner = (*self.0).clone();
        inner.ancestors.insert(self.0.id);
        inner.id = ENV_COUNTER.fetch_add(1, Ordering::Relaxed);
        f(&mut inner);
        Environment(Arc::new(inner))
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Checks if `self` was obtained by extending `ancestor` (or is `ancestor` itself).
    pub fn is_descendant(&self, ancestor: &Environment) -> bool {
        self.0.id == ancestor.0.id || self.0.ancestors.contains(&ancestor.0.id)
    }

    pub fn add(&self, decl: Declaration) -> anyhow::Result<Environment> {
        ensure!(decl.name.is_valid(), "invalid declaration name: '{}'", decl.name);
        if self.0.decls.contains_key(&decl.name) {
            bail!("already defined: {}", decl.name);
        }
        Ok(self.extend(|inner| {
            inner.decls.insert(decl.name.clone(), decl);
        }))
    }

    pub fn get(&self, name: &Name) -> Option<&Declaration> {
        self.0.decls.get(name)
    }

    pub fn add_relation(&self, name: Name, info: RelationInfo) -> anyhow::Result<Environment> {
        ensure!(self.get(&name).is_some(), "unknown relation: {name}");
        ensure!(
            info.lhs_pos < info.arity && info.rhs_pos < info.arity,
            "invalid argument positions for relation {name}"
        );
        Ok(self.extend(|inner| {
            inner.relations.insert(name, info);
        }))
    }

    pub fn relation_info(&self, name: &Name) -> Option<&RelationInfo> {
        self.0.relations.get(name)
    }

    /// Relations usable for rewriting are the reflexive and transitive ones.
    pub fn is_simp_relation(&self, name: &Name) -> bool {
        self.is_refl_relation(name) && self.is_trans_relation(name)
    }

    pub fn is_refl_relation(&self, name: &Name) -> bool {
        self.relation_info(name).is_some_and(|info| info.refl.is_some())
    }

    pub fn is_trans_relation(&self, name: &Name) -> bool {
        self.relation_info(name).is_some_and(|info| info.trans.is_some())
    }

    /// Tags `decl` with `attr`. A previous tag of the same declaration is replaced.
    pub fn add_attribute_instance(&self, attr: &Name, decl: &Name, prio: u32) -> Environment {
        self.extend(|inner| {
            let mut entries = inner.attributes.get(attr).cloned().unwrap_or_default();
            entries.instances.retain(|(name, _)| name != decl);
            entries.instances.push_front((decl.clone(), prio));
            entries.fingerprint = mix(entries.fingerprint, &(decl.as_str(), prio));
            inner.attributes.insert(attr.clone(), entries);
        })
    }

    /// Declarations tagged with `attr`, newest first.
    pub fn attribute_instances(&self, attr: &Name) -> Vec<(Name, u32)> {
        match self.0.attributes.get(attr) {
            Some(entries) => entries.instances.iter().cloned().collect(),
            None => vec![],
        }
    }

    pub fn has_attribute(&self, attr: &Name, decl: &Name) -> bool {
        self.attribute_priority(attr, decl).is_some()
    }

    pub fn attribute_priority(&self, attr: &Name, decl: &Name) -> Option<u32> {
        let entries = self.0.attributes.get(attr)?;
        entries
            .instances
            .iter()
            .find(|(name, _)| name == decl)
            .map(|&(_, prio)| prio)
    }

    /// Changes whenever a declaration is tagged with `attr`.
    pub fn attribute_fingerprint(&self, attr: &Name) -> u64 {
        self.0
            .attributes
            .get(attr)
            .map_or(0, |entries| entries.fingerprint)
    }

    pub fn set_reducibility(&self, name: &Name, status: ReducibilityStatus) -> Environment {
        self.extend(|inner| {
            inner.reducibility.insert(name.clone(), status);
            inner.reducibility_fingerprint =
                mix(inner.reducibility_fingerprint, &(name.as_str(), status));
        })
    }

    pub fn reducibility(&self, name: &Name) -> ReducibilityStatus {
        self.0.reducibility.get(name).copied().unwrap_or_default()
    }

    pub fn reducibility_fingerprint(&self) -> u64 {
        self.0.reducibility_fingerprint
    }
}
