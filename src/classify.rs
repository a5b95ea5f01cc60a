use easy_ext::ext;

use crate::builtin::{is_eq, EQ_REFL, RFL};
use crate::env::Environment;
use crate::tt::{Expr, Name};

/// `R a₁ ⋯ aₙ` split into the relation and the two related arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationApp {
    pub rel: Name,
    pub lhs: Expr,
    pub rhs: Expr,
}

#[ext(RelationExt)]
pub impl Environment {
    /// Recognises an application of a reflexive and transitive relation whose lhs/rhs
    /// positions are within the actual arguments.
    fn simp_relation_app(&self, e: &Expr) -> Option<RelationApp> {
        if !e.is_app() {
            return None;
        }
        let rel = e.head().const_name()?;
        if !self.is_simp_relation(rel) {
            return None;
        }
        let info = self.relation_info(rel)?;
        let args = e.args();
        let lhs = args.get(info.lhs_pos)?;
        let rhs = args.get(info.rhs_pos)?;
        Some(RelationApp {
            rel: rel.clone(),
            lhs: (*lhs).clone(),
            rhs: (*rhs).clone(),
        })
    }

    fn is_simp_relation_app(&self, e: &Expr) -> bool {
        self.simp_relation_app(e).is_some()
    }

    /// Checks if `name` is a definition of an equation `∀ xs, a = b` whose value is
    /// `λ xs, eq.refl _ _` (or `rfl`) and whose two sides differ syntactically.
    fn is_rfl_lemma(&self, name: &Name) -> bool {
        let Some(decl) = self.get(name) else {
            return false;
        };
        let Some(mut pf) = decl.value.clone() else {
            return false;
        };
        let mut ty = decl.ty.clone();
        while let Expr::Pi(ty_binder) = &ty {
            let Expr::Lam(pf_binder) = &pf else {
                return false;
            };
            let (next_ty, next_pf) = (ty_binder.body.clone(), pf_binder.body.clone());
            ty = next_ty;
            pf = next_pf;
        }
        let Some((lhs, rhs)) = is_eq(&ty) else {
            return false;
        };
        if !pf.is_app_of(&EQ_REFL, 2) && !pf.is_app_of(&RFL, 2) {
            return false;
        }
        lhs != rhs
    }
}

struct Permutation {
    target: Vec<Option<usize>>,
    source: Vec<Option<usize>>,
}

impl Permutation {
    fn new(num_binders: usize) -> Self {
        Permutation {
            target: vec![None; num_binders],
            source: vec![None; num_binders],
        }
    }

    fn matches(&mut self, lhs: &Expr, rhs: &Expr, offset: usize) -> bool {
        match (lhs, rhs) {
            (Expr::Var(l), Expr::Var(r)) => {
                let n = self.target.len();
                let Some(i) = l.index.checked_sub(offset).filter(|&i| i < n) else {
                    return l.index == r.index;
                };
                let Some(j) = r.index.checked_sub(offset).filter(|&j| j < n) else {
                    return false;
                };
                match (self.target[i], self.source[j]) {
                    (Some(k), _) => k == j,
                    (None, Some(_)) => false,
                    (None, None) => {
                        self.target[i] = Some(j);
                        self.source[j] = Some(i);
                        true
                    }
                }
            }
            (Expr::Sort(_), Expr::Sort(_))
            | (Expr::Const(_), Expr::Const(_))
            | (Expr::Local(_), Expr::Local(_))
            | (Expr::Meta(_), Expr::Meta(_)) => lhs == rhs,
            (Expr::App(l), Expr::App(r)) => {
                self.matches(&l.fun, &r.fun, offset) && self.matches(&l.arg, &r.arg, offset)
            }
            (Expr::Lam(l), Expr::Lam(r)) | (Expr::Pi(l), Expr::Pi(r)) => {
                self.matches(&l.binder_type, &r.binder_type, offset)
                    && self.matches(&l.body, &r.body, offset + 1)
            }
            (Expr::Macro(l), Expr::Macro(r)) => {
                l.def == r.def
                    && l.args.len() == r.args.len()
                    && l
                        .args
                        .iter()
                        .zip(&r.args)
                        .all(|(a, b)| self.matches(a, b, offset))
            }
            // callers eliminate `let` beforehand
            (Expr::Let(_), Expr::Let(_)) => false,
            _ => false,
        }
    }
}

/// Checks if `rhs` is `lhs` with the loose variables `#0 ⋯ #(num_binders-1)` renamed
/// bijectively. Other loose variables must coincide. `lhs` and `rhs` must be `let`-free.
pub fn is_permutation(lhs: &Expr, rhs: &Expr, num_binders: usize) -> bool {
    Permutation::new(num_binders).matches(lhs, rhs, 0)
}

/// Checks if the conditional equation `∀ xs, lhs ~ rhs` only permutes its variables `xs`.
pub fn detect_permutation(env: &Environment, rule: &Expr) -> bool {
    let mut num_binders = 0;
    let mut e = rule;
    while let Expr::Pi(inner) = e {
        num_binders += 1;
        e = &inner.body;
    }
    match env.simp_relation_app(e) {
        Some(app) => is_permutation(&app.lhs, &app.rhs, num_binders),
        None => false,
    }
}
