//! Validation of congruence lemmas.
//!
//! A congruence lemma has the shape
//!
//! ```text
//! ∀ xs, (∀ ys₁, a₁ ~₁ ?b₁ ys₁) → ⋯ → f xs ~ f xs'
//! ```
//!
//! where the lhs determines the variables `xs` and each hypothesis determines one more
//! variable through its rhs.

use std::collections::HashSet;

use crate::classify::{RelationApp, RelationExt};
use crate::ctx::TypeContext;
use crate::error::{CongrError, Error, Report};
use crate::lemma::{LemmaHeader, SimpLemma};
use crate::store::LemmaCollection;
use crate::tt::{mk_const, Expr, Id, Level, Name};

fn only_found_mvars(e: &Expr, found: &HashSet<Id>) -> bool {
    if !e.has_meta() {
        return true;
    }
    e.find(&mut |e, _| matches!(e, Expr::Meta(meta) if !found.contains(&meta.id)))
        .is_none()
}

/// Checks if `rhs` is `?m l₁ ⋯ lₙ` for a metavariable `?m` not found yet and locals `lᵢ`.
fn is_valid_hyp_rhs(rhs: &Expr, found: &mut HashSet<Id>) -> bool {
    let Expr::Meta(meta) = rhs.head() else {
        return false;
    };
    if found.contains(&meta.id) || !rhs.args().iter().all(|arg| arg.is_local()) {
        return false;
    }
    found.insert(meta.id);
    true
}

/// Checks if `lhs` is `B (x : ?m₁), ?m₂` or `B (x : ?m₁), ?m₂ x` for a binder `B`.
fn is_valid_binder_lhs(lhs: &Expr, found: &mut HashSet<Id>) -> bool {
    let Some(binder) = lhs.binder() else {
        return false;
    };
    let Expr::Meta(dom) = &binder.binder_type else {
        return false;
    };
    let body = match &binder.body {
        Expr::App(app) if matches!(&app.arg, Expr::Var(var) if var.index == 0) => &app.fun,
        body => body,
    };
    let Expr::Meta(body) = body else {
        return false;
    };
    if body.id == dom.id {
        return false;
    }
    found.insert(dom.id);
    found.insert(body.id);
    true
}

struct Builder<'a> {
    ctx: &'a mut TypeContext,
    found: HashSet<Id>,
}

impl Builder<'_> {
    fn check_args(&mut self, lhs: &Expr) -> Result<(), CongrError> {
        for arg in lhs.args() {
            if arg.is_sort() {
                continue;
            }
            let Expr::Meta(meta) = arg else {
                return Err(CongrError::ArgumentNotVariable);
            };
            if !self.found.insert(meta.id) {
                return Err(CongrError::ArgumentNotVariable);
            }
        }
        Ok(())
    }

    fn check_lhs(&mut self, lhs: &Expr, rhs: &Expr) -> Result<(), CongrError> {
        if let Expr::Const(lhs_fn) = lhs.head() {
            let same_head = matches!(rhs.head(), Expr::Const(rhs_fn) if rhs_fn.name == lhs_fn.name);
            if !same_head || lhs.num_args() != rhs.num_args() {
                return Err(CongrError::ShapeMismatch {
                    head: lhs_fn.name.to_string(),
                });
            }
            return self.check_args(lhs);
        }
        // `?f x₁ ⋯ xₙ ~ ?f y₁ ⋯ yₙ`, the function itself is determined by the lhs
        if let (true, Expr::Meta(lhs_fn)) = (lhs.is_app(), lhs.head()) {
            let same_head = matches!(rhs.head(), Expr::Meta(rhs_fn) if rhs_fn.id == lhs_fn.id);
            if !same_head || lhs.num_args() != rhs.num_args() {
                return Err(CongrError::ShapeMismatch {
                    head: format!("?{}", lhs_fn.name),
                });
            }
            self.found.insert(lhs_fn.id);
            return self.check_args(lhs);
        }
        if lhs.is_binding() {
            if lhs.is_pi() != rhs.is_pi() || lhs.is_lambda() != rhs.is_lambda() {
                return Err(CongrError::InvalidBinderShape);
            }
            if !is_valid_binder_lhs(lhs, &mut self.found) {
                return Err(CongrError::InvalidBinderShape);
            }
            return Ok(());
        }
        Err(CongrError::NotApplicationOrBinder)
    }

    /// Returns the hypothesis metavariables, in order.
    fn check_hyps(&mut self, emetas: &[Expr], explicits: &[bool]) -> Result<Vec<Expr>, CongrError> {
        let mut congr_hyps = vec![];
        for (i, (mvar, &explicit)) in emetas.iter().zip(explicits).enumerate() {
            let Some(meta) = mvar.as_meta() else {
                continue;
            };
            if !explicit || self.found.contains(&meta.id) {
                continue;
            }
            let mut locals = vec![];
            let mut ty = meta.ty.clone();
            while let Expr::Pi(binder) = ty.clone() {
                let local = self.ctx.mk_local_for(&binder);
                ty = binder.body.instantiate1(&local);
                locals.push(local);
            }
            let Some(RelationApp { lhs, rhs, .. }) = self.ctx.env().simp_relation_app(&ty) else {
                continue;
            };
            for (j, local) in locals.iter().enumerate() {
                let Some(local) = local.as_local() else {
                    continue;
                };
                if !only_found_mvars(&local.ty, &self.found) {
                    return Err(CongrError::UnresolvedHypothesisParameter {
                        arg: j + 1,
                        param: i + 1,
                    });
                }
            }
            if !only_found_mvars(&lhs, &self.found) {
                return Err(CongrError::UnresolvedHypothesisLhs { param: i + 1 });
            }
            if !is_valid_hyp_rhs(&rhs, &mut self.found) {
                return Err(CongrError::InvalidHypothesisRhs { param: i + 1 });
            }
            self.found.insert(meta.id);
            congr_hyps.push(mvar.clone());
        }
        Ok(congr_hyps)
    }
}

fn build_congruence(
    ctx: &mut TypeContext,
    name: &Name,
    priority: u32,
) -> Result<Option<(Name, SimpLemma)>, CongrError> {
    let env = ctx.env().clone();
    let Some(decl) = env.get(name) else {
        return Ok(None);
    };
    let umetas: Vec<Level> = decl
        .univ_params
        .iter()
        .map(|_| ctx.mk_tmp_univ_mvar())
        .collect();
    let mut rule = ctx.whnf(&decl.instantiate_type_univ_params(&umetas));
    let mut proof = mk_const(name.clone(), umetas.clone());
    let mut emetas = vec![];
    let mut instances = vec![];
    let mut explicits = vec![];
    while let Expr::Pi(binder) = rule.clone() {
        let mvar = ctx.mk_tmp_mvar(binder.binder_type.clone());
        explicits.push(binder.binder_info.is_explicit());
        instances.push(binder.binder_info.is_inst_implicit());
        rule = ctx.whnf(&binder.body.instantiate1(&mvar));
        proof = proof.apply([mvar.clone()]);
        emetas.push(mvar);
    }
    let Some(RelationApp { rel, lhs, rhs }) = env.simp_relation_app(&rule) else {
        return Err(CongrError::NotARelation);
    };
    let mut builder = Builder {
        ctx,
        found: HashSet::new(),
    };
    builder.check_lhs(&lhs, &rhs)?;
    let congr_hyps = builder.check_hyps(&emetas, &explicits)?;
    emetas.reverse();
    instances.reverse();
    let header = LemmaHeader {
        id: name.clone(),
        umetas,
        emetas,
        instances,
        lhs,
        rhs,
        priority,
    };
    Ok(Some((rel, SimpLemma::congr(header, proof, congr_hyps))))
}

/// Adds the congruence lemma stated by the declaration `name`.
pub fn add_congruence(
    ctx: &mut TypeContext,
    lemmas: &LemmaCollection,
    name: &Name,
    priority: u32,
    report: &mut Report,
) -> Result<LemmaCollection, Error> {
    match ctx.scoped(|ctx| build_congruence(ctx, name, priority)) {
        Ok(Some((rel, lemma))) => {
            log::debug!(target: "simp_lemmas", "{lemma}");
            let mut new_lemmas = lemmas.clone();
            new_lemmas.insert(&rel, lemma);
            Ok(new_lemmas)
        }
        Ok(None) => {
            report.fail(Error::UnknownDeclaration { name: name.clone() })?;
            Ok(lemmas.clone())
        }
        Err(reason) => {
            report.fail(Error::InvalidCongrLemma {
                name: name.clone(),
                reason,
            })?;
            Ok(lemmas.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{core_environment, mk_eq, mk_iff, EQ};
    use crate::env::{Declaration, Environment};
    use crate::tt::{mk_arrow, mk_local, mk_pi_locals, mk_prop, mk_sort, BinderInfo, Id};

    fn constant(name: &str) -> Expr {
        mk_const(Name::from_str(name), vec![])
    }

    fn nat() -> Expr {
        constant("nat")
    }

    fn eq_nat(a: Expr, b: Expr) -> Expr {
        mk_eq(Level::of_nat(1), nat(), a, b)
    }

    fn local(name: &str, ty: Expr) -> Expr {
        mk_local(Id::fresh(), Name::from_str(name), ty, BinderInfo::Default)
    }

    fn env_with(name: &str, ty: Expr) -> Environment {
        core_environment()
            .unwrap()
            .add(Declaration::axiom(Name::from_str("nat"), vec![], mk_sort(Level::of_nat(1))))
            .unwrap()
            .add(Declaration::axiom(Name::from_str("succ"), vec![], mk_arrow(nat(), nat())))
            .unwrap()
            .add(Declaration::axiom(Name::from_str("pred"), vec![], mk_arrow(nat(), nat())))
            .unwrap()
            .add(Declaration::axiom(Name::from_str(name), vec![], ty))
            .unwrap()
    }

    fn add(env: &Environment, name: &str, report: &mut Report) -> Result<LemmaCollection, Error> {
        let mut ctx = TypeContext::new(env.clone());
        add_congruence(
            &mut ctx,
            &LemmaCollection::default(),
            &Name::from_str(name),
            1000,
            report,
        )
    }

    #[test]
    fn succ_congr_has_one_hypothesis() {
        // ∀ a a', a = a' → succ a = succ a'
        let a = local("a", nat());
        let a2 = local("a'", nat());
        let h = local("h", eq_nat(a.clone(), a2.clone()));
        let ty = mk_pi_locals(
            &[a.clone(), a2.clone(), h],
            &eq_nat(constant("succ").apply([a]), constant("succ").apply([a2])),
        );
        let env = env_with("succ_congr", ty);
        let lemmas = add(&env, "succ_congr", &mut Report::hard()).unwrap();
        let mut found = vec![];
        lemmas.for_each_congr(|rel, lemma| {
            assert_eq!(rel, &*EQ);
            found.push(lemma.clone());
        });
        assert_eq!(found.len(), 1);
        let lemma = &found[0];
        assert!(lemma.is_congr());
        assert_eq!(lemma.num_emeta(), 3);
        // emetas are innermost first, so the hypothesis comes first
        assert_eq!(lemma.congr_hyps(), &lemma.emetas()[..1]);
        let mut simp = 0;
        lemmas.for_each(|_, _| simp += 1);
        assert_eq!(simp, 0);
    }

    #[test]
    fn distinct_heads_are_rejected() {
        let x = local("x", nat());
        let ty = mk_pi_locals(
            &[x.clone()],
            &eq_nat(constant("succ").apply([x.clone()]), constant("pred").apply([x])),
        );
        let env = env_with("bad", ty);
        let err = add(&env, "bad", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCongrLemma {
                reason: CongrError::ShapeMismatch { .. },
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "invalid [congr] lemma 'bad', resulting type is not of the form (succ ...) ~ (succ ...)"
        );

        let mut report = Report::soft();
        let lemmas = add(&env, "bad", &mut report).unwrap();
        assert!(lemmas.is_empty());
        assert_eq!(report.diagnostics().len(), 1);
    }

    #[test]
    fn repeated_argument_is_rejected() {
        let x = local("x", nat());
        let f = |a: Expr, b: Expr| constant("nat.add").apply([a, b]);
        let ty = mk_pi_locals(&[x.clone()], &eq_nat(f(x.clone(), x.clone()), f(x.clone(), x)));
        let env = env_with("nat.add", mk_arrow(nat(), mk_arrow(nat(), nat())))
            .add(Declaration::axiom(Name::from_str("dup"), vec![], ty))
            .unwrap();
        let err = add(&env, "dup", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCongrLemma {
                reason: CongrError::ArgumentNotVariable,
                ..
            }
        ));
    }

    #[test]
    fn not_a_relation() {
        let env = env_with("plain", mk_arrow(nat(), nat()));
        let err = add(&env, "plain", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCongrLemma {
                reason: CongrError::NotARelation,
                ..
            }
        ));
    }

    #[test]
    fn hypothesis_rhs_must_be_new() {
        // ∀ a a', a = a → succ a = succ a'
        let a = local("a", nat());
        let a2 = local("a'", nat());
        let h = local("h", eq_nat(a.clone(), a.clone()));
        let ty = mk_pi_locals(
            &[a.clone(), a2.clone(), h],
            &eq_nat(constant("succ").apply([a]), constant("succ").apply([a2])),
        );
        let env = env_with("weird", ty);
        let err = add(&env, "weird", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCongrLemma {
                reason: CongrError::InvalidHypothesisRhs { param: 3 },
                ..
            }
        ));
    }

    #[test]
    fn binder_domain_must_be_a_variable() {
        // ∀ p q, (∀ x : nat, p) ↔ (∀ x : nat, q)
        let p = local("p", mk_prop());
        let q = local("q", mk_prop());
        let x = local("x", nat());
        let ty = mk_pi_locals(
            &[p.clone(), q.clone()],
            &mk_iff(mk_pi_locals(&[x.clone()], &p), mk_pi_locals(&[x], &q)),
        );
        let env = env_with("forall_nat_congr", ty);
        let err = add(&env, "forall_nat_congr", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCongrLemma {
                reason: CongrError::InvalidBinderShape,
                ..
            }
        ));
    }

    #[test]
    fn hypothesis_binders_must_be_determined() {
        // ∀ a a' b, (b = b → a = a') → succ a = succ a'
        let a = local("a", nat());
        let a2 = local("a'", nat());
        let b = local("b", nat());
        let y = local("y", eq_nat(b.clone(), b.clone()));
        let h = local("h", mk_pi_locals(&[y], &eq_nat(a.clone(), a2.clone())));
        let ty = mk_pi_locals(
            &[a.clone(), a2.clone(), b, h],
            &eq_nat(constant("succ").apply([a]), constant("succ").apply([a2])),
        );
        let env = env_with("succ_congr_under", ty);
        let err = add(&env, "succ_congr_under", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCongrLemma {
                reason: CongrError::UnresolvedHypothesisParameter { arg: 1, param: 4 },
                ..
            }
        ));
    }

    #[test]
    fn hypothesis_lhs_must_be_determined() {
        // ∀ a a' b, b = a' → succ a = succ a'
        let a = local("a", nat());
        let a2 = local("a'", nat());
        let b = local("b", nat());
        let h = local("h", eq_nat(b.clone(), a2.clone()));
        let ty = mk_pi_locals(
            &[a.clone(), a2.clone(), b, h],
            &eq_nat(constant("succ").apply([a]), constant("succ").apply([a2])),
        );
        let env = env_with("succ_congr_other", ty);
        let err = add(&env, "succ_congr_other", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCongrLemma {
                reason: CongrError::UnresolvedHypothesisLhs { param: 4 },
                ..
            }
        ));
    }

    #[test]
    fn function_variable_head() {
        // ∀ f g a, f a = g a
        let fn_ty = mk_arrow(nat(), nat());
        let f = local("f", fn_ty.clone());
        let g = local("g", fn_ty);
        let a = local("a", nat());
        let ty = mk_pi_locals(
            &[f.clone(), g.clone(), a.clone()],
            &eq_nat(f.apply([a.clone()]), g.apply([a])),
        );
        let env = env_with("fun_ext_bad", ty);
        let err = add(&env, "fun_ext_bad", &mut Report::hard()).unwrap_err();
        assert!(matches!(
            &err,
            Error::InvalidCongrLemma {
                reason: CongrError::ShapeMismatch { head },
                ..
            } if head == "?x_0"
        ));
    }

    #[test]
    fn unknown_declaration() {
        let env = env_with("x", nat());
        assert!(matches!(
            add(&env, "missing", &mut Report::hard()),
            Err(Error::UnknownDeclaration { .. })
        ));
    }
}
