//! Splitting a proof of a compound proposition into conditional equations.

use std::collections::HashSet;
use std::slice;

use crate::builtin::{
    is_and, is_ite, is_not, mk_and_elim, mk_false, mk_iff, mk_iff_false_intro, mk_iff_true_intro,
    mk_not, mk_true, IMPLIES_OF_IF_NEG, IMPLIES_OF_IF_POS,
};
use crate::classify::{RelationApp, RelationExt};
use crate::ctx::TypeContext;
use crate::tt::{mk_const, BinderInfo, Expr, Id, Name};

struct Splitter<'a> {
    ctx: &'a mut TypeContext,
}

impl Splitter<'_> {
    fn lift(&self, local: &Expr, ceqvs: Vec<(Expr, Expr)>) -> Vec<(Expr, Expr)> {
        let locals = slice::from_ref(local);
        ceqvs
            .into_iter()
            .map(|(e, h)| (self.ctx.mk_pi(locals, &e), self.ctx.mk_lambda(locals, &h)))
            .collect()
    }

    fn is_relation(&self, e: &Expr) -> bool {
        self.ctx.env().is_simp_relation_app(e)
    }

    fn apply(&mut self, e: &Expr, h: &Expr, restricted: bool) -> Vec<(Expr, Expr)> {
        if self.is_relation(e) {
            return vec![(e.clone(), h.clone())];
        }
        if let Some(a) = is_not(e) {
            let new_e = mk_iff(a.clone(), mk_false());
            let new_h = mk_iff_false_intro(a, h.clone());
            return vec![(new_e, new_h)];
        }
        if let Some((a, b)) = is_and(e) {
            let h1 = mk_and_elim(true, a.clone(), b.clone(), h.clone());
            let h2 = mk_and_elim(false, a.clone(), b.clone(), h.clone());
            let mut ceqvs = self.apply(&a, &h1, restricted);
            ceqvs.extend(self.apply(&b, &h2, restricted));
            return ceqvs;
        }
        if let Expr::Pi(binder) = e {
            let local = self.ctx.mk_local_for(binder);
            let new_e = binder.body.instantiate1(&local);
            let new_h = h.apply([local.clone()]);
            let ceqvs = self.apply(&new_e, &new_h, restricted);
            if ceqvs.is_empty() {
                return ceqvs;
            }
            if ceqvs.len() == 1 && ceqvs[0].0 == new_e && ceqvs[0].1 == new_h {
                return vec![(e.clone(), h.clone())];
            }
            return self.lift(&local, ceqvs);
        }
        if let Some([c, hdec, _, t, f]) = is_ite(e) {
            if self.ctx.is_prop(e) {
                return self.split_ite(c, hdec, t, f, h, restricted);
            }
        }
        if !restricted {
            let new_e = self.ctx.whnf(e);
            if new_e != *e {
                let ceqvs = self.apply(&new_e, h, true);
                if !ceqvs.is_empty() {
                    return ceqvs;
                }
            }
            if self.ctx.is_prop(e) {
                let new_e = mk_iff(e.clone(), mk_true());
                let new_h = mk_iff_true_intro(e.clone(), h.clone());
                return vec![(new_e, new_h)];
            }
        }
        vec![]
    }

    // `H : ite c t f` gives `λ (Hc : c), implies_of_if_pos H Hc : c → t` and the negative
    // counterpart over `¬c`.
    fn split_ite(
        &mut self,
        c: Expr,
        hdec: Expr,
        t: Expr,
        f: Expr,
        h: &Expr,
        restricted: bool,
    ) -> Vec<(Expr, Expr)> {
        let hc = self.ctx.mk_local(Name::from_str("h"), c.clone(), BinderInfo::Default);
        let hnc = self
            .ctx
            .mk_local(Name::from_str("h"), mk_not(c.clone()), BinderInfo::Default);
        let pos = mk_const(IMPLIES_OF_IF_POS.clone(), vec![]).apply([
            c.clone(),
            t.clone(),
            f.clone(),
            hdec.clone(),
            h.clone(),
            hc.clone(),
        ]);
        let neg = mk_const(IMPLIES_OF_IF_NEG.clone(), vec![]).apply([
            c,
            t.clone(),
            f.clone(),
            hdec,
            h.clone(),
            hnc.clone(),
        ]);
        let pos_ceqvs = self.apply(&t, &pos, restricted);
        let neg_ceqvs = self.apply(&f, &neg, restricted);
        let mut ceqvs = self.lift(&hc, pos_ceqvs);
        ceqvs.extend(self.lift(&hnc, neg_ceqvs));
        ceqvs
    }
}

fn remove_found(e: &Expr, to_find: &mut HashSet<Id>) {
    e.for_each(&mut |e, _| match e {
        Expr::Local(local) => {
            to_find.remove(&local.id);
            false
        }
        _ => e.metadata().has_local,
    });
}

/// Checks if `e` is usable as a rewrite rule: metavariable free, every non-propositional
/// explicit argument is determined by the lhs, and the lhs occurs neither in the rhs nor
/// in the hypotheses.
pub fn is_ceqv(ctx: &mut TypeContext, e: &Expr) -> bool {
    if e.has_meta() {
        return false;
    }
    let env = ctx.env().clone();
    let mut to_find = HashSet::new();
    let mut hypotheses = vec![];
    let mut e = e.clone();
    while let Expr::Pi(binder) = e.clone() {
        if !to_find.is_empty() {
            remove_found(&binder.binder_type, &mut to_find);
        }
        let local = ctx.mk_local_for(&binder);
        if binder.binder_info.is_inst_implicit() {
            // resolved by instance synthesis
        } else if ctx.is_prop(&binder.binder_type) {
            hypotheses.push(binder.binder_type.clone());
        } else if let Some(local) = local.as_local() {
            to_find.insert(local.id);
        }
        e = binder.body.instantiate1(&local);
    }
    let Some(RelationApp { lhs, rhs, .. }) = env.simp_relation_app(&e) else {
        return false;
    };
    remove_found(&lhs, &mut to_find);
    if !to_find.is_empty() {
        return false;
    }
    if rhs.occurs(&lhs) {
        return false;
    }
    !hypotheses.iter().any(|hyp| hyp.occurs(&lhs))
}

/// Splits the proof `h` of `e` into conditional equations `(∀ xs, lhs ~ rhs, proof)`.
/// Candidates rejected by [is_ceqv] are dropped. `e` is expected to be free of `let`.
pub fn to_ceqvs(ctx: &mut TypeContext, e: &Expr, h: &Expr) -> Vec<(Expr, Expr)> {
    let ceqvs = Splitter { ctx: &mut *ctx }.apply(e, h, false);
    ceqvs
        .into_iter()
        .filter(|(e, _)| {
            let keep = is_ceqv(ctx, e);
            if !keep {
                log::trace!(target: "simp_lemmas", "dropping conditional equation {e}");
            }
            keep
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{core_environment, mk_and, mk_eq, ITE};
    use crate::env::{Declaration, Environment};
    use crate::tt::{mk_arrow, mk_local, mk_pi_locals, mk_prop, mk_sort, Level};

    struct Fixture {
        env: Environment,
    }

    impl Fixture {
        fn new() -> Self {
            let env = core_environment()
                .unwrap()
                .add(Declaration::axiom(Name::from_str("nat"), vec![], mk_sort(Level::of_nat(1))))
                .unwrap();
            Fixture { env }
                .with_axiom("nat.zero", nat())
                .with_axiom("p", mk_prop())
                .with_axiom("q", mk_prop())
                .with_axiom("f", mk_arrow(nat(), nat()))
        }

        fn with_axiom(mut self, name: &str, ty: Expr) -> Self {
            self.env = self
                .env
                .add(Declaration::axiom(Name::from_str(name), vec![], ty))
                .unwrap();
            self
        }

        fn ctx(&self) -> TypeContext {
            TypeContext::new(self.env.clone())
        }
    }

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

    #[test]
    fn equation_is_kept_unchanged() {
        let fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let e = eq_nat(constant("f").apply([constant("nat.zero")]), constant("nat.zero"));
        let h = constant("H");
        assert_eq!(to_ceqvs(&mut ctx, &e, &h), vec![(e, h)]);
    }

    #[test]
    fn conjunction_splits_left_before_right() {
        let fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let left = eq_nat(constant("f").apply([constant("nat.zero")]), constant("nat.zero"));
        let e = mk_and(left.clone(), constant("p"));
        let h = constant("H");

        let ceqvs = to_ceqvs(&mut ctx, &e, &h);
        let expected_left = to_ceqvs(&mut ctx, &left, &mk_and_elim(true, left.clone(), constant("p"), h.clone()));
        let expected_right = to_ceqvs(&mut ctx, &constant("p"), &mk_and_elim(false, left.clone(), constant("p"), h.clone()));
        assert_eq!(ceqvs.len(), 2);
        assert_eq!(ceqvs[..1], expected_left[..]);
        assert_eq!(ceqvs[1..], expected_right[..]);
        assert_eq!(ceqvs[1].0, mk_iff(constant("p"), mk_true()));
    }

    #[test]
    fn unfolded_conjunction_drops_opaque_propositions() {
        let left = eq_nat(constant("f").apply([constant("nat.zero")]), constant("nat.zero"));
        let body = mk_and(left.clone(), constant("p"));
        let mut fixture = Fixture::new();
        fixture.env = fixture
            .env
            .add(Declaration::definition(Name::from_str("d"), vec![], mk_prop(), body))
            .unwrap();
        let mut ctx = fixture.ctx();
        let h = constant("H");
        let ceqvs = to_ceqvs(&mut ctx, &constant("d"), &h);
        assert_eq!(
            ceqvs,
            vec![(left.clone(), mk_and_elim(true, left, constant("p"), h))]
        );
    }

    #[test]
    fn negation_becomes_iff_false() {
        let fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let h = constant("H");
        let ceqvs = to_ceqvs(&mut ctx, &mk_not(constant("q")), &h);
        assert_eq!(
            ceqvs,
            vec![(
                mk_iff(constant("q"), mk_false()),
                mk_iff_false_intro(constant("q"), h)
            )]
        );
    }

    #[test]
    fn pi_returns_same_term_when_body_is_unchanged() {
        let fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let n = local("n", nat());
        let e = mk_pi_locals(&[n.clone()], &eq_nat(constant("f").apply([n.clone()]), n));
        let h = constant("H");
        let ceqvs = to_ceqvs(&mut ctx, &e, &h);
        assert_eq!(ceqvs.len(), 1);
        assert!(ceqvs[0].0.ptr_eq(&e));
        assert!(ceqvs[0].1.ptr_eq(&h));
    }

    #[test]
    fn pi_over_conjunction_is_regeneralized() {
        let fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let n = local("n", nat());
        let fx = constant("f").apply([n.clone()]);
        let body = mk_and(eq_nat(fx.clone(), n.clone()), eq_nat(n.clone(), fx.clone()));
        let e = mk_pi_locals(&[n.clone()], &body);
        let ceqvs = to_ceqvs(&mut ctx, &e, &constant("H"));
        // `∀ n, n = f n` is dropped: its lhs occurs in its rhs
        assert_eq!(ceqvs.len(), 1);
        assert_eq!(ceqvs[0].0, mk_pi_locals(&[n.clone()], &eq_nat(fx, n)));
        assert!(ceqvs[0].1.is_lambda());
    }

    #[test]
    fn ite_splits_into_guarded_branches() {
        let fixture = Fixture::new()
            .with_axiom("c", mk_prop())
            .with_axiom("inst", constant("decidable").apply([constant("c")]));
        let mut ctx = fixture.ctx();
        let e = mk_const(ITE.clone(), vec![Level::of_nat(1)]).apply([
            constant("c"),
            constant("inst"),
            mk_prop(),
            constant("p"),
            constant("q"),
        ]);
        let ceqvs = to_ceqvs(&mut ctx, &e, &constant("H"));
        assert_eq!(ceqvs.len(), 2);
        let hc = local("h", constant("c"));
        let hnc = local("h", mk_not(constant("c")));
        assert_eq!(
            ceqvs[0].0,
            mk_pi_locals(&[hc], &mk_iff(constant("p"), mk_true()))
        );
        assert_eq!(
            ceqvs[1].0,
            mk_pi_locals(&[hnc], &mk_iff(constant("q"), mk_true()))
        );
    }

    #[test]
    fn non_propositions_yield_nothing() {
        let fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        assert!(to_ceqvs(&mut ctx, &constant("nat.zero"), &constant("H")).is_empty());
    }

    #[test]
    fn is_ceqv_requires_arguments_in_lhs() {
        let fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let n = local("n", nat());
        let m = local("m", nat());
        // ∀ n m, f n = m : `m` is not determined by the lhs
        let e = mk_pi_locals(&[n.clone(), m.clone()], &eq_nat(constant("f").apply([n.clone()]), m.clone()));
        assert!(!is_ceqv(&mut ctx, &e));
        // ∀ n, (f n = n) → f n = nat.zero : lhs occurs in the hypothesis
        let hyp = local("h", eq_nat(constant("f").apply([n.clone()]), n.clone()));
        let e = mk_pi_locals(
            &[n.clone(), hyp],
            &eq_nat(constant("f").apply([n.clone()]), constant("nat.zero")),
        );
        assert!(!is_ceqv(&mut ctx, &e));
        let e = mk_pi_locals(&[n.clone()], &eq_nat(constant("f").apply([n]), constant("nat.zero")));
        assert!(is_ceqv(&mut ctx, &e));
    }
}
