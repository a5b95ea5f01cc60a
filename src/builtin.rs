//! The core logical constants the lemma builders recognise, and an environment declaring them.

use once_cell::sync::Lazy;

use crate::env::{Declaration, Environment, RelationInfo};
use crate::tt::{
    mk_arrow, mk_const, mk_lambda_locals, mk_local, mk_pi_locals, mk_prop, mk_sort, BinderInfo,
    Expr, Id, Level, Name,
};

pub static TRUE: Lazy<Name> = Lazy::new(|| Name::from_str("true"));
pub static TRUE_INTRO: Lazy<Name> = Lazy::new(|| Name::from_str("true.intro"));
pub static FALSE: Lazy<Name> = Lazy::new(|| Name::from_str("false"));
pub static NOT: Lazy<Name> = Lazy::new(|| Name::from_str("not"));
pub static AND: Lazy<Name> = Lazy::new(|| Name::from_str("and"));
pub static AND_INTRO: Lazy<Name> = Lazy::new(|| Name::from_str("and.intro"));
pub static AND_ELIM_LEFT: Lazy<Name> = Lazy::new(|| Name::from_str("and.elim_left"));
pub static AND_ELIM_RIGHT: Lazy<Name> = Lazy::new(|| Name::from_str("and.elim_right"));
pub static IFF: Lazy<Name> = Lazy::new(|| Name::from_str("iff"));
pub static IFF_REFL: Lazy<Name> = Lazy::new(|| Name::from_str("iff.refl"));
pub static IFF_TRANS: Lazy<Name> = Lazy::new(|| Name::from_str("iff.trans"));
pub static IFF_TRUE_INTRO: Lazy<Name> = Lazy::new(|| Name::from_str("iff_true_intro"));
pub static IFF_FALSE_INTRO: Lazy<Name> = Lazy::new(|| Name::from_str("iff_false_intro"));
pub static EQ: Lazy<Name> = Lazy::new(|| Name::from_str("eq"));
pub static EQ_REFL: Lazy<Name> = Lazy::new(|| Name::from_str("eq.refl"));
pub static EQ_TRANS: Lazy<Name> = Lazy::new(|| Name::from_str("eq.trans"));
pub static RFL: Lazy<Name> = Lazy::new(|| Name::from_str("rfl"));
pub static DECIDABLE: Lazy<Name> = Lazy::new(|| Name::from_str("decidable"));
pub static ITE: Lazy<Name> = Lazy::new(|| Name::from_str("ite"));
pub static IMPLIES_OF_IF_POS: Lazy<Name> = Lazy::new(|| Name::from_str("implies_of_if_pos"));
pub static IMPLIES_OF_IF_NEG: Lazy<Name> = Lazy::new(|| Name::from_str("implies_of_if_neg"));

fn constant(name: &Name) -> Expr {
    mk_const(name.clone(), vec![])
}

pub fn mk_true() -> Expr {
    constant(&TRUE)
}

pub fn mk_false() -> Expr {
    constant(&FALSE)
}

pub fn mk_not(a: Expr) -> Expr {
    constant(&NOT).apply([a])
}

pub fn mk_and(a: Expr, b: Expr) -> Expr {
    constant(&AND).apply([a, b])
}

pub fn mk_iff(a: Expr, b: Expr) -> Expr {
    constant(&IFF).apply([a, b])
}

/// `@eq.{l} ty a b`
pub fn mk_eq(level: Level, ty: Expr, a: Expr, b: Expr) -> Expr {
    mk_const(EQ.clone(), vec![level]).apply([ty, a, b])
}

/// `and.elim_left a b h`, `and.elim_right a b h`
pub fn mk_and_elim(left: bool, a: Expr, b: Expr, h: Expr) -> Expr {
    let name = if left { &AND_ELIM_LEFT } else { &AND_ELIM_RIGHT };
    constant(name).apply([a, b, h])
}

pub fn mk_iff_true_intro(a: Expr, h: Expr) -> Expr {
    constant(&IFF_TRUE_INTRO).apply([a, h])
}

pub fn mk_iff_false_intro(a: Expr, h: Expr) -> Expr {
    constant(&IFF_FALSE_INTRO).apply([a, h])
}

/// Recognises `not a` and `a → false`.
pub fn is_not(e: &Expr) -> Option<Expr> {
    if e.is_app_of(&NOT, 1) {
        return e.args().first().map(|a| (*a).clone());
    }
    match e {
        Expr::Pi(inner) if inner.body.is_const_of(&FALSE) => Some(inner.binder_type.clone()),
        _ => None,
    }
}

pub fn is_and(e: &Expr) -> Option<(Expr, Expr)> {
    if !e.is_app_of(&AND, 2) {
        return None;
    }
    let args = e.args();
    Some((args[0].clone(), args[1].clone()))
}

/// `@eq α a b` gives `(a, b)`.
pub fn is_eq(e: &Expr) -> Option<(Expr, Expr)> {
    if !e.is_app_of(&EQ, 3) {
        return None;
    }
    let args = e.args();
    Some((args[1].clone(), args[2].clone()))
}

/// The arguments `c, h, α, t, e` of `@ite c h α t e`.
pub fn is_ite(e: &Expr) -> Option<[Expr; 5]> {
    if !e.is_app_of(&ITE, 5) {
        return None;
    }
    let args = e.args();
    Some([
        args[0].clone(),
        args[1].clone(),
        args[2].clone(),
        args[3].clone(),
        args[4].clone(),
    ])
}

struct Builder {
    env: Environment,
}

impl Builder {
    fn local(&self, name: &str, ty: Expr, info: BinderInfo) -> Expr {
        mk_local(Id::fresh(), Name::from_str(name), ty, info)
    }

    fn axiom(mut self, name: &Name, univ_params: &[&str], ty: Expr) -> anyhow::Result<Self> {
        let univ_params = univ_params.iter().map(|u| Name::from_str(u)).collect();
        self.env = self
            .env
            .add(Declaration::axiom(name.clone(), univ_params, ty))?;
        Ok(self)
    }

    fn definition(mut self, name: &Name, ty: Expr, value: Expr) -> anyhow::Result<Self> {
        self.env = self
            .env
            .add(Declaration::definition(name.clone(), vec![], ty, value))?;
        Ok(self)
    }
}

/// An environment declaring the logical core: `true`, `false`, `not`, `and`, `iff`, `eq`,
/// `decidable`, `ite` and the lemmas the splitter and the reflexivity check refer to.
/// `eq` and `iff` are registered as reflexive and transitive relations.
pub fn core_environment() -> anyhow::Result<Environment> {
    let u = Level::Param(Name::from_str("u"));
    let prop = mk_prop();
    let b = Builder {
        env: Environment::new(),
    };

    let b = b
        .axiom(&TRUE, &[], prop.clone())?
        .axiom(&FALSE, &[], prop.clone())?
        .axiom(&TRUE_INTRO, &[], mk_true())?;

    let a = b.local("a", prop.clone(), BinderInfo::Default);
    let not_ty = mk_arrow(prop.clone(), prop.clone());
    let not_value = mk_lambda_locals(&[a.clone()], &mk_arrow(a.clone(), mk_false()));
    let b = b.definition(&NOT, not_ty, not_value)?;

    let prop2 = mk_arrow(prop.clone(), mk_arrow(prop.clone(), prop.clone()));
    let b = b.axiom(&AND, &[], prop2.clone())?.axiom(&IFF, &[], prop2)?;

    let a = b.local("a", prop.clone(), BinderInfo::Implicit);
    let bb = b.local("b", prop.clone(), BinderInfo::Implicit);
    let c = b.local("c", prop.clone(), BinderInfo::Implicit);
    let ab = mk_and(a.clone(), bb.clone());
    let and_intro = mk_pi_locals(
        &[a.clone(), bb.clone()],
        &mk_arrow(a.clone(), mk_arrow(bb.clone(), ab.clone())),
    );
    let and_elim_left = mk_pi_locals(&[a.clone(), bb.clone()], &mk_arrow(ab.clone(), a.clone()));
    let and_elim_right = mk_pi_locals(&[a.clone(), bb.clone()], &mk_arrow(ab, bb.clone()));
    let b = b
        .axiom(&AND_INTRO, &[], and_intro)?
        .axiom(&AND_ELIM_LEFT, &[], and_elim_left)?
        .axiom(&AND_ELIM_RIGHT, &[], and_elim_right)?;

    let explicit_a = b.local("a", prop.clone(), BinderInfo::Default);
    let iff_refl = mk_pi_locals(
        &[explicit_a.clone()],
        &mk_iff(explicit_a.clone(), explicit_a),
    );
    let iff_trans = mk_pi_locals(
        &[a.clone(), bb.clone(), c.clone()],
        &mk_arrow(
            mk_iff(a.clone(), bb.clone()),
            mk_arrow(mk_iff(bb.clone(), c.clone()), mk_iff(a.clone(), c.clone())),
        ),
    );
    let iff_true_intro = mk_pi_locals(&[a.clone()], &mk_arrow(a.clone(), mk_iff(a.clone(), mk_true())));
    let iff_false_intro = mk_pi_locals(
        &[a.clone()],
        &mk_arrow(mk_not(a.clone()), mk_iff(a.clone(), mk_false())),
    );
    let b = b
        .axiom(&IFF_REFL, &[], iff_refl)?
        .axiom(&IFF_TRANS, &[], iff_trans)?
        .axiom(&IFF_TRUE_INTRO, &[], iff_true_intro)?
        .axiom(&IFF_FALSE_INTRO, &[], iff_false_intro)?;

    // eq.{u} : Π {α : Sort u}, α → α → Prop
    let alpha = b.local("α", mk_sort(u.clone()), BinderInfo::Implicit);
    let eq_ty = mk_pi_locals(
        &[alpha.clone()],
        &mk_arrow(alpha.clone(), mk_arrow(alpha.clone(), prop.clone())),
    );
    let x = b.local("a", alpha.clone(), BinderInfo::Default);
    let implicit_x = b.local("a", alpha.clone(), BinderInfo::Implicit);
    let y = b.local("b", alpha.clone(), BinderInfo::Implicit);
    let z = b.local("c", alpha.clone(), BinderInfo::Implicit);
    let eq = |l: &Expr, r: &Expr| mk_eq(u.clone(), alpha.clone(), l.clone(), r.clone());
    let eq_refl = mk_pi_locals(&[alpha.clone(), x.clone()], &eq(&x, &x));
    let rfl = mk_pi_locals(&[alpha.clone(), implicit_x.clone()], &eq(&implicit_x, &implicit_x));
    let eq_trans = mk_pi_locals(
        &[alpha.clone(), implicit_x.clone(), y.clone(), z.clone()],
        &mk_arrow(eq(&implicit_x, &y), mk_arrow(eq(&y, &z), eq(&implicit_x, &z))),
    );
    let b = b
        .axiom(&EQ, &["u"], eq_ty)?
        .axiom(&EQ_REFL, &["u"], eq_refl)?
        .axiom(&RFL, &["u"], rfl)?
        .axiom(&EQ_TRANS, &["u"], eq_trans)?;

    // ite.{u} : Π (c : Prop) [h : decidable c] {α : Sort u}, α → α → α
    let b = b.axiom(&DECIDABLE, &[], mk_arrow(prop.clone(), mk_sort(Level::of_nat(1))))?;
    let cond = b.local("c", prop.clone(), BinderInfo::Default);
    let inst = b.local(
        "h",
        constant(&DECIDABLE).apply([cond.clone()]),
        BinderInfo::InstImplicit,
    );
    let ite_ty = mk_pi_locals(
        &[cond.clone(), inst, alpha.clone()],
        &mk_arrow(alpha.clone(), mk_arrow(alpha.clone(), alpha.clone())),
    );
    let b = b.axiom(&ITE, &["u"], ite_ty)?;

    // implies_of_if_pos : ∀ {c t e : Prop} [h : decidable c], ite c t e → c → t
    let cond = b.local("c", prop.clone(), BinderInfo::Implicit);
    let t = b.local("t", prop.clone(), BinderInfo::Implicit);
    let e = b.local("e", prop.clone(), BinderInfo::Implicit);
    let inst = b.local(
        "h",
        constant(&DECIDABLE).apply([cond.clone()]),
        BinderInfo::InstImplicit,
    );
    let ite = mk_const(ITE.clone(), vec![Level::of_nat(1)]).apply([
        cond.clone(),
        inst.clone(),
        prop.clone(),
        t.clone(),
        e.clone(),
    ]);
    let params = [cond.clone(), t.clone(), e.clone(), inst];
    let if_pos = mk_pi_locals(&params, &mk_arrow(ite.clone(), mk_arrow(cond.clone(), t)));
    let if_neg = mk_pi_locals(&params, &mk_arrow(ite, mk_arrow(mk_not(cond), e)));
    let b = b
        .axiom(&IMPLIES_OF_IF_POS, &[], if_pos)?
        .axiom(&IMPLIES_OF_IF_NEG, &[], if_neg)?;

    let env = b
        .env
        .add_relation(
            EQ.clone(),
            RelationInfo::new(3, 1, 2)
                .with_refl(EQ_REFL.clone())
                .with_trans(EQ_TRANS.clone()),
        )?
        .add_relation(
            IFF.clone(),
            RelationInfo::new(2, 0, 1)
                .with_refl(IFF_REFL.clone())
                .with_trans(IFF_TRANS.clone()),
        )?;
    Ok(env)
}
