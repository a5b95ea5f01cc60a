#![allow(dead_code)]

use std::cell::RefCell;

use simpset::builtin::{core_environment, mk_eq, mk_iff, mk_and, EQ_REFL};
use simpset::env::{Declaration, Environment};
use simpset::registry::{CONGR_ATTR, SIMP_ATTR};
use simpset::tt::{
    mk_arrow, mk_const, mk_lambda_locals, mk_local, mk_pi_locals, mk_prop, mk_sort, BinderInfo,
    Expr, Id, Level, Name,
};
use simpset::Registry;

#[derive(Debug, Clone)]
pub struct Captured {
    pub target: String,
    pub level: log::Level,
    pub message: String,
}

thread_local! {
    static CAPTURED: RefCell<Vec<Captured>> = RefCell::new(vec![]);
}

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let captured = Captured {
            target: record.target().to_owned(),
            level: record.level(),
            message: record.args().to_string(),
        };
        let _ = CAPTURED.try_with(|logs| logs.borrow_mut().push(captured));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

#[ctor::ctor]
fn install_logger() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Trace);
}

/// Drains the messages logged on `target` by the current thread.
pub fn take_logs(target: &str) -> Vec<String> {
    CAPTURED.with(|logs| {
        let mut logs = logs.borrow_mut();
        let (taken, rest): (Vec<Captured>, Vec<Captured>) =
            logs.drain(..).partition(|c| c.target == target);
        *logs = rest;
        taken.into_iter().map(|c| c.message).collect()
    })
}

pub fn clear_logs() {
    CAPTURED.with(|logs| logs.borrow_mut().clear());
}

pub fn name(s: &str) -> Name {
    Name::from_str(s)
}

pub fn constant(s: &str) -> Expr {
    mk_const(name(s), vec![])
}

pub fn nat() -> Expr {
    constant("nat")
}

pub fn zero() -> Expr {
    constant("nat.zero")
}

pub fn succ(a: Expr) -> Expr {
    constant("nat.succ").apply([a])
}

pub fn add(a: Expr, b: Expr) -> Expr {
    constant("nat.add").apply([a, b])
}

pub fn double(a: Expr) -> Expr {
    constant("double").apply([a])
}

pub fn eq_nat(a: Expr, b: Expr) -> Expr {
    mk_eq(Level::of_nat(1), nat(), a, b)
}

pub fn local(s: &str, ty: Expr) -> Expr {
    mk_local(Id::fresh(), name(s), ty, BinderInfo::Default)
}

pub fn implicit(s: &str, ty: Expr) -> Expr {
    mk_local(Id::fresh(), name(s), ty, BinderInfo::Implicit)
}

fn forall_nat(f: impl FnOnce(Expr) -> Expr) -> Expr {
    let n = local("n", nat());
    mk_pi_locals(&[n.clone()], &f(n))
}

/// `∀ {α : Type} {p q : α → Prop}, (∀ a, p a ↔ q a) → ((∀ a, p a) ↔ (∀ a, q a))`
fn forall_congr_type() -> Expr {
    let ty = implicit("α", mk_sort(Level::of_nat(1)));
    let pred = mk_arrow(ty.clone(), mk_prop());
    let p = implicit("p", pred.clone());
    let q = implicit("q", pred);
    let a = local("a", ty.clone());
    let h = local(
        "h",
        mk_pi_locals(&[a.clone()], &mk_iff(p.apply([a.clone()]), q.apply([a.clone()]))),
    );
    let lhs = mk_pi_locals(&[a.clone()], &p.apply([a.clone()]));
    let rhs = mk_pi_locals(&[a.clone()], &q.apply([a]));
    mk_pi_locals(&[ty, p, q, h], &mk_iff(lhs, rhs))
}

/// The prelude extended with a few facts about natural numbers. Nothing is tagged.
pub fn base_env() -> Environment {
    let nat_to_nat = mk_arrow(nat(), nat());
    let n = local("n", nat());
    let double_value = mk_lambda_locals(&[n.clone()], &add(n.clone(), n.clone()));
    let double_def_value = mk_lambda_locals(
        &[n.clone()],
        &mk_const(EQ_REFL.clone(), vec![Level::of_nat(1)]).apply([nat(), double(n.clone())]),
    );
    let a = local("a", nat());
    let b = local("b", nat());
    let a2 = local("a'", nat());
    let h = local("h", eq_nat(a.clone(), a2.clone()));

    let decls = vec![
        Declaration::axiom(name("nat"), vec![], mk_sort(Level::of_nat(1))),
        Declaration::axiom(name("nat.zero"), vec![], nat()),
        Declaration::axiom(name("nat.succ"), vec![], nat_to_nat.clone()),
        Declaration::axiom(name("nat.add"), vec![], mk_arrow(nat(), nat_to_nat.clone())),
        Declaration::definition(name("double"), vec![], nat_to_nat, double_value),
        Declaration::axiom(name("add_zero"), vec![], forall_nat(|n| eq_nat(add(n.clone(), zero()), n))),
        Declaration::axiom(name("zero_add"), vec![], forall_nat(|n| eq_nat(add(zero(), n.clone()), n))),
        Declaration::axiom(
            name("add_comm"),
            vec![],
            mk_pi_locals(
                &[a.clone(), b.clone()],
                &eq_nat(add(a.clone(), b.clone()), add(b.clone(), a.clone())),
            ),
        ),
        Declaration::axiom(
            name("zero_add_and_add_zero"),
            vec![],
            mk_and(
                forall_nat(|n| eq_nat(add(zero(), n.clone()), n)),
                forall_nat(|n| eq_nat(add(n.clone(), zero()), n)),
            ),
        ),
        Declaration::theorem(
            name("double_def"),
            vec![],
            forall_nat(|n| eq_nat(double(n.clone()), add(n.clone(), n))),
            double_def_value,
        ),
        Declaration::axiom(
            name("succ_congr"),
            vec![],
            mk_pi_locals(
                &[a.clone(), a2.clone(), h],
                &eq_nat(succ(a.clone()), succ(a2.clone())),
            ),
        ),
        Declaration::axiom(
            name("succ_double"),
            vec![],
            forall_nat(|n| eq_nat(succ(n.clone()), double(n))),
        ),
        Declaration::axiom(name("forall_congr"), vec![], forall_congr_type()),
        Declaration::axiom(name("not_a_lemma"), vec![], mk_arrow(mk_prop(), mk_prop())),
    ];
    let mut env = core_environment().unwrap();
    for decl in decls {
        env = env.add(decl).unwrap();
    }
    env
}

/// [base_env] with `add_zero`, `add_comm` (priority 10), `double_def` tagged `[simp]` and
/// `succ_congr` tagged `[congr]`, in this order.
pub fn tagged_env(registry: &Registry) -> Environment {
    let env = base_env();
    let env = registry.tag(&env, &SIMP_ATTR, &name("add_zero"), 1000).unwrap();
    let env = registry.tag(&env, &SIMP_ATTR, &name("add_comm"), 10).unwrap();
    let env = registry.tag(&env, &SIMP_ATTR, &name("double_def"), 1000).unwrap();
    registry.tag(&env, &CONGR_ATTR, &name("succ_congr"), 1000).unwrap()
}
