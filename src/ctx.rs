use anyhow::{bail, ensure, Context};

use crate::attr::INSTANCE_ATTR;
use crate::env::{Declaration, Environment, ReducibilityStatus};
use crate::tt::{
    mk_const, mk_lambda_locals, mk_local, mk_meta, mk_pi_locals, mk_sort, BinderInfo, Expr,
    ExprBinder, Id, Level, LevelMeta, Name,
};

const MAX_INSTANCE_DEPTH: usize = 16;

/// Which definitions `whnf` may unfold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TransparencyMode {
    All,
    #[default]
    Semireducible,
    Instances,
    Reducible,
    None,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    eassignment: im::HashMap<Id, Expr>,
    uassignment: im::HashMap<Id, Level>,
}

/// Metavariable context together with the reduction and unification engine used while
/// building and applying lemmas.
#[derive(Debug, Clone)]
pub struct TypeContext {
    env: Environment,
    mode: TransparencyMode,
    eassignment: im::HashMap<Id, Expr>,
    uassignment: im::HashMap<Id, Level>,
    next_meta: usize,
    next_univ_meta: usize,
}

impl TypeContext {
    pub fn new(env: Environment) -> TypeContext {
        Self::with_mode(env, TransparencyMode::default())
    }

    pub fn with_mode(env: Environment, mode: TransparencyMode) -> TypeContext {
        TypeContext {
            env,
            mode,
            eassignment: im::HashMap::new(),
            uassignment: im::HashMap::new(),
            next_meta: 0,
            next_univ_meta: 0,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn mode(&self) -> TransparencyMode {
        self.mode
    }

    pub fn save(&self) -> Snapshot {
        Snapshot {
            eassignment: self.eassignment.clone(),
            uassignment: self.uassignment.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.eassignment = snapshot.eassignment;
        self.uassignment = snapshot.uassignment;
    }

    /// Runs `f` and then discards every assignment it made.
    pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let snapshot = self.save();
        let result = f(self);
        self.restore(snapshot);
        result
    }

    pub fn clear_expr_assignments(&mut self) {
        self.eassignment.clear();
    }

    pub fn mk_tmp_mvar(&mut self, ty: Expr) -> Expr {
        let name = Name::from_str(&format!("x_{}", self.next_meta));
        self.next_meta += 1;
        mk_meta(Id::fresh(), name, ty)
    }

    pub fn mk_tmp_univ_mvar(&mut self) -> Level {
        let name = Name::from_str(&format!("u_{}", self.next_univ_meta));
        self.next_univ_meta += 1;
        Level::Meta(LevelMeta {
            id: Id::fresh(),
            name,
        })
    }

    pub fn mk_local(&mut self, name: Name, ty: Expr, info: BinderInfo) -> Expr {
        mk_local(Id::fresh(), name, ty, info)
    }

    /// A fresh local standing for the variable bound by `binder`.
    pub fn mk_local_for(&mut self, binder: &ExprBinder) -> Expr {
        self.mk_local(
            binder.binder_name.clone(),
            binder.binder_type.clone(),
            binder.binder_info,
        )
    }

    pub fn mk_pi(&self, locals: &[Expr], body: &Expr) -> Expr {
        mk_pi_locals(locals, body)
    }

    pub fn mk_lambda(&self, locals: &[Expr], body: &Expr) -> Expr {
        mk_lambda_locals(locals, body)
    }

    pub fn is_assigned(&self, id: Id) -> bool {
        self.eassignment.contains_key(&id)
    }

    pub fn get_assignment(&self, id: Id) -> Option<&Expr> {
        self.eassignment.get(&id)
    }

    pub fn assign(&mut self, id: Id, value: Expr) {
        self.eassignment.insert(id, value);
    }

    /// Checks if `l` is a universe metavariable that has been assigned.
    pub fn is_level_assigned(&self, l: &Level) -> bool {
        match l {
            Level::Meta(meta) => self.uassignment.contains_key(&meta.id),
            _ => true,
        }
    }

    pub fn instantiate_level(&self, l: &Level) -> Level {
        if !l.has_meta() {
            return l.clone();
        }
        l.replace(&|l| match l {
            Level::Meta(meta) => self
                .uassignment
                .get(&meta.id)
                .map(|value| self.instantiate_level(value)),
            _ => None,
        })
    }

    /// Replaces assigned metavariables by their values, recursively.
    pub fn instantiate_mvars(&self, e: &Expr) -> Expr {
        if !e.has_meta() && !e.has_univ_meta() {
            return e.clone();
        }
        let e = e.replace(&mut |e, _| {
            if !e.has_meta() {
                return Some(e.clone());
            }
            match e {
                Expr::Meta(meta) => Some(match self.eassignment.get(&meta.id) {
                    Some(value) => self.instantiate_mvars(value),
                    None => e.clone(),
                }),
                _ => None,
            }
        });
        if e.has_univ_meta() {
            e.replace_levels(&|l| self.instantiate_level(l))
        } else {
            e
        }
    }

    fn can_unfold(&self, decl: &Declaration) -> bool {
        if decl.value.is_none() || decl.is_theorem() {
            return false;
        }
        let status = self.env.reducibility(&decl.name);
        match self.mode {
            TransparencyMode::All => true,
            TransparencyMode::Semireducible => status != ReducibilityStatus::Irreducible,
            TransparencyMode::Instances => {
                status == ReducibilityStatus::Reducible
                    || self.env.has_attribute(&INSTANCE_ATTR, &decl.name)
            }
            TransparencyMode::Reducible => status == ReducibilityStatus::Reducible,
            TransparencyMode::None => false,
        }
    }

    fn unfold_definition(&self, e: &Expr) -> Option<Expr> {
        let Expr::Const(head) = e.head() else {
            return None;
        };
        let decl = self.env.get(&head.name)?;
        if !self.can_unfold(decl) || decl.univ_params.len() != head.levels.len() {
            return None;
        }
        let value = decl.instantiate_value_univ_params(&head.levels)?;
        Some(value.apply(e.args().into_iter().cloned()))
    }

    /// Weak head normal form without unfolding definitions.
    pub fn whnf_core(&self, e: &Expr) -> Expr {
        let mut e = e.clone();
        loop {
            match &e {
                Expr::Let(inner) => {
                    e = inner.body.instantiate1(&inner.value);
                }
                Expr::Meta(meta) => match self.eassignment.get(&meta.id) {
                    Some(value) => e = value.clone(),
                    None => return e,
                },
                Expr::App(_) => {
                    let head = e.head();
                    let new_head = self.whnf_core(head);
                    if new_head.is_lambda() {
                        let args: Vec<Expr> = e.args().into_iter().cloned().collect();
                        let mut body = new_head;
                        let mut n = 0;
                        while n < args.len() {
                            let Expr::Lam(inner) = &body else {
                                break;
                            };
                            let next = inner.body.clone();
                            body = next;
                            n += 1;
                        }
                        e = body.instantiate(&args[..n]).apply(args[n..].iter().cloned());
                    } else if new_head.ptr_eq(head) {
                        return e;
                    } else {
                        let args: Vec<Expr> = e.args().into_iter().cloned().collect();
                        return new_head.apply(args);
                    }
                }
                _ => return e,
            }
        }
    }

    /// Weak head normal form, unfolding definitions allowed by the transparency mode.
    pub fn whnf(&self, e: &Expr) -> Expr {
        let mut e = self.whnf_core(e);
        while let Some(unfolded) = self.unfold_definition(&e) {
            e = self.whnf_core(&unfolded);
        }
        e
    }

    pub fn infer(&mut self, e: &Expr) -> anyhow::Result<Expr> {
        match e {
            Expr::Var(inner) => bail!("unexpected loose bound variable #{}", inner.index),
            Expr::Sort(inner) => Ok(mk_sort(inner.level.succ())),
            Expr::Const(inner) => {
                let Some(decl) = self.env.get(&inner.name) else {
                    bail!("unknown constant: {}", inner.name);
                };
                ensure!(
                    decl.univ_params.len() == inner.levels.len(),
                    "wrong number of universe levels: {}",
                    inner.name
                );
                Ok(decl.instantiate_type_univ_params(&inner.levels))
            }
            Expr::Local(inner) => Ok(inner.ty.clone()),
            Expr::Meta(inner) => Ok(inner.ty.clone()),
            Expr::App(_) => {
                let mut fun_ty = self.infer(e.head())?;
                for arg in e.args() {
                    fun_ty = self.whnf(&fun_ty);
                    let Expr::Pi(inner) = &fun_ty else {
                        bail!("function expected: {e}");
                    };
                    let next = inner.body.instantiate1(arg);
                    fun_ty = next;
                }
                Ok(fun_ty)
            }
            Expr::Lam(inner) => {
                let local = self.mk_local_for(inner);
                let body_ty = self.infer(&inner.body.instantiate1(&local))?;
                Ok(mk_pi_locals(&[local], &body_ty))
            }
            Expr::Pi(inner) => {
                let dom = self.infer_sort(&inner.binder_type)?;
                let local = self.mk_local_for(inner);
                let cod = self.infer_sort(&inner.body.instantiate1(&local))?;
                Ok(mk_sort(dom.imax(&cod).normalize()))
            }
            Expr::Let(inner) => self.infer(&inner.body.instantiate1(&inner.value)),
            Expr::Macro(inner) => bail!("cannot infer the type of macro {}", inner.def),
        }
    }

    fn infer_sort(&mut self, e: &Expr) -> anyhow::Result<Level> {
        let ty = self.infer(e)?;
        match self.whnf(&ty) {
            Expr::Sort(inner) => Ok(inner.level.clone()),
            ty => bail!("type expected: {e} : {ty}"),
        }
    }

    /// Checks if `e` is a proposition, i.e. its type is `Prop`. Ill-typed terms are not.
    pub fn is_prop(&mut self, e: &Expr) -> bool {
        match self.infer(e) {
            Ok(ty) => matches!(self.whnf(&ty), Expr::Sort(inner) if self.instantiate_level(&inner.level).is_zero()),
            Err(err) => {
                log::trace!(target: "simp_lemmas", "is_prop: {err:#}");
                false
            }
        }
    }

    pub fn is_level_def_eq(&mut self, l1: &Level, l2: &Level) -> bool {
        let l1 = self.instantiate_level(l1).normalize();
        let l2 = self.instantiate_level(l2).normalize();
        if l1 == l2 {
            return true;
        }
        match (&l1, &l2) {
            (Level::Meta(meta), other) | (other, Level::Meta(meta)) => {
                if other.has_meta() && contains_level_meta(other, meta.id) {
                    return false;
                }
                self.uassignment.insert(meta.id, other.clone());
                true
            }
            (Level::Succ(a), Level::Succ(b)) => self.is_level_def_eq(a, b),
            (Level::Max(a1, b1), Level::Max(a2, b2)) | (Level::IMax(a1, b1), Level::IMax(a2, b2)) => {
                self.is_level_def_eq(a1, a2) && self.is_level_def_eq(b1, b2)
            }
            _ => false,
        }
    }

    /// Definitional equality check that may assign metavariables. Assignments made by a
    /// failed check are rolled back.
    pub fn is_def_eq(&mut self, e1: &Expr, e2: &Expr) -> bool {
        let snapshot = self.save();
        if self.is_def_eq_core(e1, e2) {
            true
        } else {
            self.restore(snapshot);
            false
        }
    }

    fn is_def_eq_core(&mut self, e1: &Expr, e2: &Expr) -> bool {
        let e1 = self.instantiate_mvars(e1);
        let e2 = self.instantiate_mvars(e2);
        if e1 == e2 {
            return true;
        }
        if let Some(result) = self.try_assign(&e1, &e2) {
            return result;
        }
        if let Some(result) = self.try_assign(&e2, &e1) {
            return result;
        }
        let snapshot = self.save();
        if self.is_def_eq_structural(&e1, &e2) {
            return true;
        }
        self.restore(snapshot);
        let r1 = self.whnf(&e1);
        let r2 = self.whnf(&e2);
        if r1 != e1 || r2 != e2 {
            return self.is_def_eq_core(&r1, &r2);
        }
        false
    }

    /// Assigns the unassigned metavariable at the head of `lhs` if `lhs` is a higher-order
    /// pattern `?m x₁ ⋯ xₙ` with distinct locals `xᵢ`.
    fn try_assign(&mut self, lhs: &Expr, rhs: &Expr) -> Option<bool> {
        let Expr::Meta(meta) = lhs.head() else {
            return None;
        };
        if self.is_assigned(meta.id) {
            return None;
        }
        let occurs = rhs.has_meta()
            && rhs
                .find(&mut |e, _| matches!(e, Expr::Meta(m) if m.id == meta.id))
                .is_some();
        if occurs {
            return Some(false);
        }
        let args = lhs.args();
        if args.is_empty() {
            if let Ok(rhs_ty) = self.infer(rhs) {
                let meta_ty = self.instantiate_mvars(&meta.ty);
                if !self.is_def_eq_core(&meta_ty, &rhs_ty) {
                    return Some(false);
                }
            }
            self.assign(meta.id, rhs.clone());
            return Some(true);
        }
        let mut locals: Vec<Expr> = vec![];
        for arg in args {
            if !arg.is_local() || locals.contains(arg) {
                return None;
            }
            locals.push(arg.clone());
        }
        let value = mk_lambda_locals(&locals, rhs);
        self.assign(meta.id, value);
        Some(true)
    }

    fn is_def_eq_structural(&mut self, e1: &Expr, e2: &Expr) -> bool {
        match (e1, e2) {
            (Expr::Sort(a), Expr::Sort(b)) => self.is_level_def_eq(&a.level, &b.level),
            (Expr::Const(a), Expr::Const(b)) => {
                a.name == b.name
                    && a.levels.len() == b.levels.len()
                    && a
                        .levels
                        .iter()
                        .zip(&b.levels)
                        .all(|(l1, l2)| self.is_level_def_eq(l1, l2))
            }
            (Expr::App(_), Expr::App(_)) => {
                let args1 = e1.args();
                let args2 = e2.args();
                args1.len() == args2.len()
                    && self.is_def_eq_core(e1.head(), e2.head())
                    && args1
                        .iter()
                        .zip(&args2)
                        .all(|(a1, a2)| self.is_def_eq_core(a1, a2))
            }
            (Expr::Lam(a), Expr::Lam(b)) | (Expr::Pi(a), Expr::Pi(b)) => {
                if !self.is_def_eq_core(&a.binder_type, &b.binder_type) {
                    return false;
                }
                let local = self.mk_local_for(a);
                let body1 = a.body.instantiate1(&local);
                let body2 = b.body.instantiate1(&local);
                self.is_def_eq_core(&body1, &body2)
            }
            (Expr::Macro(a), Expr::Macro(b)) => {
                a.def == b.def
                    && a.args.len() == b.args.len()
                    && a
                        .args
                        .iter()
                        .zip(&b.args)
                        .all(|(x, y)| self.is_def_eq_core(x, y))
            }
            _ => false,
        }
    }

    /// Searches the declarations tagged `[instance]` for an inhabitant of `ty`.
    pub fn mk_class_instance(&mut self, ty: &Expr) -> Option<Expr> {
        self.synthesize(ty, 0)
    }

    fn synthesize(&mut self, ty: &Expr, depth: usize) -> Option<Expr> {
        if depth > MAX_INSTANCE_DEPTH {
            return None;
        }
        let ty = self.instantiate_mvars(ty);
        for (name, _) in self.env.attribute_instances(&INSTANCE_ATTR) {
            let snapshot = self.save();
            match self.try_instance(&name, &ty, depth) {
                Ok(value) => return Some(value),
                Err(err) => {
                    log::trace!(target: "simp_lemmas", "instance {name} rejected for {ty}: {err}");
                    self.restore(snapshot);
                }
            }
        }
        None
    }

    fn try_instance(&mut self, name: &Name, ty: &Expr, depth: usize) -> anyhow::Result<Expr> {
        let decl = self
            .env
            .get(name)
            .cloned()
            .with_context(|| format!("unknown instance: {name}"))?;
        let levels: Vec<Level> = decl
            .univ_params
            .iter()
            .map(|_| self.mk_tmp_univ_mvar())
            .collect();
        let mut inst_ty = decl.instantiate_type_univ_params(&levels);
        let mut value = mk_const(decl.name.clone(), levels);
        let mut pending = vec![];
        while let Expr::Pi(inner) = self.whnf(&inst_ty) {
            let mvar = self.mk_tmp_mvar(inner.binder_type.clone());
            if inner.binder_info.is_inst_implicit() {
                pending.push(mvar.clone());
            }
            value = value.apply([mvar.clone()]);
            inst_ty = inner.body.instantiate1(&mvar);
        }
        ensure!(self.is_def_eq(&inst_ty, ty), "type mismatch");
        for mvar in pending {
            let Some(meta) = mvar.as_meta() else {
                continue;
            };
            if self.is_assigned(meta.id) {
                continue;
            }
            let meta_ty = self.instantiate_mvars(&meta.ty);
            let arg = self
                .synthesize(&meta_ty, depth + 1)
                .with_context(|| format!("failed to synthesize {meta_ty}"))?;
            ensure!(self.is_def_eq(&mvar, &arg), "failed to assign {meta_ty}");
        }
        let value = self.instantiate_mvars(&value);
        ensure!(!value.has_meta(), "unresolved arguments in {value}");
        Ok(value)
    }
}

fn contains_level_meta(l: &Level, id: Id) -> bool {
    match l {
        Level::Zero | Level::Param(_) => false,
        Level::Succ(l) => contains_level_meta(l, id),
        Level::Max(l1, l2) | Level::IMax(l1, l2) => {
            contains_level_meta(l1, id) || contains_level_meta(l2, id)
        }
        Level::Meta(meta) => meta.id == id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tt::{mk_app, mk_arrow, mk_lambda, mk_prop, mk_var};

    struct EnvFixture {
        env: Environment,
    }

    impl EnvFixture {
        fn new() -> Self {
            let nat = Name::from_str("nat");
            let env = Environment::new()
                .add(Declaration::axiom(nat.clone(), vec![], mk_sort(Level::of_nat(1))))
                .unwrap();
            EnvFixture { env }.with_axiom("nat.zero", nat_ty())
        }

        fn with_axiom(mut self, name: &str, ty: Expr) -> Self {
            self.env = self
                .env
                .add(Declaration::axiom(Name::from_str(name), vec![], ty))
                .unwrap();
            self
        }

        fn with_definition(mut self, name: &str, ty: Expr, value: Expr) -> Self {
            self.env = self
                .env
                .add(Declaration::definition(Name::from_str(name), vec![], ty, value))
                .unwrap();
            self
        }
    }

    fn nat_ty() -> Expr {
        mk_const(Name::from_str("nat"), vec![])
    }

    fn constant(name: &str) -> Expr {
        mk_const(Name::from_str(name), vec![])
    }

    fn nat_to_nat() -> Expr {
        mk_arrow(nat_ty(), nat_ty())
    }

    #[test]
    fn whnf_beta_reduces_and_unfolds() {
        let id = mk_lambda(Name::from_str("n"), BinderInfo::Default, nat_ty(), mk_var(0));
        let fixture = EnvFixture::new().with_definition("id", nat_to_nat(), id);
        let ctx = TypeContext::new(fixture.env.clone());
        let e = mk_app(constant("id"), constant("nat.zero"));
        assert_eq!(ctx.whnf(&e), constant("nat.zero"));
        assert_eq!(ctx.whnf_core(&e), e);

        let ctx = TypeContext::with_mode(fixture.env, TransparencyMode::Reducible);
        assert_eq!(ctx.whnf(&e), e);
    }

    #[test]
    fn is_def_eq_assigns_metavariables() {
        let fixture = EnvFixture::new().with_axiom("succ", nat_to_nat());
        let mut ctx = TypeContext::new(fixture.env);
        let m = ctx.mk_tmp_mvar(nat_ty());
        let lhs = mk_app(constant("succ"), m.clone());
        let rhs = mk_app(constant("succ"), constant("nat.zero"));
        assert!(ctx.is_def_eq(&lhs, &rhs));
        assert_eq!(ctx.instantiate_mvars(&m), constant("nat.zero"));
    }

    #[test]
    fn failed_def_eq_rolls_back() {
        let fixture = EnvFixture::new()
            .with_axiom("succ", nat_to_nat())
            .with_axiom("one", nat_ty());
        let mut ctx = TypeContext::new(fixture.env);
        let m = ctx.mk_tmp_mvar(nat_ty());
        let lhs = mk_app(mk_app(constant("f"), m.clone()), constant("one"));
        let rhs = mk_app(mk_app(constant("f"), constant("nat.zero")), constant("nat.zero"));
        assert!(!ctx.is_def_eq(&lhs, &rhs));
        let Some(meta) = m.as_meta() else {
            panic!("expected a metavariable");
        };
        assert!(!ctx.is_assigned(meta.id));
    }

    #[test]
    fn is_prop_checks_sort() {
        let fixture = EnvFixture::new().with_axiom("p", mk_prop());
        let mut ctx = TypeContext::new(fixture.env);
        assert!(ctx.is_prop(&constant("p")));
        assert!(!ctx.is_prop(&constant("nat.zero")));
        assert!(!ctx.is_prop(&constant("unknown")));
    }

    #[test]
    fn theorems_are_not_unfolded() {
        let mut fixture = EnvFixture::new();
        fixture.env = fixture
            .env
            .add(Declaration::theorem(
                Name::from_str("thm"),
                vec![],
                nat_ty(),
                constant("nat.zero"),
            ))
            .unwrap();
        let ctx = TypeContext::with_mode(fixture.env, TransparencyMode::All);
        assert_eq!(ctx.whnf(&constant("thm")), constant("thm"));
    }
}
