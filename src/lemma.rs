use std::sync::Arc;

use crate::builtin::{is_eq, EQ};
use crate::ceqv::to_ceqvs;
use crate::classify::{detect_permutation, RelationApp, RelationExt};
use crate::ctx::TypeContext;
use crate::error::{Error, Report};
use crate::store::LemmaCollection;
use crate::tt::{mk_const, Expr, Level, Name};

pub const DEFAULT_PRIORITY: u32 = 1000;

/// Data shared by every kind of lemma.
///
/// `emetas` are stored in reverse order of introduction: the metavariable of the innermost
/// binder comes first. `instances[i]` tells whether `emetas[i]` was instance-implicit.
#[derive(Debug, Clone)]
pub struct LemmaHeader {
    pub id: Name,
    pub umetas: Vec<Level>,
    pub emetas: Vec<Expr>,
    pub instances: Vec<bool>,
    pub lhs: Expr,
    pub rhs: Expr,
    pub priority: u32,
}

#[derive(Debug, Clone)]
pub struct SimpRule {
    pub header: LemmaHeader,
    pub proof: Expr,
    pub is_permutation: bool,
}

#[derive(Debug, Clone)]
pub struct CongrRule {
    pub header: LemmaHeader,
    pub proof: Expr,
    pub congr_hyps: Vec<Expr>,
}

/// A rewrite that holds by definitional unfolding. It carries no proof.
#[derive(Debug, Clone)]
pub struct ReflRule {
    pub header: LemmaHeader,
}

#[derive(Debug, Clone)]
pub enum SimpLemma {
    Simp(Arc<SimpRule>),
    Congr(Arc<CongrRule>),
    Refl(Arc<ReflRule>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpLemmaKind {
    Simp,
    Congr,
    Refl,
}

impl PartialEq for SimpLemma {
    /// Proofs are irrelevant.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SimpLemma::Simp(a), SimpLemma::Simp(b)) => {
                a.header.lhs == b.header.lhs && a.header.rhs == b.header.rhs
            }
            (SimpLemma::Refl(a), SimpLemma::Refl(b)) => {
                a.header.lhs == b.header.lhs && a.header.rhs == b.header.rhs
            }
            (SimpLemma::Congr(a), SimpLemma::Congr(b)) => {
                a.header.lhs == b.header.lhs
                    && a.header.rhs == b.header.rhs
                    && a.congr_hyps == b.congr_hyps
            }
            _ => false,
        }
    }
}

impl Eq for SimpLemma {}

impl SimpLemma {
    pub fn simp(header: LemmaHeader, proof: Expr, is_permutation: bool) -> SimpLemma {
        SimpLemma::Simp(Arc::new(SimpRule {
            header,
            proof,
            is_permutation,
        }))
    }

    pub fn congr(header: LemmaHeader, proof: Expr, congr_hyps: Vec<Expr>) -> SimpLemma {
        SimpLemma::Congr(Arc::new(CongrRule {
            header,
            proof,
            congr_hyps,
        }))
    }

    pub fn refl(header: LemmaHeader) -> SimpLemma {
        SimpLemma::Refl(Arc::new(ReflRule { header }))
    }

    pub fn header(&self) -> &LemmaHeader {
        match self {
            SimpLemma::Simp(inner) => &inner.header,
            SimpLemma::Congr(inner) => &inner.header,
            SimpLemma::Refl(inner) => &inner.header,
        }
    }

    pub fn kind(&self) -> SimpLemmaKind {
        match self {
            SimpLemma::Simp(_) => SimpLemmaKind::Simp,
            SimpLemma::Congr(_) => SimpLemmaKind::Congr,
            SimpLemma::Refl(_) => SimpLemmaKind::Refl,
        }
    }

    pub fn id(&self) -> &Name {
        &self.header().id
    }

    pub fn umetas(&self) -> &[Level] {
        &self.header().umetas
    }

    pub fn num_umeta(&self) -> usize {
        self.header().umetas.len()
    }

    pub fn emetas(&self) -> &[Expr] {
        &self.header().emetas
    }

    pub fn num_emeta(&self) -> usize {
        self.header().emetas.len()
    }

    pub fn instances(&self) -> &[bool] {
        &self.header().instances
    }

    pub fn lhs(&self) -> &Expr {
        &self.header().lhs
    }

    pub fn rhs(&self) -> &Expr {
        &self.header().rhs
    }

    pub fn priority(&self) -> u32 {
        self.header().priority
    }

    pub fn proof(&self) -> Option<&Expr> {
        match self {
            SimpLemma::Simp(inner) => Some(&inner.proof),
            SimpLemma::Congr(inner) => Some(&inner.proof),
            SimpLemma::Refl(_) => None,
        }
    }

    pub fn is_refl(&self) -> bool {
        matches!(self, SimpLemma::Refl(_))
    }

    pub fn is_congr(&self) -> bool {
        matches!(self, SimpLemma::Congr(_))
    }

    pub fn is_permutation(&self) -> bool {
        match self {
            SimpLemma::Simp(inner) => inner.is_permutation,
            SimpLemma::Congr(_) | SimpLemma::Refl(_) => false,
        }
    }

    pub fn congr_hyps(&self) -> &[Expr] {
        match self {
            SimpLemma::Congr(inner) => &inner.congr_hyps,
            SimpLemma::Simp(_) | SimpLemma::Refl(_) => &[],
        }
    }
}

/// Introduces one metavariable per leading ∀ of `rule`.
/// Returns the metavariables in introduction order, their instance flags and the stripped
/// rule.
fn strip_binders(ctx: &mut TypeContext, mut rule: Expr, whnf: bool) -> (Vec<Expr>, Vec<bool>, Expr) {
    let mut emetas = vec![];
    let mut instances = vec![];
    while let Expr::Pi(binder) = rule.clone() {
        let mvar = ctx.mk_tmp_mvar(binder.binder_type.clone());
        instances.push(binder.binder_info.is_inst_implicit());
        let body = binder.body.instantiate1(&mvar);
        rule = if whnf { ctx.whnf(&body) } else { body };
        emetas.push(mvar);
    }
    (emetas, instances, rule)
}

#[allow(clippy::too_many_arguments)]
fn add_core(
    ctx: &mut TypeContext,
    lemmas: &LemmaCollection,
    id: &Name,
    umetas: &[Level],
    e: &Expr,
    h: &Expr,
    priority: u32,
    report: &mut Report,
) -> Result<LemmaCollection, Error> {
    let ceqvs = to_ceqvs(ctx, e, h);
    if ceqvs.is_empty() {
        report.fail(Error::InvalidSimpLemma {
            name: id.clone(),
            term: e.clone(),
        })?;
        return Ok(lemmas.clone());
    }
    let env = ctx.env().clone();
    let mut new_lemmas = lemmas.clone();
    for (rule, proof) in ceqvs {
        ctx.clear_expr_assignments();
        let rule = ctx.whnf(&rule);
        let proof = ctx.whnf(&proof);
        let is_perm = detect_permutation(&env, &rule);
        let (mut emetas, mut instances, rule) = strip_binders(ctx, rule, true);
        let proof = proof.apply(emetas.iter().cloned());
        let Some(RelationApp { rel, lhs, rhs }) = env.simp_relation_app(&rule) else {
            log::trace!(target: "simp_lemmas", "[{id}] not a relation after stripping: {rule}");
            continue;
        };
        emetas.reverse();
        instances.reverse();
        let header = LemmaHeader {
            id: id.clone(),
            umetas: umetas.to_vec(),
            emetas,
            instances,
            lhs,
            rhs,
            priority,
        };
        let lemma = SimpLemma::simp(header, proof, is_perm);
        log::debug!(target: "simp_lemmas", "{lemma}");
        new_lemmas.insert(&rel, lemma);
    }
    Ok(new_lemmas)
}

/// Adds the lemmas obtained by splitting the proof `h` of `e`.
pub fn add_lemma_from_equation(
    ctx: &mut TypeContext,
    lemmas: &LemmaCollection,
    id: &Name,
    e: &Expr,
    h: &Expr,
    priority: u32,
    report: &mut Report,
) -> Result<LemmaCollection, Error> {
    ctx.scoped(|ctx| add_core(ctx, lemmas, id, &[], e, h, priority, report))
}

/// Adds the lemmas stated by the declaration `name`.
pub fn add_lemma(
    ctx: &mut TypeContext,
    lemmas: &LemmaCollection,
    name: &Name,
    priority: u32,
    report: &mut Report,
) -> Result<LemmaCollection, Error> {
    let env = ctx.env().clone();
    let Some(decl) = env.get(name) else {
        report.fail(Error::UnknownDeclaration { name: name.clone() })?;
        return Ok(lemmas.clone());
    };
    ctx.scoped(|ctx| {
        let umetas: Vec<Level> = decl
            .univ_params
            .iter()
            .map(|_| ctx.mk_tmp_univ_mvar())
            .collect();
        let ty = decl.instantiate_type_univ_params(&umetas);
        if !env.is_rfl_lemma(name) {
            let proof = mk_const(name.clone(), umetas.clone());
            return add_core(ctx, lemmas, name, &umetas, &ty, &proof, priority, report);
        }
        let (mut emetas, mut instances, rule) = strip_binders(ctx, ty.clone(), false);
        let Some((lhs, rhs)) = is_eq(&rule) else {
            report.fail(Error::InvalidSimpLemma {
                name: name.clone(),
                term: ty,
            })?;
            return Ok(lemmas.clone());
        };
        emetas.reverse();
        instances.reverse();
        let lemma = SimpLemma::refl(LemmaHeader {
            id: name.clone(),
            umetas,
            emetas,
            instances,
            lhs,
            rhs,
            priority,
        });
        log::debug!(target: "simp_lemmas", "{lemma}");
        let mut new_lemmas = lemmas.clone();
        new_lemmas.insert(&EQ, lemma);
        Ok(new_lemmas)
    })
}

/// Assigns the remaining metavariables of a lemma after its lhs has been matched.
/// Instance-implicit ones are synthesised, any other unassigned one is a failure.
pub fn instantiate_emetas(ctx: &mut TypeContext, emetas: &[Expr], instances: &[bool]) -> bool {
    for (mvar, &is_instance) in emetas.iter().zip(instances) {
        let Some(meta) = mvar.as_meta() else {
            continue;
        };
        if ctx.is_assigned(meta.id) {
            continue;
        }
        let mvar_type = ctx.instantiate_mvars(&meta.ty);
        if !is_instance {
            log::debug!(target: "simp_lemmas::failure", "failed to assign: {mvar} : {mvar_type}");
            return false;
        }
        let Some(instance) = ctx.mk_class_instance(&mvar_type) else {
            log::debug!(target: "simp_lemmas::failure", "unable to synthesize instance for: {mvar_type}");
            return false;
        };
        if !ctx.is_def_eq(mvar, &instance) {
            log::debug!(target: "simp_lemmas::failure", "unable to assign instance for: {mvar_type}");
            return false;
        }
    }
    true
}

/// Rewrites `e` with the reflexivity lemma `lemma`. Returns `e` unchanged if the lhs does
/// not match or some metavariable of the lemma stays unassigned.
pub fn apply_reflexivity_rewrite(ctx: &mut TypeContext, e: &Expr, lemma: &SimpLemma) -> Expr {
    if !lemma.is_refl() {
        return e.clone();
    }
    ctx.scoped(|ctx| {
        if !ctx.is_def_eq(e, lemma.lhs()) {
            return e.clone();
        }
        if log::log_enabled!(target: "simp_lemmas", log::Level::Trace) {
            let lhs = ctx.instantiate_mvars(lemma.lhs());
            let rhs = ctx.instantiate_mvars(lemma.rhs());
            log::trace!(target: "simp_lemmas", "({}) [{lhs} --> {rhs}]", lemma.id());
        }
        if !instantiate_emetas(ctx, lemma.emetas(), lemma.instances()) {
            return e.clone();
        }
        if !lemma.umetas().iter().all(|l| ctx.is_level_assigned(l)) {
            return e.clone();
        }
        ctx.instantiate_mvars(lemma.rhs())
    })
}
