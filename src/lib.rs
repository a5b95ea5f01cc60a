//! Construction, indexing and caching of the rewrite rules consumed by a simplifier.
//!
//! Declarations tagged with a simplification attribute are split into conditional
//! equations, turned into [SimpLemma]s and bucketed by relation and lhs head in a
//! [LemmaCollection]. A [LemmaCache] keeps one collection per configuration and
//! transparency mode, rebuilding it only when the tagged set changes.

pub mod attr;
pub mod builtin;
pub mod cache;
pub mod ceqv;
pub mod classify;
pub mod congr;
pub mod ctx;
pub mod env;
pub mod error;
pub mod lemma;
pub mod print;
pub mod registry;
pub mod store;
pub mod tt;

pub use cache::LemmaCache;
pub use congr::add_congruence;
pub use ctx::{TransparencyMode, TypeContext};
pub use env::Environment;
pub use error::{CongrError, Error, Mode, Report};
pub use lemma::{
    add_lemma, add_lemma_from_equation, apply_reflexivity_rewrite, SimpLemma, SimpLemmaKind,
    DEFAULT_PRIORITY,
};
pub use print::{pp_congr, pp_lemma, pp_lemmas, pp_simp, DisplayFormatter, ExprFormatter};
pub use registry::{AttributeConfig, Registry, Token};
pub use store::{merge, HeadIndex, LemmaCollection, LemmaSetForRelation};

/// Registers a configuration on `registry`. Shorthand for
/// [Registry::register_configuration].
pub fn register_configuration(
    registry: &mut Registry,
    name: tt::Name,
    simp_attrs: Vec<tt::Name>,
    congr_attrs: Vec<tt::Name>,
) -> Token {
    registry.register_configuration(name, simp_attrs, congr_attrs)
}

/// The lemmas of the configuration `token` in `env`.
pub fn get_lemmas(
    cache: &mut LemmaCache,
    registry: &Registry,
    env: &Environment,
    mode: TransparencyMode,
    token: Token,
) -> Result<LemmaCollection, Error> {
    cache.get(registry, env, mode, token)
}

/// The lemmas of the configuration called `name` in `env`.
pub fn get_lemmas_by_name(
    cache: &mut LemmaCache,
    registry: &Registry,
    env: &Environment,
    mode: TransparencyMode,
    name: &tt::Name,
) -> Result<LemmaCollection, Error> {
    cache.get_by_name(registry, env, mode, name)
}

pub fn get_default_lemmas(
    cache: &mut LemmaCache,
    registry: &Registry,
    env: &Environment,
    mode: TransparencyMode,
) -> Result<LemmaCollection, Error> {
    cache.get_default(registry, env, mode)
}
