use std::collections::HashMap;

use crate::congr::add_congruence;
use crate::ctx::{TransparencyMode, TypeContext};
use crate::env::Environment;
use crate::error::{Error, Report};
use crate::lemma::add_lemma;
use crate::registry::{Registry, Token};
use crate::store::LemmaCollection;
use crate::tt::Name;

#[derive(Debug, Clone)]
struct CacheEntry {
    env: Environment,
    // one per scanned tag, simp tags first
    fingerprints: Vec<u64>,
    reducibility_fingerprint: u64,
    lemmas: Option<LemmaCollection>,
    diagnostics: Vec<Error>,
}

impl CacheEntry {
    fn new(env: &Environment) -> CacheEntry {
        CacheEntry {
            env: env.clone(),
            fingerprints: vec![],
            reducibility_fingerprint: 0,
            lemmas: None,
            diagnostics: vec![],
        }
    }
}

/// Lemma collections per transparency mode and configuration, kept as long as the
/// environment they were built from is an ancestor of the queried one and none of the
/// scanned tags changed.
///
/// A cache is meant to be owned by a single worker; it is not shared.
#[derive(Debug, Default)]
pub struct LemmaCache {
    entries: HashMap<(TransparencyMode, Token), CacheEntry>,
}

fn attrs_of<'a>(registry: &'a Registry, token: Token) -> Result<impl Iterator<Item = &'a Name>, Error> {
    let config = registry.config(token)?;
    Ok(config.simp_attrs.iter().chain(&config.congr_attrs))
}

fn is_compatible(registry: &Registry, entry: &CacheEntry, env: &Environment, token: Token) -> Result<bool, Error> {
    if !env.is_descendant(&entry.env) {
        return Ok(false);
    }
    if env.reducibility_fingerprint() != entry.reducibility_fingerprint {
        return Ok(false);
    }
    let fingerprints: Vec<u64> = attrs_of(registry, token)?
        .map(|attr| env.attribute_fingerprint(attr))
        .collect();
    Ok(fingerprints == entry.fingerprints)
}

fn mk_lemmas(
    registry: &Registry,
    entry: &mut CacheEntry,
    env: &Environment,
    mode: TransparencyMode,
    token: Token,
) -> Result<LemmaCollection, Error> {
    log::trace!(target: "simp_lemmas_cache", "make simp lemmas [{}]", token.0);
    let config = registry.config(token)?;
    let mut ctx = TypeContext::with_mode(env.clone(), mode);
    let mut report = Report::soft();
    let mut lemmas = LemmaCollection::new();
    let mut fingerprints = vec![];
    for attr in &config.simp_attrs {
        // oldest first, so that later tags take precedence among equal priorities
        for (name, prio) in env.attribute_instances(attr).into_iter().rev() {
            lemmas = add_lemma(&mut ctx, &lemmas, &name, prio, &mut report)?;
        }
        fingerprints.push(env.attribute_fingerprint(attr));
    }
    for attr in &config.congr_attrs {
        for (name, prio) in env.attribute_instances(attr).into_iter().rev() {
            lemmas = add_congruence(&mut ctx, &lemmas, &name, prio, &mut report)?;
        }
        fingerprints.push(env.attribute_fingerprint(attr));
    }
    entry.env = env.clone();
    entry.fingerprints = fingerprints;
    entry.reducibility_fingerprint = env.reducibility_fingerprint();
    entry.lemmas = Some(lemmas.clone());
    entry.diagnostics = report.into_diagnostics();
    Ok(lemmas)
}

impl LemmaCache {
    pub fn new() -> LemmaCache {
        Self::default()
    }

    pub fn get(
        &mut self,
        registry: &Registry,
        env: &Environment,
        mode: TransparencyMode,
        token: Token,
    ) -> Result<LemmaCollection, Error> {
        registry.config(token)?;
        let entry = self
            .entries
            .entry((mode, token))
            .or_insert_with(|| CacheEntry::new(env));
        let Some(lemmas) = &entry.lemmas else {
            return mk_lemmas(registry, entry, env, mode, token);
        };
        if env.ptr_eq(&entry.env) || is_compatible(registry, entry, env, token)? {
            log::trace!(target: "simp_lemmas_cache", "reusing cached simp lemmas [{}]", token.0);
            return Ok(lemmas.clone());
        }
        log::trace!(target: "simp_lemmas_cache", "creating new cache");
        mk_lemmas(registry, entry, env, mode, token)
    }

    /// Like [LemmaCache::get], looking the configuration up by name.
    pub fn get_by_name(
        &mut self,
        registry: &Registry,
        env: &Environment,
        mode: TransparencyMode,
        name: &Name,
    ) -> Result<LemmaCollection, Error> {
        let token = registry.token(name)?;
        self.get(registry, env, mode, token)
    }

    pub fn get_default(
        &mut self,
        registry: &Registry,
        env: &Environment,
        mode: TransparencyMode,
    ) -> Result<LemmaCollection, Error> {
        self.get(registry, env, mode, registry.default_token())
    }

    /// The lemmas skipped by the last build for `(mode, token)`.
    pub fn diagnostics(&self, mode: TransparencyMode, token: Token) -> &[Error] {
        match self.entries.get(&(mode, token)) {
            Some(entry) => &entry.diagnostics,
            None => &[],
        }
    }
}
