use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::attr::{AttributeDecl, AttributeManager, INSTANCE_ATTR};
use crate::congr::add_congruence;
use crate::ctx::TypeContext;
use crate::env::Environment;
use crate::error::{Error, Report};
use crate::lemma::add_lemma;
use crate::store::LemmaCollection;
use crate::tt::Name;

pub static DEFAULT_CONFIG: Lazy<Name> = Lazy::new(|| Name::from_str("default"));
pub static SIMP_ATTR: Lazy<Name> = Lazy::new(|| Name::from_str("simp"));
pub static WRAPPER_EQ_ATTR: Lazy<Name> = Lazy::new(|| Name::from_str("wrapper_eq"));
pub static CONGR_ATTR: Lazy<Name> = Lazy::new(|| Name::from_str("congr"));

/// Identifies a registered configuration. Tokens are dense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeConfig {
    pub simp_attrs: Vec<Name>,
    pub congr_attrs: Vec<Name>,
}

fn check_simp(env: &Environment, decl: &Name, prio: u32) -> Result<(), Error> {
    let mut ctx = TypeContext::new(env.clone());
    add_lemma(&mut ctx, &LemmaCollection::new(), decl, prio, &mut Report::hard())?;
    Ok(())
}

fn check_congr(env: &Environment, decl: &Name, prio: u32) -> Result<(), Error> {
    let mut ctx = TypeContext::new(env.clone());
    add_congruence(&mut ctx, &LemmaCollection::new(), decl, prio, &mut Report::hard())?;
    Ok(())
}

/// The known tags and the configurations built from them.
#[derive(Debug, Clone)]
pub struct Registry {
    attributes: AttributeManager,
    configs: Vec<AttributeConfig>,
    tokens: HashMap<Name, Token>,
    default_token: Token,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        let mut attributes = AttributeManager::default();
        attributes.register(AttributeDecl::new(INSTANCE_ATTR.clone(), "type class instance"));
        let mut registry = Registry {
            attributes,
            configs: vec![],
            tokens: HashMap::new(),
            default_token: Token(0),
        };
        registry.default_token = registry.register_configuration(
            DEFAULT_CONFIG.clone(),
            vec![SIMP_ATTR.clone(), WRAPPER_EQ_ATTR.clone()],
            vec![CONGR_ATTR.clone()],
        );
        registry
    }

    /// Registers a configuration scanning `simp_attrs` and `congr_attrs`. Tags that are not
    /// known yet are registered with a check that builds the lemma at tagging time.
    pub fn register_configuration(
        &mut self,
        name: Name,
        simp_attrs: Vec<Name>,
        congr_attrs: Vec<Name>,
    ) -> Token {
        for attr in &simp_attrs {
            if !self.attributes.is_registered(attr) {
                self.attributes.register(
                    AttributeDecl::new(attr.clone(), format!("simplification lemma ({name})"))
                        .with_check(check_simp),
                );
            }
        }
        for attr in &congr_attrs {
            if !self.attributes.is_registered(attr) {
                self.attributes.register(
                    AttributeDecl::new(attr.clone(), format!("congruence lemma ({name})"))
                        .with_check(check_congr),
                );
            }
        }
        let token = Token(self.configs.len());
        self.configs.push(AttributeConfig {
            simp_attrs,
            congr_attrs,
        });
        log::debug!(target: "simp_lemmas", "registered configuration {name} as token #{}", token.0);
        self.tokens.insert(name, token);
        token
    }

    pub fn config(&self, token: Token) -> Result<&AttributeConfig, Error> {
        self.configs.get(token.0).ok_or(Error::UnknownToken(token.0))
    }

    pub fn token(&self, name: &Name) -> Result<Token, Error> {
        self.tokens
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownConfiguration { name: name.clone() })
    }

    pub fn default_token(&self) -> Token {
        self.default_token
    }

    pub fn attributes(&self) -> &AttributeManager {
        &self.attributes
    }

    /// Tags `decl` with `attr`, failing if the declaration is not a valid lemma for it.
    pub fn tag(&self, env: &Environment, attr: &Name, decl: &Name, prio: u32) -> Result<Environment, Error> {
        self.attributes.set(env, attr, decl, prio)
    }
}
