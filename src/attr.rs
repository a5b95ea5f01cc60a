use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::env::Environment;
use crate::error::Error;
use crate::tt::Name;

pub static INSTANCE_ATTR: Lazy<Name> = Lazy::new(|| Name::from_str("instance"));

/// Validates a declaration before it is tagged. Receives the declaration and the priority.
pub type CheckFn = fn(&Environment, &Name, u32) -> Result<(), Error>;

#[derive(Clone)]
pub struct AttributeDecl {
    pub name: Name,
    pub descr: String,
    check: Option<CheckFn>,
}

impl fmt::Debug for AttributeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDecl")
            .field("name", &self.name)
            .field("descr", &self.descr)
            .finish_non_exhaustive()
    }
}

impl AttributeDecl {
    pub fn new(name: Name, descr: impl Into<String>) -> AttributeDecl {
        AttributeDecl {
            name,
            descr: descr.into(),
            check: None,
        }
    }

    pub fn with_check(mut self, check: CheckFn) -> AttributeDecl {
        self.check = Some(check);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributeManager {
    attrs: HashMap<Name, AttributeDecl>,
}

impl AttributeManager {
    pub fn register(&mut self, decl: AttributeDecl) {
        self.attrs.insert(decl.name.clone(), decl);
    }

    pub fn is_registered(&self, name: &Name) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn get(&self, name: &Name) -> Option<&AttributeDecl> {
        self.attrs.get(name)
    }

    /// Tags `decl` with `attr` after running the attribute's check.
    pub fn set(
        &self,
        env: &Environment,
        attr: &Name,
        decl: &Name,
        prio: u32,
    ) -> Result<Environment, Error> {
        let Some(attr_decl) = self.attrs.get(attr) else {
            return Err(Error::UnknownAttribute { name: attr.clone() });
        };
        if env.get(decl).is_none() {
            return Err(Error::UnknownDeclaration { name: decl.clone() });
        }
        if let Some(check) = attr_decl.check {
            check(env, decl, prio)?;
        }
        log::debug!(target: "simp_lemmas", "@[{attr} {prio}] {decl}");
        Ok(env.add_attribute_instance(attr, decl, prio))
    }
}
