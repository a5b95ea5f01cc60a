use thiserror::Error;

use crate::tt::{Expr, Name};

/// Why a declaration cannot be used as a congruence rule. Positions are 1-based.
#[derive(Debug, Clone, Error)]
pub enum CongrError {
    #[error("resulting type is not of the form t ~ s, where '~' is a transitive and reflexive relation")]
    NotARelation,
    #[error("resulting type is not of the form ({head} ...) ~ ({head} ...)")]
    ShapeMismatch { head: String },
    #[error("the left-hand-side of the resulting type must be of the form (f x_1 ... x_n), where each x_i is a distinct variable or a sort")]
    ArgumentNotVariable,
    #[error("the left-hand-side of the resulting type must be of the form (λ/∀ (x : A), B x)")]
    InvalidBinderShape,
    #[error("the left-hand-side is neither an application nor a binder")]
    NotApplicationOrBinder,
    #[error("argument #{arg} of parameter #{param} contains unresolved parameters")]
    UnresolvedHypothesisParameter { arg: usize, param: usize },
    #[error("argument #{param} is not a valid hypothesis, the left-hand-side contains unresolved parameters")]
    UnresolvedHypothesisLhs { param: usize },
    #[error("argument #{param} is not a valid hypothesis, the right-hand-side must be of the form (m l_1 ... l_n) where m is a parameter that was not assigned yet and l_i's are locals")]
    InvalidHypothesisRhs { param: usize },
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid [simp] lemma '{name}' : {term}")]
    InvalidSimpLemma { name: Name, term: Expr },
    #[error("invalid [congr] lemma '{name}', {reason}")]
    InvalidCongrLemma { name: Name, reason: CongrError },
    #[error("unknown simp_lemmas collection '{name}'")]
    UnknownConfiguration { name: Name },
    #[error("unknown simp_lemmas token #{0}")]
    UnknownToken(usize),
    #[error("unknown declaration '{name}'")]
    UnknownDeclaration { name: Name },
    #[error("unknown attribute '{name}'")]
    UnknownAttribute { name: Name },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Invalid input is an error.
    Hard,
    /// Invalid input is logged and skipped.
    Soft,
}

/// Decides what happens to a lemma that cannot be built.
#[derive(Debug)]
pub struct Report {
    mode: Mode,
    diagnostics: Vec<Error>,
}

impl Report {
    pub fn new(mode: Mode) -> Report {
        Report {
            mode,
            diagnostics: vec![],
        }
    }

    pub fn hard() -> Report {
        Self::new(Mode::Hard)
    }

    pub fn soft() -> Report {
        Self::new(Mode::Soft)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn fail(&mut self, err: Error) -> Result<(), Error> {
        match self.mode {
            Mode::Hard => Err(err),
            Mode::Soft => {
                log::debug!(target: "simp_lemmas::failure", "{err}");
                self.diagnostics.push(err);
                Ok(())
            }
        }
    }

    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Error> {
        self.diagnostics
    }
}
