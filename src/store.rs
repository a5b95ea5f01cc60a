use std::collections::HashSet;

use crate::lemma::SimpLemma;
use crate::tt::{Expr, Id, Name};

/// The key lemmas are bucketed by: the kind of the head of the lhs, and its name for
/// constants, locals and metavariables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeadIndex {
    Var,
    Sort,
    Const(Name),
    Local(Id),
    Meta(Id),
    Lam,
    Pi,
    Let,
    Macro(Name),
}

impl HeadIndex {
    pub fn of(e: &Expr) -> HeadIndex {
        match e.head() {
            Expr::Var(_) => HeadIndex::Var,
            Expr::Sort(_) => HeadIndex::Sort,
            Expr::Const(inner) => HeadIndex::Const(inner.name.clone()),
            Expr::Local(inner) => HeadIndex::Local(inner.id),
            Expr::Meta(inner) => HeadIndex::Meta(inner.id),
            Expr::Lam(_) => HeadIndex::Lam,
            Expr::Pi(_) => HeadIndex::Pi,
            Expr::Let(_) => HeadIndex::Let,
            Expr::Macro(inner) => HeadIndex::Macro(inner.def.clone()),
            Expr::App(_) => unreachable!("head of an application is never an application"),
        }
    }
}

/// Lemmas bucketed by the head of their lhs. Each bucket is ordered by priority, higher
/// first, and among equal priorities the most recently inserted first.
#[derive(Debug, Clone, Default)]
pub struct HeadMap(im::OrdMap<HeadIndex, im::Vector<SimpLemma>>);

impl HeadMap {
    pub fn insert(&mut self, lemma: SimpLemma) {
        let key = HeadIndex::of(lemma.lhs());
        let mut bucket = self.0.get(&key).cloned().unwrap_or_default();
        bucket.retain(|other| *other != lemma);
        let pos = bucket
            .iter()
            .position(|other| other.priority() <= lemma.priority())
            .unwrap_or(bucket.len());
        bucket.insert(pos, lemma);
        self.0.insert(key, bucket);
    }

    pub fn erase(&mut self, lemma: &SimpLemma) {
        let key = HeadIndex::of(lemma.lhs());
        let Some(bucket) = self.0.get(&key) else {
            return;
        };
        let mut bucket = bucket.clone();
        bucket.retain(|other| other != lemma);
        if bucket.is_empty() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, bucket);
        }
    }

    pub fn find(&self, key: &HeadIndex) -> Option<&im::Vector<SimpLemma>> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(|bucket| bucket.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimpLemma> {
        self.0.values().flat_map(|bucket| bucket.iter())
    }
}

/// The lemmas of one relation.
#[derive(Debug, Clone)]
pub struct LemmaSetForRelation {
    pub eqv: Name,
    pub simp: HeadMap,
    pub congr: HeadMap,
}

impl LemmaSetForRelation {
    pub fn new(eqv: Name) -> LemmaSetForRelation {
        LemmaSetForRelation {
            eqv,
            simp: HeadMap::default(),
            congr: HeadMap::default(),
        }
    }

    pub fn insert(&mut self, lemma: SimpLemma) {
        match lemma {
            SimpLemma::Congr(_) => self.congr.insert(lemma),
            SimpLemma::Simp(_) | SimpLemma::Refl(_) => self.simp.insert(lemma),
        }
    }

    pub fn erase(&mut self, lemma: &SimpLemma) {
        match lemma {
            SimpLemma::Congr(_) => self.congr.erase(lemma),
            SimpLemma::Simp(_) | SimpLemma::Refl(_) => self.simp.erase(lemma),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.simp.is_empty() && self.congr.is_empty()
    }
}

/// Simplification and congruence lemmas grouped by relation. Cloning shares structure.
#[derive(Debug, Clone, Default)]
pub struct LemmaCollection(im::OrdMap<Name, LemmaSetForRelation>);

impl LemmaCollection {
    pub fn new() -> LemmaCollection {
        Self::default()
    }

    pub fn insert(&mut self, rel: &Name, lemma: SimpLemma) {
        let mut set = self
            .0
            .get(rel)
            .cloned()
            .unwrap_or_else(|| LemmaSetForRelation::new(rel.clone()));
        set.insert(lemma);
        self.0.insert(rel.clone(), set);
    }

    pub fn erase(&mut self, rel: &Name, lemma: &SimpLemma) {
        let Some(set) = self.0.get(rel) else {
            return;
        };
        let mut set = set.clone();
        set.erase(lemma);
        if set.is_empty() {
            self.0.remove(rel);
        } else {
            self.0.insert(rel.clone(), set);
        }
    }

    /// Removes every lemma whose id is in `names`.
    ///
    /// This visits every lemma of the collection; there is no index by id.
    pub fn erase_names(&mut self, names: &[Name]) {
        let names: HashSet<&Name> = names.iter().collect();
        let mut doomed = vec![];
        for (rel, set) in &self.0 {
            for lemma in set.simp.iter().chain(set.congr.iter()) {
                if names.contains(lemma.id()) {
                    doomed.push((rel.clone(), lemma.clone()));
                }
            }
        }
        for (rel, lemma) in doomed {
            self.erase(&rel, &lemma);
        }
    }

    pub fn find(&self, rel: &Name, head: &HeadIndex) -> Option<&im::Vector<SimpLemma>> {
        self.0.get(rel)?.simp.find(head)
    }

    pub fn find_congr(&self, rel: &Name, head: &HeadIndex) -> Option<&im::Vector<SimpLemma>> {
        self.0.get(rel)?.congr.find(head)
    }

    pub fn find_relation(&self, rel: &Name) -> Option<&LemmaSetForRelation> {
        self.0.get(rel)
    }

    pub fn relations(&self) -> Vec<Name> {
        self.0.keys().cloned().collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Name, &SimpLemma)) {
        for (rel, set) in &self.0 {
            for lemma in set.simp.iter() {
                f(rel, lemma);
            }
        }
    }

    pub fn for_each_congr(&self, mut f: impl FnMut(&Name, &SimpLemma)) {
        for (rel, set) in &self.0 {
            for lemma in set.congr.iter() {
                f(rel, lemma);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ptr_eq(&self, other: &LemmaCollection) -> bool {
        self.0.ptr_eq(&other.0)
    }

    pub(crate) fn sets(&self) -> impl Iterator<Item = &LemmaSetForRelation> {
        self.0.values()
    }
}

fn merge_head_maps(target: &mut HeadMap, source: &HeadMap) {
    let lemmas: Vec<&SimpLemma> = source.iter().collect();
    for lemma in lemmas.into_iter().rev() {
        target.insert(lemma.clone());
    }
}

/// Unions two collections. Inserting the lemmas of `b` back to front keeps their relative
/// order within each bucket.
pub fn merge(a: &LemmaCollection, b: &LemmaCollection) -> LemmaCollection {
    if a.is_empty() {
        return b.clone();
    }
    if b.is_empty() {
        return a.clone();
    }
    let mut result = a.clone();
    for set in b.sets() {
        let mut merged = match result.0.get(&set.eqv) {
            Some(existing) => existing.clone(),
            None => {
                result.0.insert(set.eqv.clone(), set.clone());
                continue;
            }
        };
        merge_head_maps(&mut merged.simp, &set.simp);
        merge_head_maps(&mut merged.congr, &set.congr);
        result.0.insert(set.eqv.clone(), merged);
    }
    result
}
