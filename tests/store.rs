mod common;

use common::*;
use simpset::builtin::EQ;
use simpset::{add_lemma, merge, HeadIndex, LemmaCollection, Report, TypeContext, DEFAULT_PRIORITY};

fn collection(ctx: &mut TypeContext, names: &[&str]) -> LemmaCollection {
    let mut lemmas = LemmaCollection::new();
    for n in names {
        lemmas = add_lemma(ctx, &lemmas, &name(n), DEFAULT_PRIORITY, &mut Report::hard()).unwrap();
    }
    lemmas
}

#[test]
fn merge_is_a_superset() {
    let mut ctx = TypeContext::new(base_env());
    let a = collection(&mut ctx, &["add_zero", "double_def"]);
    let b = collection(&mut ctx, &["zero_add", "add_comm"]);
    let merged = merge(&a, &b);
    for head in [HeadIndex::Const(name("nat.add")), HeadIndex::Const(name("double"))] {
        let all = merged.find(&EQ, &head).cloned().unwrap_or_default();
        for side in [&a, &b] {
            if let Some(bucket) = side.find(&EQ, &head) {
                assert!(bucket.iter().all(|lemma| all.contains(lemma)));
            }
        }
    }
    let ids: Vec<String> = merged
        .find(&EQ, &HeadIndex::Const(name("nat.add")))
        .unwrap()
        .iter()
        .map(|l| l.id().to_string())
        .collect();
    assert_eq!(ids, ["add_comm", "zero_add", "add_zero"]);
}

#[test]
fn insert_then_erase_restores_empty() {
    let mut ctx = TypeContext::new(base_env());
    let mut lemmas = collection(&mut ctx, &["add_zero"]);
    let mut found = vec![];
    lemmas.for_each(|rel, lemma| found.push((rel.clone(), lemma.clone())));
    for (rel, lemma) in &found {
        lemmas.erase(rel, lemma);
    }
    assert!(lemmas.is_empty());
    assert!(lemmas.find_relation(&EQ).is_none());
}

#[test]
fn erase_names() {
    let mut ctx = TypeContext::new(base_env());
    let mut lemmas = collection(&mut ctx, &["add_zero", "zero_add_and_add_zero", "double_def"]);
    lemmas.erase_names(&[name("zero_add_and_add_zero"), name("double_def")]);
    let mut ids = vec![];
    lemmas.for_each(|_, lemma| ids.push(lemma.id().to_string()));
    assert_eq!(ids, ["add_zero"]);
    assert!(lemmas.find(&EQ, &HeadIndex::Const(name("double"))).is_none());
}
