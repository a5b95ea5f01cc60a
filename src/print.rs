use std::fmt::Display;

use pretty::{Arena, DocAllocator, DocBuilder};

use crate::lemma::{SimpLemma, DEFAULT_PRIORITY};
use crate::store::LemmaCollection;
use crate::tt::{Expr, Name};

const WIDTH: usize = 80;

/// Turns terms into text. The default uses [Expr]'s `Display`.
pub trait ExprFormatter {
    fn format(&self, e: &Expr) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayFormatter;

impl ExprFormatter for DisplayFormatter {
    fn format(&self, e: &Expr) -> String {
        e.to_string()
    }
}

type Doc<'a> = DocBuilder<'a, Arena<'a>>;

struct Pretty<'a, F> {
    arena: &'a Arena<'a>,
    fmt: &'a F,
}

impl<'a, F: ExprFormatter> Pretty<'a, F> {
    fn expr(&self, e: &Expr) -> Doc<'a> {
        self.arena.text(self.fmt.format(e))
    }

    fn lemma(&self, lemma: &SimpLemma) -> Doc<'a> {
        let a = self.arena;
        let mut doc = a
            .text(format!("[{}]", lemma.id()))
            .append(a.space())
            .append(a.text(format!("#{}", lemma.num_emeta())));
        if lemma.priority() != DEFAULT_PRIORITY {
            doc = doc
                .append(a.space())
                .append(a.text(lemma.priority().to_string()).parens());
        }
        if lemma.is_refl() {
            doc = doc.append(a.space()).append(a.text("defeq"));
        }
        if lemma.is_permutation() {
            doc = doc.append(a.space()).append(a.text("perm"));
        }
        if lemma.is_congr() {
            let hyps = lemma.congr_hyps().iter().filter_map(|h| h.as_meta()).map(|h| {
                a.space().append(self.expr(&h.ty).parens())
            });
            doc = doc.append(a.concat(hyps).group());
        }
        let rule = a
            .text(",")
            .append(a.space())
            .append(self.expr(lemma.lhs()))
            .append(a.space())
            .append(a.text("↦"))
            .append(a.line().append(self.expr(lemma.rhs())).nest(2));
        doc.append(rule.group())
    }

    fn section(
        &self,
        title: &str,
        header: Option<&str>,
        lemmas: &LemmaCollection,
        congr: bool,
    ) -> Doc<'a> {
        let a = self.arena;
        let mut entries: Vec<(Name, SimpLemma)> = vec![];
        let mut push = |rel: &Name, lemma: &SimpLemma| entries.push((rel.clone(), lemma.clone()));
        if congr {
            lemmas.for_each_congr(&mut push);
        } else {
            lemmas.for_each(&mut push);
        }
        let mut doc = a.nil();
        let mut prev: Option<Name> = None;
        for (rel, lemma) in entries {
            if prev.as_ref() != Some(&rel) {
                doc = doc.append(a.text(format!("{title} {rel}")));
                if let Some(header) = header {
                    doc = doc.append(a.text(header.to_owned()));
                }
                doc = doc.append(a.hardline());
                prev = Some(rel);
            }
            doc = doc.append(self.lemma(&lemma)).append(a.hardline());
        }
        doc
    }
}

fn render(doc: Doc<'_>) -> String {
    doc.pretty(WIDTH).to_string()
}

/// `[id] #n (prio) defeq perm (hyps), lhs ↦ rhs`
pub fn pp_lemma(fmt: &impl ExprFormatter, lemma: &SimpLemma) -> String {
    let arena = Arena::new();
    let p = Pretty { arena: &arena, fmt };
    render(p.lemma(lemma))
}

/// The simplification lemmas of `lemmas`, grouped by relation. `header` is appended to
/// every group title.
pub fn pp_simp(fmt: &impl ExprFormatter, lemmas: &LemmaCollection, header: Option<&str>) -> String {
    let arena = Arena::new();
    let p = Pretty { arena: &arena, fmt };
    render(p.section("simplification rules for", header, lemmas, false))
}

pub fn pp_congr(fmt: &impl ExprFormatter, lemmas: &LemmaCollection) -> String {
    let arena = Arena::new();
    let p = Pretty { arena: &arena, fmt };
    render(p.section("congruence rules for", None, lemmas, true))
}

pub fn pp_lemmas(fmt: &impl ExprFormatter, lemmas: &LemmaCollection) -> String {
    let arena = Arena::new();
    let p = Pretty { arena: &arena, fmt };
    let simp = p.section("simplification rules for", None, lemmas, false);
    render(simp.append(p.section("congruence rules for", None, lemmas, true)))
}

impl Display for SimpLemma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = Arena::new();
        let p = Pretty {
            arena: &arena,
            fmt: &DisplayFormatter,
        };
        p.lemma(self).render_fmt(WIDTH, f)
    }
}

impl Display for LemmaCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&pp_lemmas(&DisplayFormatter, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{EQ, IFF};
    use crate::lemma::LemmaHeader;
    use crate::tt::{mk_const, mk_meta, mk_prop, Id};

    fn constant(name: &str) -> Expr {
        mk_const(Name::from_str(name), vec![])
    }

    fn header(id: &str, emetas: Vec<Expr>, lhs: Expr, rhs: Expr, priority: u32) -> LemmaHeader {
        let instances = vec![false; emetas.len()];
        LemmaHeader {
            id: Name::from_str(id),
            umetas: vec![],
            emetas,
            instances,
            lhs,
            rhs,
            priority,
        }
    }

    #[test]
    fn lemma_tags() {
        let m = mk_meta(Id::fresh(), Name::from_str("x_0"), constant("nat"));
        let add = |a: Expr, b: Expr| constant("nat.add").apply([a, b]);
        let comm = SimpLemma::simp(
            header("add_comm", vec![m.clone(), m.clone()], add(m.clone(), constant("one")), add(constant("one"), m.clone()), 10),
            constant("add_comm"),
            true,
        );
        assert_eq!(
            comm.to_string(),
            "[add_comm] #2 (10) perm, nat.add ?x_0 one ↦ nat.add one ?x_0"
        );

        let refl = SimpLemma::refl(header(
            "double_def",
            vec![m.clone()],
            constant("double").apply([m.clone()]),
            add(m.clone(), m.clone()),
            DEFAULT_PRIORITY,
        ));
        assert_eq!(
            pp_lemma(&DisplayFormatter, &refl),
            "[double_def] #1 defeq, double ?x_0 ↦ nat.add ?x_0 ?x_0"
        );
    }

    #[test]
    fn congruence_lists_hypotheses() {
        let p = mk_meta(Id::fresh(), Name::from_str("x_0"), mk_prop());
        let q = mk_meta(Id::fresh(), Name::from_str("x_1"), mk_prop());
        let h = mk_meta(Id::fresh(), Name::from_str("x_2"), crate::builtin::mk_iff(p.clone(), q.clone()));
        let lemma = SimpLemma::congr(
            header("not_congr", vec![h.clone(), q.clone(), p.clone()], crate::builtin::mk_not(p), crate::builtin::mk_not(q), DEFAULT_PRIORITY),
            constant("not_congr"),
            vec![h],
        );
        assert_eq!(
            lemma.to_string(),
            "[not_congr] #3 (iff ?x_0 ?x_1), not ?x_0 ↦ not ?x_1"
        );
    }

    #[test]
    fn collection_groups_by_relation() {
        let mut lemmas = LemmaCollection::new();
        lemmas.insert(
            &EQ,
            SimpLemma::simp(header("a", vec![], constant("f"), constant("g"), DEFAULT_PRIORITY), constant("a"), false),
        );
        lemmas.insert(
            &IFF,
            SimpLemma::simp(header("b", vec![], constant("p"), constant("true"), DEFAULT_PRIORITY), constant("b"), false),
        );
        assert_eq!(
            pp_simp(&DisplayFormatter, &lemmas, Some(" (default)")),
            "simplification rules for eq (default)\n[a] #0, f ↦ g\nsimplification rules for iff (default)\n[b] #0, p ↦ true\n"
        );
        assert_eq!(pp_congr(&DisplayFormatter, &lemmas), "");
    }
}
