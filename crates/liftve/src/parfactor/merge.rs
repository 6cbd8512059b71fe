//! Merging two parfactors back into one.
//!
//! Two parfactors merge when they have (nearly) equal potentials and are
//! both restrictions of one parfactor on a single "split" variable whose
//! allowed values are disjoint between them. A constant in one of the
//! parfactors counts as a split variable with one allowed value.
//!
//! Splits involving inequalities between variables are not recovered:
//! intersecting excluded sets that mention variables can leave the merged
//! constraint outside normal form.

use std::collections::{BTreeMap, BTreeSet};

use liftve_ir::{Arg, Constraint, CountingTerm, FuncApp, LogicalVar, Substitution, Term, Vocabulary};

use super::Parfactor;

struct Merger<'a> {
    c1: &'a Constraint,
    c2: &'a Constraint,
    /// Merged variable to argument in the first parfactor
    s1: Substitution,
    /// Merged variable to argument in the second parfactor
    s2: Substitution,
    split: Option<LogicalVar>,
    vocab: &'a Vocabulary,
}

impl Parfactor {
    /// A single parfactor with the same weighting function as `self` and
    /// `other` together, if one can be found.
    pub fn get_merged(&self, other: &Parfactor, tolerance: f64, vocab: &Vocabulary) -> Option<Parfactor> {
        if !self.potential.within_tolerance(&other.potential, tolerance) || self.terms.len() != other.terms.len() {
            return None;
        }

        let mut merger = Merger {
            c1: &self.constraint,
            c2: &other.constraint,
            s1: Substitution::new(),
            s2: Substitution::new(),
            split: None,
            vocab,
        };
        let mut terms = Vec::with_capacity(self.terms.len());
        let mut vars: Vec<LogicalVar> = Vec::new();
        for (t1, t2) in self.terms.iter().zip(&other.terms) {
            let merged = merger.merge_top_level(t1, t2)?;
            for v in merged.free_vars() {
                if !vars.contains(&v) {
                    vars.push(v);
                }
            }
            terms.push(merged);
        }

        // every quantified variable of both inputs must be accounted for
        let covers = |pf: &Parfactor, s: &Substitution| {
            pf.vars
                .iter()
                .all(|x| vars.iter().any(|v| s.replacement(*v) == Arg::Var(*x)))
        };
        if !covers(self, &merger.s1) || !covers(other, &merger.s2) {
            return None;
        }

        let mut excluded = BTreeMap::new();
        for x in &vars {
            excluded.insert(*x, merger.merge_excluded_sets(*x)?);
        }
        merger.split?;

        let constraint = Constraint::from_excluded(excluded);
        if !constraint.is_normal_form() {
            return None;
        }
        Parfactor::new(vars, constraint, terms, self.potential.clone(), vocab).ok()
    }
}

impl Merger<'_> {
    fn merge_top_level(&mut self, t1: &Term, t2: &Term) -> Option<Term> {
        match (t1, t2) {
            (Term::FuncApp(a), Term::FuncApp(b)) => self.merge_func_apps(a, b).map(Term::FuncApp),
            (Term::Counting(a), Term::Counting(b)) => self.merge_counting_terms(a, b).map(Term::Counting),
            _ => None,
        }
    }

    fn merge_func_apps(&mut self, a: &FuncApp, b: &FuncApp) -> Option<FuncApp> {
        if a.func() != b.func() || a.args().len() != b.args().len() {
            return None;
        }
        let args = a
            .args()
            .iter()
            .zip(b.args())
            .map(|(x, y)| self.merge_args(*x, *y))
            .collect::<Option<Vec<Arg>>>()?;
        Some(FuncApp::new(a.func(), args))
    }

    fn merge_counting_terms(&mut self, a: &CountingTerm, b: &CountingTerm) -> Option<CountingTerm> {
        if a.var().domain() != b.var().domain() {
            return None;
        }
        let bound = self.vocab.fresh_like(a.var());
        self.s1.bind(bound, Arg::Var(a.var()));
        self.s2.bind(bound, Arg::Var(b.var()));
        let sub = self.merge_func_apps(a.sub(), b.sub());
        let excl1 = excluded_for_merge(a.constraint().excluded(a.var()), &self.s1);
        let excl2 = excluded_for_merge(b.constraint().excluded(b.var()), &self.s2);
        self.s1.remove(bound);
        self.s2.remove(bound);

        let (sub, excl1, excl2) = (sub?, excl1?, excl2?);
        if excl1 != excl2 {
            return None;
        }
        let constraint = Constraint::from_excluded(BTreeMap::from([(bound, excl1)]));
        Some(CountingTerm::new(bound, constraint, sub))
    }

    fn merge_args(&mut self, t1: Arg, t2: Arg) -> Option<Arg> {
        if !t1.is_var() && t1 == t2 {
            return Some(t1);
        }
        let pre1 = self.s1.preimage(t1, false);
        let pre2 = self.s2.preimage(t2, false);
        if pre1 != pre2 {
            return None;
        }
        if let Some(x) = pre1.first() {
            return Some(Arg::Var(*x));
        }

        let merged = self.vocab.new_var(t1.domain());
        if !t1.is_var() || !t2.is_var() {
            if self.split.is_some() {
                return None;
            }
            self.split = Some(merged);
        }
        self.s1.bind(merged, t1);
        self.s2.bind(merged, t2);
        Some(Arg::Var(merged))
    }

    fn merge_excluded_sets(&mut self, x: LogicalVar) -> Option<BTreeSet<Arg>> {
        match (self.s1.replacement(x), self.s2.replacement(x)) {
            (Arg::Const(a), Arg::Const(b)) => Some(
                self.vocab
                    .constants(x.domain())
                    .filter(|c| *c != a && *c != b)
                    .map(Arg::Const)
                    .collect(),
            ),
            (Arg::Const(a), Arg::Var(x2)) => reduce_excluded_set(x2, self.c2, Arg::Const(a)),
            (Arg::Var(x1), Arg::Const(b)) => reduce_excluded_set(x1, self.c1, Arg::Const(b)),
            (Arg::Var(x1), Arg::Var(x2)) => {
                let excl1 = excluded_for_merge(self.c1.excluded(x1), &self.s1)?;
                let excl2 = excluded_for_merge(self.c2.excluded(x2), &self.s2)?;
                if excl1 == excl2 {
                    return Some(excl1);
                }
                // disjoint allowed sets make x the split variable
                let only_constants = excl1.iter().chain(&excl2).all(|t| !t.is_var());
                let union = excl1.union(&excl2).count();
                if self.split.is_none() && only_constants && union == self.vocab.domain_size(x.domain()) {
                    self.split = Some(x);
                    return Some(excl1.intersection(&excl2).copied().collect());
                }
                None
            }
        }
    }
}

/// The excluded set of `x` in `c` without `to_include`, provided `c`
/// excluded it and `x` has no variable inequalities.
fn reduce_excluded_set(x: LogicalVar, c: &Constraint, to_include: Arg) -> Option<BTreeSet<Arg>> {
    let mut excluded = c.excluded(x).clone();
    if excluded.iter().any(Arg::is_var) || !excluded.remove(&to_include) {
        return None;
    }
    Some(excluded)
}

/// Translate an excluded set back to merged variables.
fn excluded_for_merge(excluded: &BTreeSet<Arg>, s: &Substitution) -> Option<BTreeSet<Arg>> {
    excluded
        .iter()
        .map(|t| match t {
            Arg::Var(_) => {
                let pre = s.preimage(*t, false);
                match (pre.len(), pre.first()) {
                    (1, Some(x)) => Some(Arg::Var(*x)),
                    _ => None,
                }
            }
            Arg::Const(_) => Some(*t),
        })
        .collect()
}
