//! Expanding counting terms.

use std::collections::BTreeSet;

use liftve_ir::{Arg, CountingTerm, FuncApp, Histogram, LogicalVar, Substitution, Term, Vocabulary};
use tracing::trace;

use super::Parfactor;
use crate::error::Result;
use crate::potential::Potential;

impl Parfactor {
    /// Pull the binding `cvar = t` out of the counting term at `index`,
    /// splitting this parfactor first when the split is not uniform.
    pub fn expand_count(
        &self,
        cvar: LogicalVar,
        t: Arg,
        index: usize,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<Parfactor> {
        let ct = self.counting_term(index)?.clone();

        if let Arg::Var(tv) = t {
            if !self.vars.contains(&tv) {
                let mut terms = self.terms.clone();
                terms[index] = Term::Counting(ct.rename_counting_var(tv));
                return Parfactor::new(
                    self.vars.clone(),
                    self.constraint.clone(),
                    terms,
                    self.potential.clone(),
                    vocab,
                );
            }
        }

        let c_excluded = ct.constraint().excluded(cvar);
        match t {
            Arg::Var(x) => {
                if self.constraint.allows_some_allowed_by(x, c_excluded, vocab)
                    && !self.constraint.allows_only_allowed_by(x, c_excluded)
                {
                    return self.split_on_constraint(x, c_excluded, residuals, vocab);
                }
            }
            Arg::Const(_) => {
                for x in c_excluded.iter().filter_map(Arg::as_var) {
                    if self.vars.contains(&x) && !self.constraint.excluded(x).contains(&t) {
                        return self.split_on(x, t, residuals, vocab);
                    }
                }
            }
        }

        trace!(parfactor = %self, counting_term = %ct, var = %cvar, term = %t, "expanding count");
        let pulled = ct.replace_count_var(t);
        let mut remaining = Vec::new();
        let count_constraint = ct.constraint().add_constraint(cvar, t);
        if !count_constraint.has_contradiction(vocab) {
            let simplified = count_constraint.simplified(&self.constraint, vocab);
            remaining.push(CountingTerm::new(cvar, simplified, ct.sub().clone()));
        }
        self.expand_count_into(index, remaining, vec![pulled], vocab)
    }

    /// Split the counting term at `index` so that its counting variable `l`
    /// ranges either inside or outside the values `excluded_in_other`
    /// allows.
    pub fn expand_count_on_constraint(
        &self,
        l: LogicalVar,
        excluded_in_other: &BTreeSet<Arg>,
        index: usize,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<Parfactor> {
        let orig = self.counting_term(index)?.clone();
        let excluded_in_orig = orig.constraint().excluded(l).clone();
        for x in excluded_in_orig.iter().filter_map(Arg::as_var) {
            if self.vars.contains(&x)
                && self.constraint.allows_some_allowed_by(x, excluded_in_other, vocab)
                && !self.constraint.allows_only_allowed_by(x, excluded_in_other)
            {
                return self.split_on_constraint(x, excluded_in_other, residuals, vocab);
            }
        }

        trace!(parfactor = %self, counting_term = %orig, "expanding count on constraint");
        let mut excluded_in_overlap = excluded_in_orig.clone();
        excluded_in_overlap.extend(excluded_in_other.iter().copied());
        let overlap = orig
            .constraint()
            .replace_excluded(l, excluded_in_overlap.clone())
            .simplified(&self.constraint, vocab);
        let mut counting_terms = vec![CountingTerm::new(l, overlap, orig.sub().clone())];

        let mut func_apps = Vec::new();
        let mut excluded_in_main = excluded_in_orig.clone();
        for term in excluded_in_other {
            if term.is_var() && !excluded_in_orig.contains(term) {
                func_apps.push(orig.sub().apply(&Substitution::singleton(l, *term)));
                excluded_in_main.insert(*term);
            }
        }

        if excluded_in_overlap.len() > excluded_in_main.len() {
            excluded_in_main.extend(
                vocab
                    .constants(l.domain())
                    .map(Arg::Const)
                    .filter(|c| !excluded_in_other.contains(c)),
            );
            let residual = orig
                .constraint()
                .replace_excluded(l, excluded_in_main)
                .simplified(&self.constraint, vocab);
            let main = CountingTerm::new(l, residual, orig.sub().clone());
            counting_terms.push(main.rename_counting_var(vocab.fresh_like(l)));
        }

        self.expand_count_into(index, counting_terms, func_apps, vocab)
    }

    /// Replace the counting term at `index` by `counting_terms` followed by
    /// `func_apps`, whose values together make up the old histogram.
    pub fn expand_count_into(
        &self,
        index: usize,
        counting_terms: Vec<CountingTerm>,
        func_apps: Vec<FuncApp>,
        vocab: &Vocabulary,
    ) -> Result<Parfactor> {
        let old_type = self.counting_term(index)?.histogram_type(vocab);
        let buckets = old_type.num_buckets();

        // every histogram of each new counting term, by rank
        let new_hists: Vec<Vec<Histogram>> = counting_terms
            .iter()
            .map(|ct| ct.histogram_type(vocab).iter().collect())
            .collect();
        let num_counting = counting_terms.len();
        let num_func_apps = func_apps.len();

        let mut terms: Vec<Term> = self.terms[..index].to_vec();
        terms.extend(counting_terms.into_iter().map(Term::Counting));
        terms.extend(func_apps.into_iter().map(Term::FuncApp));
        terms.extend(self.terms[index + 1..].iter().cloned());
        let shape: Vec<usize> = terms.iter().map(|t| t.range_size(vocab)).collect();

        let mut old_idx = vec![0usize; self.terms.len()];
        let mut values = Vec::with_capacity(shape.iter().product());
        for new_idx in crate::potential::assignments(&shape) {
            old_idx[..index].copy_from_slice(&new_idx[..index]);
            let mut counts = vec![0usize; buckets];
            for (k, hists) in new_hists.iter().enumerate() {
                for (slot, c) in counts.iter_mut().zip(hists[new_idx[index + k]].counts()) {
                    *slot += c;
                }
            }
            for k in 0..num_func_apps {
                counts[new_idx[index + num_counting + k]] += 1;
            }
            old_idx[index] = old_type.index_of(&Histogram::new(counts))?;
            old_idx[index + 1..].copy_from_slice(&new_idx[index + num_counting + num_func_apps..]);
            values.push(self.potential.value(&old_idx)?);
        }

        let potential = Potential::from_vec(&shape, values)?;
        Parfactor::new(self.vars.clone(), self.constraint.clone(), terms, potential, vocab)
    }
}
