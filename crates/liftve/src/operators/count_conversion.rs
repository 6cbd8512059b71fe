use liftve_ir::{Arg, CountingTerm, FuncApp, Histogram, LogicalVar, Substitution, Term, Vocabulary};
use tracing::trace;

use super::{ln, LiftedOperator, OperatorKind};
use crate::error::Result;
use crate::parfactor::Parfactor;
use crate::potential::{assignments, Potential};

/// Fold a logical variable that occurs in a single function application
/// into a counting dimension over that application.
#[derive(Debug, Clone)]
pub struct CountConversion {
    target: usize,
    var: LogicalVar,
    /// Position of the converted application in the old term list
    term_index: usize,
    counting: CountingTerm,
    new_terms: Vec<Term>,
    /// Position of the counting term in the new term list
    counting_index: usize,
    /// Old term position to new term position
    old_to_new: Vec<usize>,
    log_cost: f64,
}

impl CountConversion {
    pub fn candidates(parfactors: &[Parfactor], vocab: &Vocabulary) -> Vec<Self> {
        let mut ops = Vec::new();
        for (target, pf) in parfactors.iter().enumerate() {
            for &x in pf.logical_vars() {
                let mut users = pf
                    .terms()
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.free_vars().contains(&x));
                let (Some((term_index, Term::FuncApp(fa))), None) = (users.next(), users.next()) else {
                    continue;
                };
                ops.push(Self::new(target, pf, x, term_index, fa, vocab));
            }
        }
        ops
    }

    fn new(target: usize, pf: &Parfactor, x: LogicalVar, term_index: usize, fa: &FuncApp, vocab: &Vocabulary) -> Self {
        let fresh = vocab.fresh_like(x);
        let theta = Substitution::singleton(x, Arg::Var(fresh));
        let counting = CountingTerm::new(fresh, pf.constraint().keep_var(x).apply(&theta), fa.apply(&theta));

        let old_terms = pf.terms();
        let mut new_terms = old_terms.to_vec();
        let (counting_index, old_to_new) = match old_terms.iter().position(|t| t.as_counting() == Some(&counting)) {
            Some(existing) => {
                new_terms.remove(term_index);
                let old_to_new: Vec<usize> = (0..old_terms.len())
                    .map(|i| if i < term_index { i } else { i.saturating_sub(1) })
                    .collect();
                (old_to_new[existing], old_to_new)
            }
            None => {
                new_terms[term_index] = Term::Counting(counting.clone());
                (term_index, (0..old_terms.len()).collect())
            }
        };

        let log_cost = new_terms.iter().map(|t| ln(t.range_size(vocab))).sum();
        Self {
            target,
            var: x,
            term_index,
            counting,
            new_terms,
            counting_index,
            old_to_new,
            log_cost,
        }
    }
}

impl LiftedOperator for CountConversion {
    fn log_cost(&self) -> f64 {
        self.log_cost
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::CountConversion
    }

    fn describe(&self) -> String {
        format!("CountConversion({} into {} in parfactor {})", self.var, self.counting, self.target)
    }

    fn operate(self: Box<Self>, parfactors: &mut Vec<Parfactor>, vocab: &Vocabulary) -> Result<()> {
        let pf = parfactors.remove(self.target);
        let hists: Vec<Histogram> = self.counting.histogram_type(vocab).iter().collect();
        let shape: Vec<usize> = self.new_terms.iter().map(|t| t.range_size(vocab)).collect();

        let mut old_idx = vec![0usize; self.old_to_new.len()];
        let mut values = Vec::with_capacity(shape.iter().product());
        for new_idx in assignments(&shape) {
            for (i, slot) in old_idx.iter_mut().enumerate() {
                if i != self.term_index {
                    *slot = new_idx[self.old_to_new[i]];
                }
            }
            let hist = &hists[new_idx[self.counting_index]];
            let mut prod = 1.0;
            for (bucket, &count) in hist.counts().iter().enumerate() {
                old_idx[self.term_index] = bucket;
                prod *= pf.potential().value(&old_idx)?.powi(count as i32);
            }
            values.push(prod);
        }

        let vars: Vec<LogicalVar> = pf.logical_vars().iter().copied().filter(|v| *v != self.var).collect();
        let converted = Parfactor::new(
            vars,
            pf.constraint().drop_var(self.var),
            self.new_terms,
            Potential::from_vec(&shape, values)?,
            vocab,
        )?;
        trace!(parfactor = %converted, "count converted");
        parfactors.push(converted);
        Ok(())
    }
}
