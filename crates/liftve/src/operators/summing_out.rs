use std::collections::HashSet;

use liftve_ir::{overlap, Arg, LogicalVar, Substitution, Term, Vocabulary};
use tracing::trace;

use super::{arg_vars, ln, LiftedOperator, OperatorKind};
use crate::error::{FoveError, Result};
use crate::parfactor::Parfactor;
use crate::query::ElimTester;

/// Sum out every ground atom a term covers, across all parfactors that
/// mention those atoms.
///
/// The targets are one term per involved parfactor, all covering exactly
/// the same atoms. Their parfactors are renamed onto common variables,
/// multiplied, and the shared dimension is summed out.
#[derive(Debug, Clone)]
pub struct SummingOut {
    /// (parfactor, term) positions; the first is the candidate
    targets: Vec<(usize, usize)>,
    /// Renaming of each target's argument variables onto common ones
    renamings: Vec<Substitution>,
    term: Term,
    log_cost: f64,
}

impl SummingOut {
    /// Candidates for every eliminable term not already known to overlap
    /// an earlier candidate.
    pub fn candidates(parfactors: &[Parfactor], query: &dyn ElimTester, vocab: &Vocabulary) -> Result<Vec<Self>> {
        let mut ops = Vec::new();
        let mut overlappers: HashSet<(usize, usize)> = HashSet::new();
        for (p, pf) in parfactors.iter().enumerate() {
            for (i, term) in pf.terms().iter().enumerate() {
                if overlappers.contains(&(p, i)) || !query.should_eliminate(term, pf.constraint()) {
                    continue;
                }
                if let Some(op) = Self::for_term(parfactors, p, i, &mut overlappers, vocab)? {
                    ops.push(op);
                }
            }
        }
        Ok(ops)
    }

    fn for_term(
        parfactors: &[Parfactor],
        p: usize,
        i: usize,
        overlappers: &mut HashSet<(usize, usize)>,
        vocab: &Vocabulary,
    ) -> Result<Option<Self>> {
        let cand_pf = &parfactors[p];
        let cand = cand_pf.term(i);
        let cand_constraint = cand_pf.constraint();

        let cand_args = arg_vars(cand);
        if !cand_pf.logical_vars().iter().all(|v| cand_args.contains(v)) {
            return Ok(None);
        }

        // the same atom may occur in another grounding of this parfactor
        let apart = cand_pf.renamed_copy(vocab)?;
        for j in 0..cand_pf.num_terms() {
            if j != i && overlap(cand, cand_constraint, apart.term(j), apart.constraint(), vocab).is_some() {
                overlappers.insert((p, j));
                return Ok(None);
            }
        }

        let mut targets = vec![(p, i)];
        for (q, pf) in parfactors.iter().enumerate() {
            if q == p {
                continue;
            }
            let mut got_target = false;
            for (j, term) in pf.terms().iter().enumerate() {
                let Some(o) = overlap(cand, cand_constraint, term, pf.constraint(), vocab) else {
                    continue;
                };
                overlappers.insert((q, j));
                let covers_vars = {
                    let args = arg_vars(term);
                    pf.logical_vars().iter().all(|v| args.contains(v))
                };
                if !got_target && o.is_full() && covers_vars && term.apply(&o.theta) == cand.apply(&o.theta) {
                    got_target = true;
                    targets.push((q, j));
                } else {
                    return Ok(None);
                }
            }
        }

        let common: Vec<Arg> = cand_args.iter().map(|v| Arg::Var(vocab.fresh_like(*v))).collect();
        let mut renamings = Vec::with_capacity(targets.len());
        let mut product_terms: Vec<Term> = Vec::new();
        for &(q, j) in &targets {
            let args: Vec<LogicalVar> = arg_vars(parfactors[q].term(j));
            if args.len() != common.len() {
                return Ok(None);
            }
            let theta = Substitution::from_pairs(&args, &common);
            for t in parfactors[q].terms() {
                let renamed = t.apply(&theta);
                if !product_terms.contains(&renamed) {
                    product_terms.push(renamed);
                }
            }
            renamings.push(theta);
        }
        let log_cost = product_terms.iter().map(|t| ln(t.range_size(vocab))).sum();

        Ok(Some(Self {
            targets,
            renamings,
            term: cand.clone(),
            log_cost,
        }))
    }

    pub fn targets(&self) -> &[(usize, usize)] {
        &self.targets
    }
}

impl LiftedOperator for SummingOut {
    fn log_cost(&self) -> f64 {
        self.log_cost
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::SummingOut
    }

    fn describe(&self) -> String {
        format!("SummingOut({} from {} parfactors)", self.term, self.targets.len())
    }

    fn operate(self: Box<Self>, parfactors: &mut Vec<Parfactor>, vocab: &Vocabulary) -> Result<()> {
        let stale = || FoveError::UnsupportedTerm {
            term: self.term.to_string(),
            reason: "summing-out targets do not match the parfactor set".to_string(),
        };
        let mut renamed = Vec::with_capacity(self.targets.len());
        for (&(q, _), theta) in self.targets.iter().zip(&self.renamings) {
            let pf = parfactors.get(q).ok_or_else(stale)?;
            renamed.push(pf.apply_substitution(theta, vocab)?);
        }
        let (Some(&(_, first_index)), Some(first)) = (self.targets.first(), renamed.first()) else {
            return Err(stale());
        };
        let target = first.terms().get(first_index).ok_or_else(stale)?.clone();

        let mut doomed: Vec<usize> = self.targets.iter().map(|(q, _)| *q).collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for q in doomed {
            parfactors.remove(q);
        }

        let product = Parfactor::multiply_all(&renamed, vocab)?;
        let index = product
            .terms()
            .iter()
            .position(|t| *t == target)
            .ok_or_else(|| FoveError::UnsupportedTerm {
                term: target.to_string(),
                reason: "summed term missing from the product".to_string(),
            })?;
        let mut result = product.sum_out(index, vocab)?;
        for var in result.unused_vars() {
            result = result.exponentiate(var, vocab)?;
        }
        trace!(parfactor = %result, "summed out");
        parfactors.push(result);
        Ok(())
    }
}
