use liftve_ir::{Arg, FuncApp, LogicalVar, Term, Vocabulary};

use super::{ln, reshatter, LiftedOperator, OperatorKind};
use crate::error::{FoveError, Result};
use crate::parfactor::Parfactor;
use crate::query::ElimTester;

/// Replace a counting dimension by one atom per allowed grounding of its
/// counted variable.
#[derive(Debug, Clone)]
pub struct CountExpansion {
    target: usize,
    index: usize,
    var: LogicalVar,
    log_cost: f64,
}

impl CountExpansion {
    /// Counting terms whose counted variable excludes only constants. When
    /// it excludes variables the set of groundings varies across the
    /// parfactor, which needs propositionalization first. Kept terms are
    /// not expanded.
    pub fn candidates(parfactors: &[Parfactor], query: &dyn ElimTester, vocab: &Vocabulary) -> Vec<Self> {
        let mut ops = Vec::new();
        for (target, pf) in parfactors.iter().enumerate() {
            for (index, term) in pf.terms().iter().enumerate() {
                let Term::Counting(ct) = term else {
                    continue;
                };
                if !query.should_eliminate(term, pf.constraint()) {
                    continue;
                }
                let x = ct.var();
                if ct.constraint().excluded(x).iter().any(Arg::is_var) {
                    continue;
                }
                let num_hists = term.range_size(vocab);
                let groundings = ct.constraint().num_allowed_constants(x, vocab);
                let sub_range = vocab.range_size(ct.sub().func());
                ops.push(Self {
                    target,
                    index,
                    var: x,
                    log_cost: ln(pf.potential().len()) - ln(num_hists) + groundings as f64 * ln(sub_range),
                });
            }
        }
        ops
    }
}

impl LiftedOperator for CountExpansion {
    fn log_cost(&self) -> f64 {
        self.log_cost
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::CountExpansion
    }

    fn describe(&self) -> String {
        format!(
            "Expansion({} in term {} of parfactor {})",
            self.var, self.index, self.target
        )
    }

    fn operate(self: Box<Self>, parfactors: &mut Vec<Parfactor>, vocab: &Vocabulary) -> Result<()> {
        let pf = parfactors.remove(self.target);
        let Term::Counting(ct) = pf.term(self.index) else {
            return Err(FoveError::UnsupportedTerm {
                term: pf.term(self.index).to_string(),
                reason: "count expansion needs a counting term".to_string(),
            });
        };
        let atoms: Vec<FuncApp> = ct
            .constraint()
            .allowed_constants(self.var, vocab)
            .into_iter()
            .map(|c| ct.replace_count_var(Arg::Const(c)))
            .collect();
        let expanded = pf.expand_count_into(self.index, Vec::new(), atoms, vocab)?;
        parfactors.push(expanded);
        reshatter(parfactors, vocab)
    }
}
