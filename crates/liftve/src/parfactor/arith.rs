//! Summing out, exponentiation and products.

use liftve_ir::{Constraint, LogicalVar, Term, Vocabulary};

use super::Parfactor;
use crate::error::{FoveError, Result};
use crate::potential::Potential;

impl Parfactor {
    /// Sum the dimension at `index` out of the potential.
    ///
    /// A counting dimension is summed with each histogram weighted by the
    /// number of assignments that produce it.
    pub fn sum_out(&self, index: usize, vocab: &Vocabulary) -> Result<Parfactor> {
        let potential = match &self.terms[index] {
            Term::FuncApp(_) => self.potential.sum_out(index),
            Term::Counting(ct) => {
                let ht = ct.histogram_type(vocab);
                let weights: Vec<f64> = ht
                    .iter()
                    .map(|h| h.multinomial_coefficient(ht.total()))
                    .collect();
                self.potential.sum_out_weighted(index, &weights)?
            }
            other => {
                return Err(FoveError::UnsupportedTerm {
                    term: other.to_string(),
                    reason: "cannot sum out".to_string(),
                })
            }
        };
        let mut terms = self.terms.clone();
        terms.remove(index);
        Parfactor::new(self.vars.clone(), self.constraint.clone(), terms, potential, vocab)
    }

    /// Fold an unused variable `x` into the potential by raising it to the
    /// number of values `x` can take.
    pub fn exponentiate(&self, x: LogicalVar, vocab: &Vocabulary) -> Result<Parfactor> {
        let n = self.constraint.num_constrained_groundings(&[x], vocab);
        let vars = self.vars.iter().copied().filter(|v| *v != x).collect();
        Parfactor::new(
            vars,
            self.constraint.drop_var(x),
            self.terms.clone(),
            self.potential.pow(n),
            vocab,
        )
    }

    pub fn multiply(&self, other: &Parfactor, vocab: &Vocabulary) -> Result<Parfactor> {
        Parfactor::multiply_all(&[self.clone(), other.clone()], vocab)
    }

    /// Pointwise product of parfactors over the same logical variables and
    /// constraint. Terms line up by equality; product terms appear in order
    /// of first occurrence.
    pub fn multiply_all(inputs: &[Parfactor], vocab: &Vocabulary) -> Result<Parfactor> {
        let (vars, constraint) = match inputs.first() {
            Some(first) => (first.vars.clone(), first.constraint.clone()),
            None => (Vec::new(), Constraint::default()),
        };

        let mut terms: Vec<Term> = Vec::new();
        let mut mappings = Vec::with_capacity(inputs.len());
        for pf in inputs {
            let mapping = pf
                .terms
                .iter()
                .map(|t| match terms.iter().position(|p| p == t) {
                    Some(k) => k,
                    None => {
                        terms.push(t.clone());
                        terms.len() - 1
                    }
                })
                .collect::<Vec<usize>>();
            mappings.push(mapping);
        }

        let shape: Vec<usize> = terms.iter().map(|t| t.range_size(vocab)).collect();
        let factors: Vec<(&Potential, Vec<usize>)> = inputs
            .iter()
            .zip(mappings)
            .map(|(pf, m)| (&pf.potential, m))
            .collect();
        let potential = Potential::product(&factors, &shape)?;
        Parfactor::new(vars, constraint, terms, potential, vocab)
    }
}
