//! Parametric factors.
//!
//! A [`Parfactor`] stands for one ground factor per allowed grounding of its
//! logical variables. Every ground factor applies the same potential to the
//! values of the ground instances of its dimension terms.
//!
//! Transformations never mutate: each returns a new parfactor and pushes
//! any split-off pieces onto a residual list supplied by the caller.

mod arith;
mod counting;
mod merge;
mod split;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use liftve_ir::{
    Arg, Constraint, CountingTerm, FuncApp, FuncId, IrError, LogicalVar, Substitution, Term, Vocabulary,
};

use crate::error::{FoveError, Result};
use crate::potential::{assignments, Potential};

/// A constrained, quantified factor over function applications and
/// counting terms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parfactor {
    vars: Vec<LogicalVar>,
    constraint: Constraint,
    terms: Vec<Term>,
    potential: Potential,
}

/// One ground instance of a parfactor.
#[derive(Clone, Debug, PartialEq)]
pub struct GroundFactor {
    pub grounding: Substitution,
    pub terms: Vec<Term>,
}

impl Parfactor {
    /// Build a parfactor, checking that the potential has one axis per term
    /// with the term's range size, and that every counting constraint is in
    /// normal form with respect to `constraint`.
    pub fn new(
        vars: Vec<LogicalVar>,
        constraint: Constraint,
        terms: Vec<Term>,
        potential: Potential,
        vocab: &Vocabulary,
    ) -> Result<Self> {
        for term in &terms {
            match term {
                Term::FuncApp(_) => {}
                Term::Counting(ct) => {
                    if let Some(reason) = ct.constraint().normal_form_error(&constraint) {
                        return Err(IrError::CountingConstraintNotNormal {
                            term: ct.to_string(),
                            reason,
                        }
                        .into());
                    }
                }
                other => {
                    return Err(FoveError::UnsupportedTerm {
                        term: other.to_string(),
                        reason: "dimensions must be function applications or counting terms".to_string(),
                    })
                }
            }
        }
        let expected: Vec<usize> = terms.iter().map(|t| t.range_size(vocab)).collect();
        if potential.shape() != expected.as_slice() {
            return Err(FoveError::DimensionMismatch {
                expected,
                got: potential.shape().to_vec(),
            });
        }
        Ok(Self {
            vars,
            constraint,
            terms,
            potential,
        })
    }

    /// A parfactor whose variables are free of inequalities.
    pub fn unconstrained(
        vars: Vec<LogicalVar>,
        terms: Vec<Term>,
        potential: Potential,
        vocab: &Vocabulary,
    ) -> Result<Self> {
        let constraint = Constraint::new(vars.iter().copied());
        Self::new(vars, constraint, terms, potential, vocab)
    }

    /// A parfactor with no variables and no terms holding a single weight.
    pub fn constant(value: f64) -> Self {
        Self {
            vars: Vec::new(),
            constraint: Constraint::default(),
            terms: Vec::new(),
            potential: Potential::scalar(value),
        }
    }

    /// Weight one on the tuple `values` of term values, zero elsewhere.
    pub fn delta(
        vars: Vec<LogicalVar>,
        constraint: Constraint,
        terms: Vec<Term>,
        values: &[usize],
        vocab: &Vocabulary,
    ) -> Result<Self> {
        let shape: Vec<usize> = terms.iter().map(|t| t.range_size(vocab)).collect();
        if values.len() != shape.len() || values.iter().zip(&shape).any(|(v, n)| v >= n) {
            return Err(FoveError::DimensionMismatch {
                expected: shape,
                got: values.to_vec(),
            });
        }
        let mut potential = Potential::filled(&shape, 0.0);
        potential.set(values, 1.0);
        Self::new(vars, constraint, terms, potential, vocab)
    }

    pub fn logical_vars(&self) -> &[LogicalVar] {
        &self.vars
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn term(&self, index: usize) -> &Term {
        &self.terms[index]
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn potential(&self) -> &Potential {
        &self.potential
    }

    /// Function symbol the shattering index files term `index` under.
    pub fn term_signature(&self, index: usize) -> Option<FuncId> {
        self.terms[index].signature()
    }

    /// Number of allowed groundings of the logical variables.
    pub fn num_groundings(&self, vocab: &Vocabulary) -> usize {
        self.constraint.num_constrained_groundings(&self.vars, vocab)
    }

    /// Logical variables that occur in no term.
    pub fn unused_vars(&self) -> Vec<LogicalVar> {
        let used: BTreeSet<LogicalVar> = self.terms.iter().flat_map(Term::free_vars).collect();
        self.vars.iter().copied().filter(|v| !used.contains(v)).collect()
    }

    /// Apply θ to terms and constraint.
    ///
    /// A variable renamed to a variable not yet quantified takes its slot;
    /// a variable bound to a constant or merged into another quantified
    /// variable is dropped.
    pub fn apply_substitution(&self, theta: &Substitution, vocab: &Vocabulary) -> Result<Parfactor> {
        let terms = self.terms.iter().map(|t| t.apply(theta)).collect();
        let mut vars = self.vars.clone();
        for x in &self.vars {
            match theta.replacement(*x) {
                Arg::Var(y) if y == *x => {}
                Arg::Var(y) if !vars.contains(&y) => {
                    if let Some(slot) = vars.iter_mut().find(|v| **v == *x) {
                        *slot = y;
                    }
                }
                _ => vars.retain(|v| v != x),
            }
        }
        Parfactor::new(vars, self.constraint.apply(theta), terms, self.potential.clone(), vocab)
    }

    /// An alpha-variant with fresh logical variables and fresh counting
    /// variables.
    pub fn renamed_copy(&self, vocab: &Vocabulary) -> Result<Parfactor> {
        let fresh: Vec<Arg> = self.vars.iter().map(|v| Arg::Var(vocab.fresh_like(*v))).collect();
        let theta = Substitution::from_pairs(&self.vars, &fresh);
        let mut renamed = self.apply_substitution(&theta, vocab)?;
        for term in renamed.terms.iter_mut() {
            if let Term::Counting(ct) = term {
                *ct = ct.rename_counting_var(vocab.fresh_like(ct.var()));
            }
        }
        Ok(renamed)
    }

    /// A renamed copy restricted by the extra inequality `l != t`.
    pub fn copy_with_constraint(&self, l: LogicalVar, t: Arg, vocab: &Vocabulary) -> Result<Parfactor> {
        self.with_constraint(self.constraint.add_constraint(l, t), vocab)?
            .renamed_copy(vocab)
    }

    /// The same parfactor under another constraint.
    pub fn with_constraint(&self, constraint: Constraint, vocab: &Vocabulary) -> Result<Parfactor> {
        Parfactor::new(
            self.vars.clone(),
            constraint,
            self.terms.clone(),
            self.potential.clone(),
            vocab,
        )
    }

    /// Merge dimensions that are the same term, keeping the entries where
    /// their values agree.
    pub fn collapse_duplicate_terms(&self, vocab: &Vocabulary) -> Result<Parfactor> {
        let mut terms = self.terms.clone();
        let mut potential = self.potential.clone();
        'scan: loop {
            for j in 1..terms.len() {
                if let Some(i) = terms[..j].iter().position(|t| *t == terms[j]) {
                    potential = potential.diagonal(i, j)?;
                    terms.remove(j);
                    continue 'scan;
                }
            }
            break;
        }
        if terms.len() == self.terms.len() {
            return Ok(self.clone());
        }
        Parfactor::new(self.vars.clone(), self.constraint.clone(), terms, potential, vocab)
    }

    /// Every allowed grounding of the logical variables.
    pub fn groundings(&self, vocab: &Vocabulary) -> Vec<Substitution> {
        let objects: Vec<Vec<Arg>> = self
            .vars
            .iter()
            .map(|v| vocab.constants(v.domain()).map(Arg::Const).collect())
            .collect();
        let shape: Vec<usize> = objects.iter().map(Vec::len).collect();
        assignments(&shape)
            .map(|idx| {
                let args: Vec<Arg> = idx.iter().zip(&objects).map(|(i, objs)| objs[*i]).collect();
                Substitution::from_pairs(&self.vars, &args)
            })
            .filter(|grounding| self.constraint.is_satisfied(grounding))
            .collect()
    }

    /// The ground factors this parfactor stands for.
    pub fn ground_factors(&self, vocab: &Vocabulary) -> Vec<GroundFactor> {
        self.groundings(vocab)
            .into_iter()
            .map(|grounding| GroundFactor {
                terms: self.terms.iter().map(|t| t.apply(&grounding)).collect(),
                grounding,
            })
            .collect()
    }

    /// Product of the ground factor weights in one world.
    ///
    /// `world` gives the value index of each ground atom.
    pub fn weight<F>(&self, vocab: &Vocabulary, world: F) -> Result<f64>
    where
        F: Fn(&FuncApp) -> usize,
    {
        let mut weight = 1.0;
        for factor in self.ground_factors(vocab) {
            let mut idx = Vec::with_capacity(factor.terms.len());
            for (term, ground) in self.terms.iter().zip(&factor.terms) {
                let value = match (term, ground) {
                    (_, Term::FuncApp(fa)) => world(fa),
                    (Term::Counting(ct), _) => {
                        let hist = ct.evaluate(vocab, &factor.grounding, &world)?;
                        ct.histogram_type(vocab).index_of(&hist)?
                    }
                    (other, _) => {
                        return Err(FoveError::UnsupportedTerm {
                            term: other.to_string(),
                            reason: "cannot evaluate in a world".to_string(),
                        })
                    }
                };
                idx.push(value);
            }
            weight *= self.potential.value(&idx)?;
        }
        Ok(weight)
    }

    /// Multi-line rendering with object names, for logs.
    pub fn render(&self, vocab: &Vocabulary) -> String {
        let terms: Vec<String> = self.terms.iter().map(|t| render_term(t, vocab)).collect();
        let vars: Vec<String> = self.vars.iter().map(|v| v.to_string()).collect();
        format!(
            "vars: [{}]\nconstraint: {}\nterms: [{}]\npotential: {:?}",
            vars.join(", "),
            self.constraint,
            terms.join(", "),
            self.potential.to_vec()
        )
    }

    fn counting_term(&self, index: usize) -> Result<&CountingTerm> {
        self.terms[index]
            .as_counting()
            .ok_or_else(|| FoveError::UnsupportedTerm {
                term: self.terms[index].to_string(),
                reason: "expected a counting term".to_string(),
            })
    }
}

fn render_term(term: &Term, vocab: &Vocabulary) -> String {
    match term {
        Term::FuncApp(fa) => vocab.render_func_app(fa),
        Term::Counting(ct) => format!(
            "#({}: {})[{}]",
            ct.var(),
            ct.constraint(),
            vocab.render_func_app(ct.sub())
        ),
        other => other.to_string(),
    }
}

impl fmt::Display for Parfactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", t)?;
        }
        write!(f, "] : {}", self.constraint)
    }
}
