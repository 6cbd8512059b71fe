//! Lifted inference operators.
//!
//! Each operator is built against a snapshot of the current parfactor set,
//! refers to parfactors by their position in it, and knows an estimate of
//! its own cost before it runs. Applying one consumes it; the positions of
//! every other candidate built from the same snapshot are then stale.

mod count_conversion;
mod count_expansion;
mod exponentiation;
mod propositionalization;
mod summing_out;

#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

use liftve_ir::{LogicalVar, Term, Vocabulary};

use crate::error::Result;
use crate::parfactor::Parfactor;
use crate::query::ElimTester;
use crate::shatter::shatter;

pub use count_conversion::CountConversion;
pub use count_expansion::CountExpansion;
pub use exponentiation::Exponentiation;
pub use propositionalization::Propositionalization;
pub use summing_out::SummingOut;

/// The five rewrite rules of lifted elimination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorKind {
    Propositionalization,
    CountExpansion,
    CountConversion,
    Exponentiation,
    SummingOut,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatorKind::Propositionalization => "propositionalization",
            OperatorKind::CountExpansion => "count-expansion",
            OperatorKind::CountConversion => "count-conversion",
            OperatorKind::Exponentiation => "exponentiation",
            OperatorKind::SummingOut => "summing-out",
        };
        f.write_str(name)
    }
}

/// One applicable rewrite of the parfactor set.
pub trait LiftedOperator: fmt::Debug {
    /// Natural log of a cost proportional to the work `operate` does.
    fn log_cost(&self) -> f64;

    fn kind(&self) -> OperatorKind;

    /// Short human-readable form for logs.
    fn describe(&self) -> String;

    /// Rewrite `parfactors`, which must be the set this operator was
    /// built from.
    fn operate(self: Box<Self>, parfactors: &mut Vec<Parfactor>, vocab: &Vocabulary) -> Result<()>;
}

/// Every operator that can be applied to `parfactors`.
pub fn valid_ops(
    parfactors: &[Parfactor],
    query: &dyn ElimTester,
    vocab: &Vocabulary,
) -> Result<Vec<Box<dyn LiftedOperator>>> {
    let mut ops: Vec<Box<dyn LiftedOperator>> = Vec::new();
    for op in Propositionalization::candidates(parfactors, query, vocab) {
        ops.push(Box::new(op));
    }
    for op in CountExpansion::candidates(parfactors, query, vocab) {
        ops.push(Box::new(op));
    }
    for op in Exponentiation::candidates(parfactors) {
        ops.push(Box::new(op));
    }
    for op in SummingOut::candidates(parfactors, query, vocab)? {
        ops.push(Box::new(op));
    }
    for op in CountConversion::candidates(parfactors, vocab) {
        ops.push(Box::new(op));
    }
    Ok(ops)
}

/// Whether any term of any parfactor still has to be eliminated.
pub fn has_any_to_elim(parfactors: &[Parfactor], query: &dyn ElimTester) -> bool {
    parfactors
        .iter()
        .any(|pf| pf.terms().iter().any(|t| query.should_eliminate(t, pf.constraint())))
}

/// Variables occurring as arguments of a term, first occurrence order.
/// For a counting term these are the arguments of its sub-application
/// other than the counted variable.
pub(crate) fn arg_vars(term: &Term) -> Vec<LogicalVar> {
    let bound = term.as_counting().map(|ct| ct.var());
    let mut vars = Vec::new();
    for v in term.arg_vars() {
        if Some(v) != bound && !vars.contains(&v) {
            vars.push(v);
        }
    }
    vars
}

/// Shatter the whole set again after an operator split or grounded part
/// of it.
fn reshatter(parfactors: &mut Vec<Parfactor>, vocab: &Vocabulary) -> Result<()> {
    let current = std::mem::take(parfactors);
    *parfactors = shatter(vocab, current, &[])?;
    Ok(())
}

fn ln(n: usize) -> f64 {
    (n as f64).ln()
}
