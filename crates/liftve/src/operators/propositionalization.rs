use liftve_ir::{Arg, LogicalVar, Substitution, Vocabulary};
use tracing::trace;

use super::{ln, reshatter, LiftedOperator, OperatorKind};
use crate::error::Result;
use crate::parfactor::Parfactor;
use crate::query::ElimTester;

/// Replace a parfactor by one copy per allowed constant of one of its
/// logical variables.
#[derive(Debug, Clone)]
pub struct Propositionalization {
    target: usize,
    var: LogicalVar,
    log_cost: f64,
}

impl Propositionalization {
    /// One candidate per logical variable of every parfactor that still
    /// holds a term to eliminate.
    pub fn candidates(parfactors: &[Parfactor], query: &dyn ElimTester, vocab: &Vocabulary) -> Vec<Self> {
        let mut ops = Vec::new();
        for (target, pf) in parfactors.iter().enumerate() {
            if !pf.terms().iter().any(|t| query.should_eliminate(t, pf.constraint())) {
                continue;
            }
            for &var in pf.logical_vars() {
                let n = pf.constraint().num_allowed_constants(var, vocab);
                ops.push(Self {
                    target,
                    var,
                    log_cost: ln(n) + ln(pf.potential().len()),
                });
            }
        }
        ops
    }

    pub fn var(&self) -> LogicalVar {
        self.var
    }
}

impl LiftedOperator for Propositionalization {
    fn log_cost(&self) -> f64 {
        self.log_cost
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Propositionalization
    }

    fn describe(&self) -> String {
        format!("Propositionalize({} in parfactor {})", self.var, self.target)
    }

    fn operate(self: Box<Self>, parfactors: &mut Vec<Parfactor>, vocab: &Vocabulary) -> Result<()> {
        let pf = parfactors.remove(self.target);
        for c in pf.constraint().allowed_constants(self.var, vocab) {
            let theta = Substitution::singleton(self.var, Arg::Const(c));
            let grounded = pf.apply_substitution(&theta, vocab)?;
            trace!(parfactor = %grounded, "propositionalized");
            parfactors.push(grounded);
        }
        reshatter(parfactors, vocab)
    }
}
