use liftve_ir::{LogicalVar, Vocabulary};

use super::{LiftedOperator, OperatorKind};
use crate::error::Result;
use crate::parfactor::Parfactor;

/// Drop a logical variable no term mentions. Never grows a table.
#[derive(Debug, Clone)]
pub struct Exponentiation {
    target: usize,
    var: LogicalVar,
}

impl Exponentiation {
    pub fn candidates(parfactors: &[Parfactor]) -> Vec<Self> {
        parfactors
            .iter()
            .enumerate()
            .flat_map(|(target, pf)| pf.unused_vars().into_iter().map(move |var| Self { target, var }))
            .collect()
    }
}

impl LiftedOperator for Exponentiation {
    fn log_cost(&self) -> f64 {
        0.0
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Exponentiation
    }

    fn describe(&self) -> String {
        format!("Exponentiate({} in parfactor {})", self.var, self.target)
    }

    fn operate(self: Box<Self>, parfactors: &mut Vec<Parfactor>, vocab: &Vocabulary) -> Result<()> {
        let exponentiated = parfactors[self.target].exponentiate(self.var, vocab)?;
        parfactors[self.target] = exponentiated;
        Ok(())
    }
}
