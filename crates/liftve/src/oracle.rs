//! Choosing the next operator.

use liftve_ir::Vocabulary;

use crate::error::{FoveError, Result};
use crate::operators::{valid_ops, LiftedOperator};
use crate::parfactor::Parfactor;
use crate::query::ElimTester;

/// Strategy picking which operator the elimination loop applies next.
pub trait OperatorOracle {
    fn next_operator(
        &mut self,
        parfactors: &[Parfactor],
        query: &dyn ElimTester,
        vocab: &Vocabulary,
    ) -> Result<Box<dyn LiftedOperator>>;
}

/// Picks the valid operator with the smallest log-cost; the first one
/// listed wins ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyOracle;

impl GreedyOracle {
    pub fn choose(ops: Vec<Box<dyn LiftedOperator>>, remaining: usize) -> Result<Box<dyn LiftedOperator>> {
        let mut best: Option<Box<dyn LiftedOperator>> = None;
        for op in ops {
            if best.as_ref().map_or(true, |b| op.log_cost() < b.log_cost()) {
                best = Some(op);
            }
        }
        best.ok_or(FoveError::NoValidOperator { remaining })
    }
}

impl OperatorOracle for GreedyOracle {
    fn next_operator(
        &mut self,
        parfactors: &[Parfactor],
        query: &dyn ElimTester,
        vocab: &Vocabulary,
    ) -> Result<Box<dyn LiftedOperator>> {
        let ops = valid_ops(parfactors, query, vocab)?;
        Self::choose(ops, parfactors.len())
    }
}

impl<T: OperatorOracle + ?Sized> OperatorOracle for &mut T {
    fn next_operator(
        &mut self,
        parfactors: &[Parfactor],
        query: &dyn ElimTester,
        vocab: &Vocabulary,
    ) -> Result<Box<dyn LiftedOperator>> {
        (**self).next_operator(parfactors, query, vocab)
    }
}
