//! Brute-force evaluation over every world of the ground atoms.
//!
//! Exponential in the number of atoms; used to check lifted results on
//! small populations.

use std::collections::HashMap;

use liftve_ir::{Arg, FuncApp, Term, Vocabulary};

use crate::error::{FoveError, Result};
use crate::parfactor::Parfactor;
use crate::potential::{assignments, Potential};

impl Parfactor {
    /// Ground atoms the ground factors of this parfactor depend on, in
    /// first occurrence order.
    pub fn random_variables(&self, vocab: &Vocabulary) -> Vec<FuncApp> {
        let mut atoms = Vec::new();
        let mut push = |fa: FuncApp| {
            if !atoms.contains(&fa) {
                atoms.push(fa);
            }
        };
        for grounding in self.groundings(vocab) {
            for term in self.terms() {
                match term {
                    Term::FuncApp(fa) => push(fa.apply(&grounding)),
                    Term::Counting(ct) => {
                        for c in vocab.constants(ct.var().domain()) {
                            let mut full = grounding.clone();
                            full.bind(ct.var(), Arg::Const(c));
                            if ct.constraint().is_satisfied(&full) {
                                push(ct.sub().apply(&full));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        atoms
    }
}

/// Every ground atom mentioned by `parfactors`.
pub fn ground_atoms(vocab: &Vocabulary, parfactors: &[Parfactor]) -> Vec<FuncApp> {
    let mut atoms: Vec<FuncApp> = Vec::new();
    for pf in parfactors {
        for atom in pf.random_variables(vocab) {
            if !atoms.contains(&atom) {
                atoms.push(atom);
            }
        }
    }
    atoms
}

/// Sum over all worlds of the product of every parfactor's weight, with
/// the weight split by the value of `atoms`.
///
/// The returned table has one axis per entry of `atoms`.
pub fn ground_joint(vocab: &Vocabulary, parfactors: &[Parfactor], atoms: &[FuncApp]) -> Result<Potential> {
    let universe = ground_atoms(vocab, parfactors);
    let ranges: Vec<usize> = universe.iter().map(|a| vocab.range_size(a.func())).collect();
    let mut positions = Vec::with_capacity(atoms.len());
    for atom in atoms {
        let pos = universe.iter().position(|a| a == atom).ok_or_else(|| FoveError::UnsupportedTerm {
            term: vocab.render_func_app(atom),
            reason: "is not mentioned by any parfactor".to_string(),
        })?;
        positions.push(pos);
    }
    let shape: Vec<usize> = positions.iter().map(|p| ranges[*p]).collect();

    let mut table = Potential::filled(&shape, 0.0);
    for world in assignments(&ranges) {
        let values: HashMap<&FuncApp, usize> = universe.iter().zip(world.iter().copied()).collect();
        let lookup = |fa: &FuncApp| values.get(fa).copied().unwrap_or(0);
        let mut weight = 1.0;
        for pf in parfactors {
            weight *= pf.weight(vocab, lookup)?;
        }
        let idx: Vec<usize> = positions.iter().map(|p| world[*p]).collect();
        let total = table.value(&idx)? + weight;
        table.set(&idx, total)?;
    }
    Ok(table)
}

/// Total weight of all worlds.
pub fn ground_partition(vocab: &Vocabulary, parfactors: &[Parfactor]) -> Result<f64> {
    Ok(ground_joint(vocab, parfactors, &[])?.total())
}

/// Posterior of one atom by enumeration.
pub fn ground_marginal(vocab: &Vocabulary, parfactors: &[Parfactor], atom: &FuncApp) -> Result<Potential> {
    ground_joint(vocab, parfactors, std::slice::from_ref(atom))?.normalize()
}
