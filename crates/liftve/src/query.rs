//! Deciding which dimension terms elimination must remove.

use liftve_ir::{Constraint, CountingTerm, FuncApp, Term};

/// Tells the elimination loop when it is done.
pub trait ElimTester {
    /// Whether `term`, occurring in a parfactor with `constraint`, still
    /// has to be summed out.
    fn should_eliminate(&self, term: &Term, constraint: &Constraint) -> bool;
}

/// Keeps a fixed list of query terms and eliminates everything else.
///
/// Query atoms are ground function applications. A counting term can also
/// be kept, which is how histogram queries are answered.
#[derive(Debug, Clone, Default)]
pub struct GroundQuery {
    atoms: Vec<FuncApp>,
    counts: Vec<CountingTerm>,
}

impl GroundQuery {
    pub fn new(atoms: impl IntoIterator<Item = FuncApp>) -> Self {
        Self {
            atoms: atoms.into_iter().collect(),
            counts: Vec::new(),
        }
    }

    pub fn with_count(mut self, ct: CountingTerm) -> Self {
        self.counts.push(ct);
        self
    }

    pub fn atoms(&self) -> &[FuncApp] {
        &self.atoms
    }

    pub fn counts(&self) -> &[CountingTerm] {
        &self.counts
    }

    /// Whether `term` is one of the kept terms.
    pub fn keeps(&self, term: &Term) -> bool {
        match term {
            Term::FuncApp(fa) => self.atoms.contains(fa),
            Term::Counting(ct) => self.counts.contains(ct),
            _ => false,
        }
    }
}

impl ElimTester for GroundQuery {
    fn should_eliminate(&self, term: &Term, _constraint: &Constraint) -> bool {
        !self.keeps(term)
    }
}

impl<F> ElimTester for F
where
    F: Fn(&Term, &Constraint) -> bool,
{
    fn should_eliminate(&self, term: &Term, constraint: &Constraint) -> bool {
        self(term, constraint)
    }
}
