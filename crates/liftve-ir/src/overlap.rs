//! Overlap between two constrained terms.
//!
//! Two constrained terms overlap when some ground random variable is
//! denoted by both. The overlap is *full* when they denote exactly the same
//! set of ground random variables, and *partial* otherwise. Shattering
//! splits parfactors until no two same-signature terms overlap partially.

use crate::constraint::Constraint;
use crate::substitution::Substitution;
use crate::term::{FuncApp, Term};
use crate::vocabulary::Vocabulary;

/// Result of [`overlap`]: the most general unifier and both constraints
/// after substitution and projection onto the unified term's variables.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlap {
    pub full: bool,
    pub theta: Substitution,
    pub c1_theta: Constraint,
    pub c2_theta: Constraint,
}

impl Overlap {
    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn is_partial(&self) -> bool {
        !self.full
    }
}

/// Extend θ to unify `t1` and `t2`, descending one level into counting
/// terms and checking their constraints.
pub fn make_overlap_subst(t1: &Term, t2: &Term, theta: &mut Substitution, vocab: &Vocabulary) -> bool {
    match (t1, t2) {
        (Term::FuncApp(a), Term::FuncApp(b)) => unify_func_apps(a, b, theta, vocab),
        (Term::Counting(a), Term::Counting(b)) => {
            unify_func_apps(a.sub(), b.sub(), theta, vocab)
                && a.constraint().consistent(theta)
                && b.constraint().consistent(theta)
        }
        (Term::Counting(ct), Term::FuncApp(fa)) | (Term::FuncApp(fa), Term::Counting(ct)) => {
            unify_func_apps(ct.sub(), fa, theta, vocab) && ct.constraint().consistent(theta)
        }
        (Term::Var(x), Term::Var(y)) => theta.make_equal((*x).into(), (*y).into(), vocab),
        (Term::Var(x), Term::Const(c)) | (Term::Const(c), Term::Var(x)) => {
            theta.make_equal((*x).into(), (*c).into(), vocab)
        }
        (Term::Const(a), Term::Const(b)) => a == b,
        _ => false,
    }
}

fn unify_func_apps(a: &FuncApp, b: &FuncApp, theta: &mut Substitution, vocab: &Vocabulary) -> bool {
    if a == b {
        return true;
    }
    if a.func() != b.func() || a.args().len() != b.args().len() {
        return false;
    }
    a.args()
        .iter()
        .zip(b.args())
        .all(|(x, y)| theta.make_equal(*x, *y, vocab))
}

/// Compute the overlap of `t1` under `c1` with `t2` under `c2`.
///
/// Returns `None` when the two terms denote disjoint sets of ground random
/// variables.
pub fn overlap(t1: &Term, c1: &Constraint, t2: &Term, c2: &Constraint, vocab: &Vocabulary) -> Option<Overlap> {
    let mut theta = Substitution::new();
    if !make_overlap_subst(t1, t2, &mut theta, vocab) {
        return None;
    }

    let (a1, c1) = unwrap_counting(t1, c1);
    let (a2, c2) = unwrap_counting(t2, c2);

    if !c1.consistent(&theta) || !c2.consistent(&theta) {
        return None;
    }

    let unified_vars = a1.apply(&theta).free_vars();
    let c1_theta = c1.apply(&theta).projection(&unified_vars);
    let c2_theta = c2.apply(&theta).projection(&unified_vars);
    if Constraint::intersection(&c1_theta, &c2_theta).has_contradiction(vocab) {
        return None;
    }

    let full = !theta.has_constant()
        && theta.is_one_to_one_on(&a1.free_vars())
        && theta.is_one_to_one_on(&a2.free_vars())
        && c1_theta == c2_theta;
    Some(Overlap {
        full,
        theta,
        c1_theta,
        c2_theta,
    })
}

fn unwrap_counting(t: &Term, c: &Constraint) -> (Term, Constraint) {
    match t {
        Term::Counting(ct) => (Term::FuncApp(ct.sub().clone()), c.union_with(ct.constraint())),
        other => (other.clone(), c.clone()),
    }
}
