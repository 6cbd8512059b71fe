//! Inequality constraints on logical variables.
//!
//! A [`Constraint`] maps each constrained logical variable to the set of
//! arguments it must differ from. The allowed groundings of a set of
//! variables are the assignments of guaranteed objects that respect every
//! inequality.
//!
//! A constraint is in *normal form* when, whenever `x` excludes a
//! constrained variable `y`, every other term excluded by `x` is also
//! excluded by `y`. In normal form the number of allowed groundings of a
//! variable does not depend on which grounding the other variables take,
//! which is what makes lifted counting possible.
//!
//! Constraints are immutable: every operation returns a new value.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::substitution::Substitution;
use crate::term::{Arg, Constant, LogicalVar};
use crate::vocabulary::Vocabulary;

static EMPTY: BTreeSet<Arg> = BTreeSet::new();

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    excluded: BTreeMap<LogicalVar, BTreeSet<Arg>>,
}

impl Constraint {
    /// Constrain `vars` with no inequalities.
    pub fn new<I: IntoIterator<Item = LogicalVar>>(vars: I) -> Self {
        Self {
            excluded: vars.into_iter().map(|v| (v, BTreeSet::new())).collect(),
        }
    }

    pub fn from_excluded(excluded: BTreeMap<LogicalVar, BTreeSet<Arg>>) -> Self {
        Self { excluded }
    }

    /// Constrain `x` to exactly the `allowed` objects of its domain.
    pub fn allowing(x: LogicalVar, allowed: &BTreeSet<Constant>, vocab: &Vocabulary) -> Self {
        let excl = vocab
            .constants(x.domain())
            .filter(|c| !allowed.contains(c))
            .map(Arg::Const)
            .collect();
        Self::from_excluded(BTreeMap::from([(x, excl)]))
    }

    /// Constrained variables.
    pub fn logical_vars(&self) -> impl Iterator<Item = LogicalVar> + '_ {
        self.excluded.keys().copied()
    }

    pub fn num_logical_vars(&self) -> usize {
        self.excluded.len()
    }

    pub fn constrains(&self, x: LogicalVar) -> bool {
        self.excluded.contains_key(&x)
    }

    /// Terms `x` must differ from. Empty for unconstrained variables.
    pub fn excluded(&self, x: LogicalVar) -> &BTreeSet<Arg> {
        self.excluded.get(&x).unwrap_or(&EMPTY)
    }

    pub fn excluded_constants(&self, x: LogicalVar) -> BTreeSet<Constant> {
        self.excluded(x).iter().filter_map(Arg::as_const).collect()
    }

    /// Excluded terms of `x` that are constants or members of `vars`.
    pub fn excluded_in_projection(&self, x: LogicalVar, vars: &BTreeSet<LogicalVar>) -> BTreeSet<Arg> {
        self.excluded(x)
            .iter()
            .filter(|t| match t {
                Arg::Var(v) => vars.contains(v),
                Arg::Const(_) => true,
            })
            .copied()
            .collect()
    }

    pub fn has_var_inequality(&self) -> bool {
        self.excluded.values().flatten().any(Arg::is_var)
    }

    /// Constrained variables together with variables in excluded sets.
    pub fn free_vars(&self) -> BTreeSet<LogicalVar> {
        let mut vars: BTreeSet<LogicalVar> = self.excluded.keys().copied().collect();
        vars.extend(self.excluded.values().flatten().filter_map(Arg::as_var));
        vars
    }

    /// Add `x != t`; symmetric when `t` is a constrained variable.
    pub fn add_constraint(&self, x: LogicalVar, t: Arg) -> Constraint {
        let mut excluded = self.excluded.clone();
        excluded.entry(x).or_default().insert(t);
        if let Arg::Var(y) = t {
            if let Some(ys) = excluded.get_mut(&y) {
                ys.insert(Arg::Var(x));
            }
        }
        Constraint::from_excluded(excluded)
    }

    pub fn replace_excluded(&self, x: LogicalVar, new_excluded: BTreeSet<Arg>) -> Constraint {
        let mut excluded = self.excluded.clone();
        excluded.insert(x, new_excluded);
        Constraint::from_excluded(excluded)
    }

    /// Remove `x` as a key and from every excluded set.
    pub fn drop_var(&self, x: LogicalVar) -> Constraint {
        let excluded = self
            .excluded
            .iter()
            .filter(|(v, _)| **v != x)
            .map(|(v, set)| {
                let mut set = set.clone();
                set.remove(&Arg::Var(x));
                (*v, set)
            })
            .collect();
        Constraint::from_excluded(excluded)
    }

    /// Restrict to the single key `x`, keeping its excluded set whole.
    pub fn keep_var(&self, x: LogicalVar) -> Constraint {
        let excluded = self
            .excluded
            .iter()
            .filter(|(v, _)| **v == x)
            .map(|(v, set)| (*v, set.clone()))
            .collect();
        Constraint::from_excluded(excluded)
    }

    /// Conjunction of two constraints: a term is excluded if either
    /// constraint excludes it.
    pub fn intersection(c1: &Constraint, c2: &Constraint) -> Constraint {
        let mut excluded = c1.excluded.clone();
        for (x, set) in &c2.excluded {
            excluded.entry(*x).or_default().extend(set.iter().copied());
        }
        Constraint::from_excluded(excluded)
    }

    pub fn union_with(&self, other: &Constraint) -> Constraint {
        Constraint::intersection(self, other)
    }

    /// Apply θ to every variable not in `bound`.
    ///
    /// A variable renamed to an unconstrained variable hands its excluded
    /// set over. A variable merged into another constrained variable adds
    /// its inequalities to that variable. A variable bound to a constant
    /// loses its inequalities.
    pub fn substitute(&self, theta: &Substitution, bound: &BTreeSet<LogicalVar>) -> Constraint {
        let mut next = self.excluded.clone();
        for (x, set) in &self.excluded {
            if bound.contains(x) {
                continue;
            }
            match theta.replacement(*x) {
                Arg::Var(y) if y == *x => {}
                Arg::Var(y) => {
                    if self.excluded.contains_key(&y) {
                        next.remove(x);
                        if let Some(ys) = next.get_mut(&y) {
                            ys.extend(set.iter().copied());
                            ys.remove(&Arg::Var(*x));
                        }
                    } else if let Some(moved) = next.remove(x) {
                        next.entry(y).or_default().extend(moved);
                    }
                }
                Arg::Const(_) => {
                    next.remove(x);
                }
            }
        }

        let excluded = next
            .into_iter()
            .map(|(x, set)| {
                let set = set
                    .into_iter()
                    .map(|t| match t {
                        Arg::Var(v) if !bound.contains(&v) => theta.replacement(v),
                        other => other,
                    })
                    .collect();
                (x, set)
            })
            .collect();
        Constraint::from_excluded(excluded)
    }

    pub fn apply(&self, theta: &Substitution) -> Constraint {
        self.substitute(theta, &BTreeSet::new())
    }

    /// Keep only `vars` as keys and drop excluded variables outside `vars`.
    pub fn projection(&self, vars: &BTreeSet<LogicalVar>) -> Constraint {
        let excluded = vars
            .iter()
            .map(|x| (*x, self.excluded_in_projection(*x, vars)))
            .collect();
        Constraint::from_excluded(excluded)
    }

    /// Drop inequalities `x != y` that can never bind, because `x` and `y`
    /// have no allowed constant in common. Excluded sets of variables not
    /// constrained here are looked up in `free`.
    pub fn simplified(&self, free: &Constraint, vocab: &Vocabulary) -> Constraint {
        let mut next = self.excluded.clone();
        for (x, set) in &self.excluded {
            for t in set {
                let Arg::Var(y) = t else { continue };
                if !next.get(x).is_some_and(|s| s.contains(t)) {
                    continue;
                }
                let other = if self.constrains(*y) {
                    self.excluded(*y)
                } else {
                    free.excluded(*y)
                };
                if !self.allows_some_allowed_by(*x, other, vocab) {
                    if let Some(xs) = next.get_mut(x) {
                        xs.remove(t);
                    }
                    if let Some(ys) = next.get_mut(y) {
                        ys.remove(&Arg::Var(*x));
                    }
                }
            }
        }
        Constraint::from_excluded(next)
    }

    /// Whether θ respects every inequality.
    pub fn consistent(&self, theta: &Substitution) -> bool {
        self.excluded.iter().all(|(x, set)| {
            let xr = theta.replacement(*x);
            set.iter().all(|t| *t != xr && theta.apply_arg(*t) != xr)
        })
    }

    /// Number of allowed groundings of `vars`, binding them left to right.
    ///
    /// Excluded variables still to be bound do not rule out values. This is
    /// exact when the constraint is in normal form.
    pub fn num_constrained_groundings(&self, vars: &[LogicalVar], vocab: &Vocabulary) -> usize {
        let mut to_bind: BTreeSet<LogicalVar> = vars.iter().copied().collect();
        let mut groundings = 1usize;
        for x in vars {
            if !to_bind.contains(x) {
                continue;
            }
            let excl = self.excluded(*x);
            let pending = excl
                .iter()
                .filter(|t| t.as_var().is_some_and(|v| to_bind.contains(&v)))
                .count();
            let values = vocab
                .domain_size(x.domain())
                .saturating_sub(excl.len() - pending);
            groundings = groundings.saturating_mul(values);
            to_bind.remove(x);
        }
        groundings
    }

    pub fn num_allowed_constants(&self, x: LogicalVar, vocab: &Vocabulary) -> usize {
        vocab
            .domain_size(x.domain())
            .saturating_sub(self.excluded_constants(x).len())
    }

    /// Objects of `x`'s domain not excluded by a constant.
    pub fn allowed_constants(&self, x: LogicalVar, vocab: &Vocabulary) -> Vec<Constant> {
        let excl = self.excluded(x);
        vocab
            .constants(x.domain())
            .filter(|c| !excl.contains(&Arg::Const(*c)))
            .collect()
    }

    /// Whether some object is allowed both for `x` and by `other`.
    pub fn allows_some_allowed_by(&self, x: LogicalVar, other: &BTreeSet<Arg>, vocab: &Vocabulary) -> bool {
        let excl = self.excluded(x);
        vocab.constants(x.domain()).any(|c| {
            let t = Arg::Const(c);
            !excl.contains(&t) && !other.contains(&t)
        })
    }

    /// Whether every value allowed for `x` is also allowed by `other`.
    ///
    /// Only constants and variables constrained here are considered.
    pub fn allows_only_allowed_by(&self, x: LogicalVar, other: &BTreeSet<Arg>) -> bool {
        let excl = self.excluded(x);
        other.iter().all(|t| {
            let relevant = match t {
                Arg::Var(v) => self.constrains(*v),
                Arg::Const(_) => true,
            };
            !relevant || excl.contains(t)
        })
    }

    /// True when no grounding can satisfy the constraint.
    ///
    /// Only obvious contradictions are found: self-exclusion, or a variable
    /// excluding as many distinct values as its domain holds.
    pub fn has_contradiction(&self, vocab: &Vocabulary) -> bool {
        let normal = self.is_normal_form();
        self.excluded.iter().any(|(x, set)| {
            if set.contains(&Arg::Var(*x)) {
                return true;
            }
            let obvious = set
                .iter()
                .filter(|t| match t {
                    Arg::Var(v) => normal && self.constrains(*v),
                    Arg::Const(_) => true,
                })
                .count();
            obvious >= vocab.domain_size(x.domain())
        })
    }

    pub fn is_normal_form(&self) -> bool {
        self.normal_form_violation().is_none()
    }

    /// A pair `(y, t)` where some `x` excludes both `y` and `t`, `y` is
    /// constrained, and `y` does not exclude `t`.
    pub fn normal_form_violation(&self) -> Option<(LogicalVar, Arg)> {
        for set in self.excluded.values() {
            for y in set.iter().filter_map(Arg::as_var) {
                let Some(ys) = self.excluded.get(&y) else {
                    continue;
                };
                if let Some(t) = set.iter().find(|t| **t != Arg::Var(y) && !ys.contains(t)) {
                    return Some((y, *t));
                }
            }
        }
        None
    }

    /// Like [`normal_form_violation`](Self::normal_form_violation), but for
    /// a counting constraint whose excluded variables may belong to the
    /// enclosing parfactor constraint `free`.
    pub fn normal_form_error(&self, free: &Constraint) -> Option<String> {
        for (x, set) in &self.excluded {
            for y in set.iter().filter_map(Arg::as_var) {
                let ys = if self.constrains(y) {
                    self.excluded(y)
                } else {
                    free.excluded(y)
                };
                if set.iter().any(|t| *t != Arg::Var(y) && !ys.contains(t)) {
                    return Some(format!(
                        "variable {} excludes variable {}, which may take on the same value as another term in {}'s excluded set",
                        x, y, x
                    ));
                }
            }
        }
        None
    }

    /// Whether a full grounding satisfies every inequality.
    pub fn is_satisfied(&self, grounding: &Substitution) -> bool {
        self.excluded.iter().all(|(x, set)| {
            let val = grounding.replacement(*x);
            set.iter().all(|t| grounding.apply_arg(*t) != val)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalVar, &BTreeSet<Arg>)> + '_ {
        self.excluded.iter().map(|(v, s)| (*v, s))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (x, set)) in self.excluded.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}!={{", x)?;
            for (j, t) in set.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", t)?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
