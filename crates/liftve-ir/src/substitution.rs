//! # Substitutions
//!
//! A substitution θ = {x₁/t₁, x₂/t₂, ...} maps logical variables to
//! arguments (variables or constants). Variables without a binding map to
//! themselves.
//!
//! Unlike general first-order unification there are no nested terms here:
//! [`Substitution::make_equal`] only ever equates two arguments, so there
//! is no occur-check. The unifier is kept *idempotent*: no variable in the
//! range of θ is itself bound by θ to something else.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::term::{Arg, LogicalVar};
use crate::vocabulary::Vocabulary;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Substitution {
    bindings: BTreeMap<LogicalVar, Arg>,
}

impl Substitution {
    /// The identity substitution.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(var: LogicalVar, arg: Arg) -> Self {
        let mut theta = Self::new();
        theta.bind(var, arg);
        theta
    }

    /// Map `vars[i]` to `args[i]`. Extra entries on either side are ignored.
    pub fn from_pairs(vars: &[LogicalVar], args: &[Arg]) -> Self {
        Self {
            bindings: vars.iter().copied().zip(args.iter().copied()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn bind(&mut self, var: LogicalVar, arg: Arg) {
        self.bindings.insert(var, arg);
    }

    pub fn remove(&mut self, var: LogicalVar) {
        self.bindings.remove(&var);
    }

    pub fn get(&self, var: LogicalVar) -> Option<Arg> {
        self.bindings.get(&var).copied()
    }

    /// Image of `var`; the variable itself when unbound.
    pub fn replacement(&self, var: LogicalVar) -> Arg {
        self.get(var).unwrap_or(Arg::Var(var))
    }

    /// Image of an argument; constants map to themselves.
    pub fn apply_arg(&self, arg: Arg) -> Arg {
        match arg {
            Arg::Var(v) => self.replacement(v),
            c => c,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalVar, Arg)> + '_ {
        self.bindings.iter().map(|(v, a)| (*v, *a))
    }

    /// Variables with an explicit binding.
    pub fn vars(&self) -> impl Iterator<Item = LogicalVar> + '_ {
        self.bindings.keys().copied()
    }

    fn in_range(&self, arg: Arg) -> bool {
        self.bindings.values().any(|a| *a == arg)
    }

    fn replace_in_range(&mut self, from: LogicalVar, to: Arg) {
        for a in self.bindings.values_mut() {
            if *a == Arg::Var(from) {
                *a = to;
            }
        }
    }

    /// Extend θ so that `t1θ = t2θ`, keeping θ idempotent.
    ///
    /// Returns false when the two arguments resolve to distinct constants.
    /// Fresh variables are drawn from `vocab` when neither variable is
    /// already a representative.
    pub fn make_equal(&mut self, t1: Arg, t2: Arg, vocab: &Vocabulary) -> bool {
        if t1 == t2 {
            return true;
        }
        match (t1, t2) {
            (Arg::Var(x), _) if self.replacement(x) != t1 => {
                let rx = self.replacement(x);
                match t2 {
                    Arg::Var(_) => self.make_equal(t2, rx, vocab),
                    Arg::Const(_) => self.make_equal(rx, t2, vocab),
                }
            }
            (Arg::Var(x), Arg::Var(y)) => {
                let ry = self.replacement(y);
                if ry != t2 {
                    return self.make_equal(t1, ry, vocab);
                }
                if self.in_range(t1) {
                    self.replace_in_range(y, t1);
                    self.bind(y, t1);
                } else if self.in_range(t2) {
                    self.bind(x, t2);
                } else {
                    let fresh = Arg::Var(vocab.fresh_like(x));
                    self.bind(x, fresh);
                    self.bind(y, fresh);
                }
                true
            }
            (Arg::Var(x), Arg::Const(_)) => {
                self.replace_in_range(x, t2);
                self.bind(x, t2);
                true
            }
            (Arg::Const(_), Arg::Var(_)) => self.make_equal(t2, t1, vocab),
            (Arg::Const(_), Arg::Const(_)) => false,
        }
    }

    /// Variables mapped to `t`. With `allow_self`, an unbound variable `t`
    /// counts as mapped to itself.
    pub fn preimage(&self, t: Arg, allow_self: bool) -> BTreeSet<LogicalVar> {
        let mut pre: BTreeSet<LogicalVar> = self
            .bindings
            .iter()
            .filter(|(v, a)| **a == t && (allow_self || Arg::Var(**v) != t))
            .map(|(v, _)| *v)
            .collect();
        if let Arg::Var(v) = t {
            if allow_self && !self.bindings.contains_key(&v) {
                pre.insert(v);
            }
        }
        pre
    }

    /// Whether distinct variables in `vars` have distinct images.
    pub fn is_one_to_one_on<'a, I>(&self, vars: I) -> bool
    where
        I: IntoIterator<Item = &'a LogicalVar>,
    {
        let mut count = 0;
        let mut range = BTreeSet::new();
        for v in vars {
            count += 1;
            range.insert(self.replacement(*v));
        }
        range.len() == count
    }

    pub fn has_constant(&self) -> bool {
        self.bindings.values().any(|a| !a.is_var())
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (v, a)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}/{}", v, a)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::{DomainId, DomainInfo};

    fn setup() -> (Vocabulary, DomainId) {
        let mut vocab = Vocabulary::new();
        let d = vocab.add_domain(DomainInfo::population("Person", "p", 3)).unwrap();
        (vocab, d)
    }

    #[test]
    fn test_make_equal_two_fresh_vars() {
        let (vocab, d) = setup();
        let x = vocab.new_var(d);
        let y = vocab.new_var(d);
        let mut theta = Substitution::new();
        assert!(theta.make_equal(Arg::Var(x), Arg::Var(y), &vocab));
        assert_eq!(theta.replacement(x), theta.replacement(y));
        assert_ne!(theta.replacement(x), Arg::Var(x));
    }

    #[test]
    fn test_make_equal_var_const_updates_range() {
        let (vocab, d) = setup();
        let x = vocab.new_var(d);
        let y = vocab.new_var(d);
        let a = Arg::Const(vocab.constant(d, "p1").unwrap());
        let mut theta = Substitution::new();
        assert!(theta.make_equal(Arg::Var(x), Arg::Var(y), &vocab));
        assert!(theta.make_equal(Arg::Var(y), a, &vocab));
        assert_eq!(theta.replacement(x), a);
        assert_eq!(theta.replacement(y), a);
        assert!(theta.has_constant());
    }

    #[test]
    fn test_make_equal_distinct_constants_fails() {
        let (vocab, d) = setup();
        let x = vocab.new_var(d);
        let a = Arg::Const(vocab.constant(d, "p0").unwrap());
        let b = Arg::Const(vocab.constant(d, "p2").unwrap());
        let mut theta = Substitution::new();
        assert!(theta.make_equal(Arg::Var(x), a, &vocab));
        assert!(!theta.make_equal(Arg::Var(x), b, &vocab));
        assert!(!theta.make_equal(a, b, &vocab));
    }

    #[test]
    fn test_make_equal_chain_stays_idempotent() {
        let (vocab, d) = setup();
        let x = vocab.new_var(d);
        let y = vocab.new_var(d);
        let z = vocab.new_var(d);
        let mut theta = Substitution::new();
        assert!(theta.make_equal(Arg::Var(x), Arg::Var(y), &vocab));
        assert!(theta.make_equal(Arg::Var(z), Arg::Var(x), &vocab));
        let rep = theta.replacement(x);
        assert_eq!(theta.replacement(y), rep);
        assert_eq!(theta.replacement(z), rep);
        // images are never themselves rebound
        for (_, a) in theta.iter() {
            if let Arg::Var(v) = a {
                assert!(theta.get(v).is_none() || theta.get(v) == Some(a));
            }
        }
    }

    #[test]
    fn test_preimage_and_one_to_one() {
        let (vocab, d) = setup();
        let x = vocab.new_var(d);
        let y = vocab.new_var(d);
        let z = vocab.new_var(d);
        let theta = Substitution::from_pairs(&[x, y], &[Arg::Var(z), Arg::Var(z)]);
        assert_eq!(theta.preimage(Arg::Var(z), false), BTreeSet::from([x, y]));
        assert_eq!(theta.preimage(Arg::Var(z), true), BTreeSet::from([x, y, z]));
        assert!(!theta.is_one_to_one_on(&[x, y]));
        assert!(theta.is_one_to_one_on(&[x]));
    }
}
