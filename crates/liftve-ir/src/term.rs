//! Terms: logical variables, constants, function applications and counting
//! terms.
//!
//! Arguments of a function application are always a bare [`LogicalVar`] or
//! a canonical [`Constant`]. A dimension of a parfactor is either a
//! [`FuncApp`] or a [`CountingTerm`].
//!
//! Counting terms compare by alpha-equivalence: `#x[f(x, y)]` with
//! `x ∉ {a}` equals `#z[f(z, y)]` with `z ∉ {a}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::constraint::Constraint;
use crate::error::{IrError, Result};
use crate::histogram::{Histogram, HistogramType};
use crate::substitution::Substitution;
use crate::vocabulary::{DomainId, FuncId, Vocabulary};

/// A typed placeholder ranging over the guaranteed objects of a domain.
///
/// Identity is the integer id; two variables with the same id are the same
/// variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalVar {
    id: u32,
    domain: DomainId,
}

impl LogicalVar {
    pub(crate) fn new(id: u32, domain: DomainId) -> Self {
        Self { id, domain }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }
}

/// Canonical term for one guaranteed object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Constant {
    domain: DomainId,
    index: u32,
}

impl Constant {
    pub fn new(domain: DomainId, index: u32) -> Self {
        Self { domain, index }
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Position of the object in its domain's canonical order.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Argument of a function application, and member of an excluded set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arg {
    Var(LogicalVar),
    Const(Constant),
}

impl Arg {
    pub fn domain(&self) -> DomainId {
        match self {
            Arg::Var(v) => v.domain(),
            Arg::Const(c) => c.domain(),
        }
    }

    pub fn as_var(&self) -> Option<LogicalVar> {
        match self {
            Arg::Var(v) => Some(*v),
            Arg::Const(_) => None,
        }
    }

    pub fn as_const(&self) -> Option<Constant> {
        match self {
            Arg::Var(_) => None,
            Arg::Const(c) => Some(*c),
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Arg::Var(_))
    }
}

impl From<LogicalVar> for Arg {
    fn from(v: LogicalVar) -> Self {
        Arg::Var(v)
    }
}

impl From<Constant> for Arg {
    fn from(c: Constant) -> Self {
        Arg::Const(c)
    }
}

/// Application of a function symbol to variables and constants.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncApp {
    func: FuncId,
    args: Vec<Arg>,
}

impl FuncApp {
    /// Build without domain checks; see [`Vocabulary::func_app`].
    pub fn new(func: FuncId, args: Vec<Arg>) -> Self {
        Self { func, args }
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Variable arguments in argument order, repeats included.
    pub fn arg_vars(&self) -> Vec<LogicalVar> {
        self.args.iter().filter_map(Arg::as_var).collect()
    }

    pub fn free_vars(&self) -> BTreeSet<LogicalVar> {
        self.args.iter().filter_map(Arg::as_var).collect()
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|a| !a.is_var())
    }

    /// Constant arguments, if the application is ground.
    pub fn ground_args(&self) -> Option<Vec<Constant>> {
        self.args.iter().map(Arg::as_const).collect()
    }

    /// Replace every unbound variable by its image under `theta`.
    pub fn substitute(&self, theta: &Substitution, bound: &BTreeSet<LogicalVar>) -> FuncApp {
        let args = self
            .args
            .iter()
            .map(|a| match a {
                Arg::Var(v) if !bound.contains(v) => theta.replacement(*v),
                other => *other,
            })
            .collect();
        FuncApp::new(self.func, args)
    }

    pub fn apply(&self, theta: &Substitution) -> FuncApp {
        self.substitute(theta, &BTreeSet::new())
    }
}

/// A histogram-valued term `#var[sub]` restricted by `constraint`.
///
/// The constraint has `var` as its only key; its excluded set may mention
/// constants and variables of the enclosing parfactor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CountingTerm {
    var: LogicalVar,
    constraint: Constraint,
    sub: FuncApp,
}

impl CountingTerm {
    pub fn new(var: LogicalVar, constraint: Constraint, sub: FuncApp) -> Self {
        Self {
            var,
            constraint,
            sub,
        }
    }

    /// `#var[sub]` with no restriction on `var`.
    pub fn unconstrained(var: LogicalVar, sub: FuncApp) -> Self {
        Self::new(var, Constraint::new([var]), sub)
    }

    /// The bound (counted) variable.
    pub fn var(&self) -> LogicalVar {
        self.var
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn sub(&self) -> &FuncApp {
        &self.sub
    }

    pub fn free_vars(&self) -> BTreeSet<LogicalVar> {
        let mut vars = self.constraint.free_vars();
        vars.extend(self.sub.free_vars());
        vars.remove(&self.var);
        vars
    }

    /// Number of bindings of the counted variable.
    pub fn num_counted(&self, vocab: &Vocabulary) -> usize {
        self.constraint.num_constrained_groundings(&[self.var], vocab)
    }

    pub fn histogram_type(&self, vocab: &Vocabulary) -> HistogramType {
        HistogramType::new(vocab.range_size(self.sub.func()), self.num_counted(vocab))
    }

    /// Add `var != t` to the counting constraint.
    pub fn add_constraint(&self, t: Arg) -> CountingTerm {
        CountingTerm::new(self.var, self.constraint.add_constraint(self.var, t), self.sub.clone())
    }

    /// Alpha-rename the counted variable.
    pub fn rename_counting_var(&self, new_var: LogicalVar) -> CountingTerm {
        let theta = Substitution::singleton(self.var, Arg::Var(new_var));
        CountingTerm::new(
            new_var,
            self.constraint.apply(&theta),
            self.replace_count_var(Arg::Var(new_var)),
        )
    }

    /// The sub-term with the counted variable replaced by `t`.
    pub fn replace_count_var(&self, t: Arg) -> FuncApp {
        self.sub.apply(&Substitution::singleton(self.var, t))
    }

    pub fn substitute(&self, theta: &Substitution, bound: &BTreeSet<LogicalVar>) -> CountingTerm {
        let mut bound = bound.clone();
        bound.insert(self.var);
        CountingTerm::new(
            self.var,
            self.constraint.substitute(theta, &bound),
            self.sub.substitute(theta, &bound),
        )
    }

    /// Histogram of sub-term values over the allowed bindings of the
    /// counted variable, under a grounding of the outer variables.
    ///
    /// `value_of` returns the value index of a ground atom in the world.
    pub fn evaluate<F>(&self, vocab: &Vocabulary, outer: &Substitution, value_of: F) -> Result<Histogram>
    where
        F: Fn(&FuncApp) -> usize,
    {
        let buckets = vocab.range_size(self.sub.func());
        let total = self.num_counted(vocab);
        let mut counts = vec![0usize; buckets];
        for c in vocab.constants(self.var.domain()) {
            let mut grounding = outer.clone();
            grounding.bind(self.var, Arg::Const(c));
            if self.constraint.is_satisfied(&grounding) {
                let value = value_of(&self.sub.apply(&grounding));
                let slot = counts.get_mut(value).ok_or(IrError::HistogramIndexOutOfRange {
                    index: value,
                    buckets,
                    total,
                })?;
                *slot += 1;
            }
        }
        Ok(Histogram::new(counts))
    }

    fn alpha_key(&self) -> Vec<Option<Arg>> {
        self.sub
            .args()
            .iter()
            .map(|a| if *a == Arg::Var(self.var) { None } else { Some(*a) })
            .collect()
    }
}

impl PartialEq for CountingTerm {
    fn eq(&self, other: &Self) -> bool {
        self.sub.func() == other.sub.func()
            && self.constraint.excluded(self.var) == other.constraint.excluded(other.var)
            && self.sub.args().len() == other.sub.args().len()
            && self
                .sub
                .args()
                .iter()
                .zip(other.sub.args())
                .all(|(a, b)| (*a == Arg::Var(self.var) && *b == Arg::Var(other.var)) || a == b)
    }
}

impl Eq for CountingTerm {}

impl Hash for CountingTerm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sub.func().hash(state);
        self.alpha_key().hash(state);
        self.constraint.excluded(self.var).hash(state);
    }
}

/// A term of the lifted language.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// A bare logical variable (never a parfactor dimension)
    Var(LogicalVar),
    /// A canonical object term (never a parfactor dimension)
    Const(Constant),
    FuncApp(FuncApp),
    Counting(CountingTerm),
}

impl Term {
    pub fn free_vars(&self) -> BTreeSet<LogicalVar> {
        match self {
            Term::Var(v) => BTreeSet::from([*v]),
            Term::Const(_) => BTreeSet::new(),
            Term::FuncApp(fa) => fa.free_vars(),
            Term::Counting(ct) => ct.free_vars(),
        }
    }

    /// The function symbol shattering indexes this term by.
    pub fn signature(&self) -> Option<FuncId> {
        match self {
            Term::Var(_) | Term::Const(_) => None,
            Term::FuncApp(fa) => Some(fa.func()),
            Term::Counting(ct) => Some(ct.sub().func()),
        }
    }

    /// Variable arguments of the (sub-)application, in order.
    pub fn arg_vars(&self) -> Vec<LogicalVar> {
        match self {
            Term::Var(v) => vec![*v],
            Term::Const(_) => Vec::new(),
            Term::FuncApp(fa) => fa.arg_vars(),
            Term::Counting(ct) => ct.sub().arg_vars(),
        }
    }

    pub fn as_func_app(&self) -> Option<&FuncApp> {
        match self {
            Term::FuncApp(fa) => Some(fa),
            _ => None,
        }
    }

    pub fn as_counting(&self) -> Option<&CountingTerm> {
        match self {
            Term::Counting(ct) => Some(ct),
            _ => None,
        }
    }

    /// Number of values this term ranges over.
    pub fn range_size(&self, vocab: &Vocabulary) -> usize {
        match self {
            Term::Var(v) => vocab.domain_size(v.domain()),
            Term::Const(_) => 1,
            Term::FuncApp(fa) => vocab.range_size(fa.func()),
            Term::Counting(ct) => ct.histogram_type(vocab).size(),
        }
    }

    pub fn substitute(&self, theta: &Substitution, bound: &BTreeSet<LogicalVar>) -> Term {
        match self {
            Term::Var(v) if !bound.contains(v) => match theta.replacement(*v) {
                Arg::Var(w) => Term::Var(w),
                Arg::Const(c) => Term::Const(c),
            },
            Term::Var(v) => Term::Var(*v),
            Term::Const(c) => Term::Const(*c),
            Term::FuncApp(fa) => Term::FuncApp(fa.substitute(theta, bound)),
            Term::Counting(ct) => Term::Counting(ct.substitute(theta, bound)),
        }
    }

    pub fn apply(&self, theta: &Substitution) -> Term {
        self.substitute(theta, &BTreeSet::new())
    }
}

impl From<FuncApp> for Term {
    fn from(fa: FuncApp) -> Self {
        Term::FuncApp(fa)
    }
}

impl From<CountingTerm> for Term {
    fn from(ct: CountingTerm) -> Self {
        Term::Counting(ct)
    }
}

impl fmt::Display for LogicalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{}", self.id)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.domain, self.index)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Var(v) => write!(f, "{}", v),
            Arg::Const(c) => write!(f, "{}", c),
        }
    }
}

impl fmt::Display for FuncApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", a)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CountingTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#({}: {})[{}]", self.var, self.constraint, self.sub)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => write!(f, "{}", v),
            Term::Const(c) => write!(f, "{}", c),
            Term::FuncApp(fa) => write!(f, "{}", fa),
            Term::Counting(ct) => write!(f, "{}", ct),
        }
    }
}
