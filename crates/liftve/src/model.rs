//! Compiling conditional distributions into parfactors.
//!
//! A random function `f(x1, .., xk)` with a dependency model contributes one
//! parfactor per binding of its non-liftable variables. A variable is
//! non-liftable when a parent needs its value: it is an argument of a
//! non-random function, or it is compared against another argument.
//! Those parents are resolved for each binding and their axes sliced out
//! of the conditional table, so only random atoms and counting terms stay
//! as dimensions. The child atom is always the last dimension.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use liftve_ir::{Arg, Constraint, CountingTerm, FuncApp, FuncId, LogicalVar, Substitution, Term, Vocabulary, BOOLEAN};

use crate::error::{FoveError, Result};
use crate::parfactor::Parfactor;
use crate::potential::{assignments, Potential};

/// One conditioning term of a dependency model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parent {
    /// Value of a random atom
    Atom(FuncApp),
    /// Histogram of values of a counted random atom
    Count(CountingTerm),
    /// Value of a non-random function, resolved per binding
    NonRandom(FuncApp),
    /// Boolean `x == arg`, resolved per binding (false = 0, true = 1)
    VarEquals(LogicalVar, Arg),
}

impl Parent {
    fn free_vars(&self) -> BTreeSet<LogicalVar> {
        match self {
            Parent::Atom(fa) | Parent::NonRandom(fa) => fa.free_vars(),
            Parent::Count(ct) => ct.free_vars(),
            Parent::VarEquals(x, arg) => {
                let mut vars = BTreeSet::from([*x]);
                vars.extend(arg.as_var());
                vars
            }
        }
    }

    fn range_size(&self, vocab: &Vocabulary) -> usize {
        match self {
            Parent::Atom(fa) | Parent::NonRandom(fa) => vocab.range_size(fa.func()),
            Parent::Count(ct) => ct.histogram_type(vocab).size(),
            Parent::VarEquals(..) => vocab.domain_size(BOOLEAN),
        }
    }

    /// Variables whose objects must be enumerated to resolve this parent.
    fn non_liftable_vars(&self) -> BTreeSet<LogicalVar> {
        match self {
            Parent::NonRandom(fa) => fa.free_vars(),
            Parent::VarEquals(..) => self.free_vars(),
            Parent::Atom(_) | Parent::Count(_) => BTreeSet::new(),
        }
    }
}

/// Conditional distribution of the child given its parents.
///
/// Rows are parent configurations in row-major order over the parents'
/// ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cpd {
    /// Raw weights over parent ranges then child range, row-major
    Tabular(Vec<f64>),
    /// Probability of `true` per row, for a Boolean child
    Bernoulli { p_true: Vec<f64> },
    /// A distribution over the child's values per row
    Categorical { probs: Vec<Vec<f64>> },
}

impl Cpd {
    /// The full table with the child as last axis.
    pub fn potential(&self, parent_shape: &[usize], child_range: usize) -> Result<Potential> {
        let rows: usize = parent_shape.iter().product();
        let mut shape = parent_shape.to_vec();
        shape.push(child_range);
        match self {
            Cpd::Tabular(values) => Potential::from_vec(&shape, values.clone()),
            Cpd::Bernoulli { p_true } => {
                if child_range != 2 {
                    return Err(FoveError::InvalidPotential(format!(
                        "Bernoulli table for a child with {} values",
                        child_range
                    )));
                }
                check_rows(p_true.len(), rows)?;
                let values = p_true.iter().flat_map(|p| [1.0 - p, *p]).collect();
                Potential::from_vec(&shape, values)
            }
            Cpd::Categorical { probs } => {
                check_rows(probs.len(), rows)?;
                if let Some(row) = probs.iter().find(|r| r.len() != child_range) {
                    return Err(FoveError::DimensionMismatch {
                        expected: vec![child_range],
                        got: vec![row.len()],
                    });
                }
                Potential::from_vec(&shape, probs.concat())
            }
        }
    }
}

fn check_rows(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(FoveError::DimensionMismatch {
            expected: vec![expected],
            got: vec![got],
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyModel {
    pub parents: Vec<Parent>,
    pub cpd: Cpd,
}

/// A random function of the model with its argument variables and the
/// distribution of `func(arg_vars..)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomFunction {
    pub func: FuncId,
    pub arg_vars: Vec<LogicalVar>,
    pub dependency: Option<DependencyModel>,
}

impl RandomFunction {
    /// `func` over fresh argument variables and no dependency model yet.
    pub fn new(vocab: &Vocabulary, func: FuncId) -> Self {
        let arg_vars = vocab
            .function(func)
            .arg_domains
            .iter()
            .map(|d| vocab.new_var(*d))
            .collect();
        Self {
            func,
            arg_vars,
            dependency: None,
        }
    }

    pub fn with_dependency(mut self, parents: Vec<Parent>, cpd: Cpd) -> Self {
        self.dependency = Some(DependencyModel { parents, cpd });
        self
    }

    /// The child atom `func(arg_vars..)`.
    pub fn child(&self) -> FuncApp {
        FuncApp::new(self.func, self.arg_vars.iter().copied().map(Arg::Var).collect())
    }

    pub fn arg(&self, i: usize) -> Arg {
        Arg::Var(self.arg_vars[i])
    }
}

/// Parfactors encoding the dependency model of `rf`.
pub fn create_for_cpd(vocab: &Vocabulary, rf: &RandomFunction) -> Result<Vec<Parfactor>> {
    let Some(dep) = &rf.dependency else {
        return Ok(Vec::new());
    };
    let child = rf.child();
    let name = &vocab.function(rf.func).name;

    for x in &rf.arg_vars {
        let info = vocab.domain(x.domain());
        if info.has_unknown_objects() {
            return Err(FoveError::UnknownObjects {
                domain: info.name.clone(),
            });
        }
        if !info.has_finite_guaranteed() {
            return Err(FoveError::InfiniteDomain {
                domain: info.name.clone(),
            });
        }
    }
    for parent in &dep.parents {
        if let Some(v) = parent.free_vars().into_iter().find(|v| !rf.arg_vars.contains(v)) {
            return Err(FoveError::UnsupportedTerm {
                term: vocab.render_func_app(&child),
                reason: format!("parent mentions variable {} which is not an argument", v),
            });
        }
    }

    let non_liftable: BTreeSet<LogicalVar> = dep.parents.iter().flat_map(Parent::non_liftable_vars).collect();
    let lifted: Vec<LogicalVar> = rf.arg_vars.iter().copied().filter(|v| !non_liftable.contains(v)).collect();
    let iterated: Vec<LogicalVar> = rf.arg_vars.iter().copied().filter(|v| non_liftable.contains(v)).collect();

    let parent_shape: Vec<usize> = dep.parents.iter().map(|p| p.range_size(vocab)).collect();
    let table = dep.cpd.potential(&parent_shape, vocab.range_size(rf.func))?;

    let objects: Vec<Vec<Arg>> = iterated
        .iter()
        .map(|v| vocab.constants(v.domain()).map(Arg::Const).collect())
        .collect();
    let sizes: Vec<usize> = objects.iter().map(Vec::len).collect();

    let mut pfs = Vec::new();
    for idx in assignments(&sizes) {
        let binding: Vec<Arg> = idx.iter().zip(&objects).map(|(i, objs)| objs[*i]).collect();
        let theta = Substitution::from_pairs(&iterated, &binding);

        let mut potential = table.clone();
        let mut terms = Vec::new();
        for (axis, parent) in dep.parents.iter().enumerate().rev() {
            match parent {
                Parent::Atom(fa) => terms.push(Term::FuncApp(fa.apply(&theta))),
                Parent::Count(ct) => terms.push(Term::Counting(ct.substitute(&theta, &BTreeSet::new()))),
                Parent::NonRandom(fa) => {
                    let ground = fa.apply(&theta);
                    let args = ground.ground_args().ok_or_else(|| FoveError::UnsupportedTerm {
                        term: vocab.render_func_app(&ground),
                        reason: "non-random parent is not ground after binding".to_string(),
                    })?;
                    let value = vocab.evaluate_nonrandom(fa.func(), &args)?;
                    potential = potential.index_axis(axis, value.index());
                }
                Parent::VarEquals(x, arg) => {
                    let equal = theta.replacement(*x) == theta.apply_arg(*arg);
                    potential = potential.index_axis(axis, usize::from(equal));
                }
            }
        }
        terms.reverse();
        terms.push(Term::FuncApp(child.apply(&theta)));

        let pf = Parfactor::new(
            lifted.clone(),
            Constraint::new(lifted.iter().copied()),
            terms,
            potential,
            vocab,
        )?;
        pfs.push(pf.collapse_duplicate_terms(vocab)?);
    }
    debug!(function = %name, parfactors = pfs.len(), "compiled dependency model");
    Ok(pfs)
}

/// A relational model: the vocabulary, the random functions with their
/// dependency models, and any extra hand-written parfactors.
#[derive(Debug)]
pub struct Model {
    vocabulary: Vocabulary,
    functions: Vec<RandomFunction>,
    extra: Vec<Parfactor>,
}

impl Model {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            vocabulary,
            functions: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn into_vocabulary(self) -> Vocabulary {
        self.vocabulary
    }

    pub fn functions(&self) -> &[RandomFunction] {
        &self.functions
    }

    pub fn add_function(&mut self, rf: RandomFunction) -> Result<()> {
        if !self.vocabulary.function(rf.func).is_random() {
            return Err(FoveError::UnsupportedTerm {
                term: self.vocabulary.render_func_app(&rf.child()),
                reason: "dependency model for a non-random function".to_string(),
            });
        }
        self.functions.push(rf);
        Ok(())
    }

    pub fn add_parfactor(&mut self, pf: Parfactor) {
        self.extra.push(pf);
    }

    /// The initial parfactor set: every compiled dependency model followed
    /// by the extra parfactors.
    pub fn parfactors(&self) -> Result<Vec<Parfactor>> {
        let mut pfs = Vec::new();
        for rf in &self.functions {
            pfs.extend(create_for_cpd(&self.vocabulary, rf)?);
        }
        pfs.extend(self.extra.iter().cloned());
        Ok(pfs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use liftve_ir::DomainInfo;

    #[test]
    fn test_bernoulli_puts_child_last() {
        let table = Cpd::Bernoulli { p_true: vec![0.2, 0.9] }.potential(&[2], 2).unwrap();
        assert_eq!(table.shape(), &[2, 2]);
        for (got, want) in table.to_vec().into_iter().zip([0.8, 0.2, 0.1, 0.9]) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cpd_row_checks() {
        let short = Cpd::Bernoulli { p_true: vec![0.5] }.potential(&[2], 2);
        assert!(matches!(short, Err(FoveError::DimensionMismatch { .. })));
        let wide = Cpd::Categorical {
            probs: vec![vec![0.2, 0.3, 0.5]],
        }
        .potential(&[], 2);
        assert!(matches!(wide, Err(FoveError::DimensionMismatch { .. })));
        let three_valued = Cpd::Bernoulli { p_true: vec![0.5] }.potential(&[], 3);
        assert!(matches!(three_valued, Err(FoveError::InvalidPotential(_))));
    }

    #[test]
    fn test_cpd_serde_tag() {
        let cpd: Cpd = serde_json::from_str(r#"{ "type": "bernoulli", "p_true": [0.25] }"#).unwrap();
        assert_eq!(cpd, Cpd::Bernoulli { p_true: vec![0.25] });
    }

    #[test]
    fn test_liftable_parent_gives_one_parfactor() {
        let mut vocab = Vocabulary::new();
        let person = vocab.add_domain(DomainInfo::population("Person", "p", 4)).unwrap();
        let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();
        let cancer = vocab.add_random_function("Cancer", vec![person], BOOLEAN).unwrap();
        let rf = RandomFunction::new(&vocab, cancer);
        let parents = vec![Parent::Atom(FuncApp::new(smokes, vec![rf.arg(0)]))];
        let rf = rf.with_dependency(parents, Cpd::Bernoulli { p_true: vec![0.1, 0.6] });

        let pfs = create_for_cpd(&vocab, &rf).unwrap();
        assert_eq!(pfs.len(), 1);
        assert_eq!(pfs[0].logical_vars(), rf.arg_vars.as_slice());
        assert_eq!(pfs[0].num_groundings(&vocab), 4);
        assert_eq!(pfs[0].term(1), &Term::FuncApp(rf.child()));
        assert_relative_eq!(pfs[0].potential().get(&[1, 1]).unwrap(), 0.6);
    }

    #[test]
    fn test_counting_parent() {
        let mut vocab = Vocabulary::new();
        let person = vocab.add_domain(DomainInfo::population("Person", "p", 3)).unwrap();
        let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();
        let epidemic = vocab.add_random_function("Epidemic", Vec::new(), BOOLEAN).unwrap();
        let y = vocab.new_var(person);
        let count = CountingTerm::unconstrained(y, FuncApp::new(smokes, vec![Arg::Var(y)]));
        // four histograms over three people
        let rf = RandomFunction::new(&vocab, epidemic).with_dependency(
            vec![Parent::Count(count)],
            Cpd::Bernoulli {
                p_true: vec![0.0, 0.1, 0.5, 0.9],
            },
        );
        let pfs = create_for_cpd(&vocab, &rf).unwrap();
        assert_eq!(pfs.len(), 1);
        assert!(pfs[0].logical_vars().is_empty());
        assert_eq!(pfs[0].potential().shape(), &[4, 2]);
    }

    #[test]
    fn test_parent_with_foreign_variable_is_rejected() {
        let mut vocab = Vocabulary::new();
        let person = vocab.add_domain(DomainInfo::population("Person", "p", 3)).unwrap();
        let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();
        let cancer = vocab.add_random_function("Cancer", vec![person], BOOLEAN).unwrap();
        let stranger = vocab.new_var(person);
        let rf = RandomFunction::new(&vocab, cancer).with_dependency(
            vec![Parent::Atom(FuncApp::new(smokes, vec![Arg::Var(stranger)]))],
            Cpd::Bernoulli { p_true: vec![0.1, 0.6] },
        );
        assert!(matches!(
            create_for_cpd(&vocab, &rf),
            Err(FoveError::UnsupportedTerm { .. })
        ));
    }

    #[test]
    fn test_infinite_argument_domain_is_rejected() {
        let mut vocab = Vocabulary::new();
        let number = vocab.add_domain(DomainInfo::infinite("Number")).unwrap();
        let even = vocab.add_random_function("Even", vec![number], BOOLEAN).unwrap();
        let rf = RandomFunction::new(&vocab, even).with_dependency(Vec::new(), Cpd::Bernoulli { p_true: vec![0.5] });
        assert!(matches!(
            create_for_cpd(&vocab, &rf),
            Err(FoveError::InfiniteDomain { .. })
        ));
    }

    #[test]
    fn test_model_rejects_nonrandom_function() {
        let mut vocab = Vocabulary::new();
        let person = vocab.add_domain(DomainInfo::population("Person", "p", 2)).unwrap();
        let adult = vocab
            .add_nonrandom_function("Adult", vec![person], BOOLEAN, vec![0, 1])
            .unwrap();
        let rf = RandomFunction::new(&vocab, adult);
        let mut model = Model::new(vocab);
        assert!(model.add_function(rf).is_err());
        assert!(model.parfactors().unwrap().is_empty());
    }
}
