//! The elimination loop and query answering.

use indexmap::IndexMap;
use tracing::{debug, info};

use liftve_ir::{Arg, Constant, CountingTerm, FuncApp, LogicalVar, Term, Vocabulary};

use crate::config::{EliminationStats, EngineConfig};
use crate::error::{FoveError, Result};
use crate::model::Model;
use crate::operators::has_any_to_elim;
use crate::oracle::{GreedyOracle, OperatorOracle};
use crate::parfactor::Parfactor;
use crate::potential::Potential;
use crate::query::{ElimTester, GroundQuery};
use crate::shatter::{compact, shatter};

/// Reject parfactors the engine cannot lift: variables over infinite or
/// partly unknown domains, and dimensions that are not applications of
/// random functions to variables and constants.
pub fn check_parfactors(vocab: &Vocabulary, parfactors: &[Parfactor]) -> Result<()> {
    for pf in parfactors {
        for x in pf.logical_vars() {
            check_var_domain(vocab, *x)?;
        }
        for term in pf.terms() {
            check_term(vocab, term)?;
        }
    }
    Ok(())
}

fn check_var_domain(vocab: &Vocabulary, x: LogicalVar) -> Result<()> {
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
    Ok(())
}

/// A dimension term must be a random function application, or a counting
/// term over one, whose arguments are variables or canonical constants.
pub fn check_term(vocab: &Vocabulary, term: &Term) -> Result<()> {
    let fa = match term {
        Term::FuncApp(fa) => fa,
        Term::Counting(ct) => {
            check_var_domain(vocab, ct.var())?;
            ct.sub()
        }
        other => {
            return Err(unsupported(vocab, other, "is not a function application or counting term"));
        }
    };
    let sig = vocab.function(fa.func());
    if !sig.is_random() {
        return Err(unsupported(vocab, term, &format!("applies non-random function {}", sig.name)));
    }
    if sig.arity() != fa.args().len() {
        return Err(unsupported(vocab, term, "has the wrong number of arguments"));
    }
    for (arg, domain) in fa.args().iter().zip(&sig.arg_domains) {
        if arg.domain() != *domain {
            return Err(unsupported(vocab, term, &format!("has argument {} of the wrong type", arg)));
        }
        if let Arg::Const(c) = arg {
            if c.index() >= vocab.domain_size(*domain) {
                return Err(unsupported(
                    vocab,
                    term,
                    &format!("has argument {} which is not a guaranteed object", c),
                ));
            }
        }
    }
    Ok(())
}

fn unsupported(vocab: &Vocabulary, term: &Term, reason: &str) -> FoveError {
    let term = match term {
        Term::FuncApp(fa) => vocab.render_func_app(fa),
        other => other.to_string(),
    };
    FoveError::UnsupportedTerm {
        term,
        reason: reason.to_string(),
    }
}

/// Shatter `parfactors` and apply operators chosen by `oracle` until no
/// term `query` wants eliminated remains.
///
/// `query_terms` are the ground atoms the set is split on before
/// elimination starts.
pub fn lifted_elim(
    vocab: &Vocabulary,
    parfactors: Vec<Parfactor>,
    query: &dyn ElimTester,
    query_terms: &[FuncApp],
    oracle: &mut dyn OperatorOracle,
    config: &EngineConfig,
) -> Result<(Vec<Parfactor>, EliminationStats)> {
    debug!(parfactors = parfactors.len(), queries = query_terms.len(), "starting lifted elimination");
    check_parfactors(vocab, &parfactors)?;

    let mut pfs = shatter(vocab, parfactors, query_terms)?;
    if config.compact_after_shatter {
        let compacted = compact(vocab, pfs, config.merge_tolerance);
        pfs = shatter(vocab, compacted, query_terms)?;
    }
    let mut stats = EliminationStats {
        shattered_parfactors: pfs.len(),
        ..EliminationStats::default()
    };
    info!(parfactors = pfs.len(), "shattered");
    log_parfactors(config, "after shattering", &pfs, vocab);

    while has_any_to_elim(&pfs, query) {
        if let Some(max) = config.max_steps {
            if stats.steps() >= max {
                return Err(FoveError::StepLimitExceeded { steps: stats.steps() });
            }
        }
        let op = oracle.next_operator(&pfs, query, vocab)?;
        let log_cost = op.log_cost();
        if let Some(budget) = config.max_log_cost {
            if log_cost > budget {
                return Err(FoveError::CostBudgetExceeded { log_cost, budget });
            }
        }
        debug!(op = %op.describe(), log_cost, "applying operator");
        stats.record(op.kind(), log_cost);
        op.operate(&mut pfs, vocab)?;
    }

    info!(steps = stats.steps(), remaining = pfs.len(), "elimination finished");
    log_parfactors(config, "final", &pfs, vocab);
    Ok((pfs, stats))
}

fn log_parfactors(config: &EngineConfig, stage: &str, pfs: &[Parfactor], vocab: &Vocabulary) {
    if !config.log_parfactors {
        return;
    }
    for pf in pfs {
        debug!(stage, "{}", pf.render(vocab));
    }
}

/// Posterior distributions from one `answer_queries` call.
#[derive(Debug, Clone)]
pub struct QueryAnswers {
    posteriors: IndexMap<FuncApp, Potential>,
    weight: Option<f64>,
    stats: EliminationStats,
}

impl QueryAnswers {
    /// Normalized distribution over the value indices of `query`.
    pub fn posterior(&self, query: &FuncApp) -> Option<&Potential> {
        self.posteriors.get(query)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FuncApp, &Potential)> + '_ {
        self.posteriors.iter()
    }

    /// Total weight of all worlds, only computed when there were no queries.
    pub fn weight(&self) -> Option<f64> {
        self.weight
    }

    pub fn stats(&self) -> &EliminationStats {
        &self.stats
    }
}

/// Lifted variable elimination over a fixed set of model parfactors, with
/// evidence and queries set separately.
#[derive(Debug)]
pub struct LiftedVarElim<O = GreedyOracle> {
    vocab: Vocabulary,
    parfactors: Vec<Parfactor>,
    evidence: Vec<Parfactor>,
    queries: Vec<FuncApp>,
    oracle: O,
    config: EngineConfig,
}

impl LiftedVarElim<GreedyOracle> {
    pub fn new(vocab: Vocabulary, parfactors: Vec<Parfactor>) -> Self {
        Self {
            vocab,
            parfactors,
            evidence: Vec::new(),
            queries: Vec::new(),
            oracle: GreedyOracle,
            config: EngineConfig::default(),
        }
    }

    /// Compile a model into its parfactors and wrap them in an engine.
    pub fn from_model(model: Model) -> Result<Self> {
        let parfactors = model.parfactors()?;
        Ok(Self::new(model.into_vocabulary(), parfactors))
    }
}

impl<O: OperatorOracle> LiftedVarElim<O> {
    pub fn with_oracle<P: OperatorOracle>(self, oracle: P) -> LiftedVarElim<P> {
        LiftedVarElim {
            vocab: self.vocab,
            parfactors: self.parfactors,
            evidence: self.evidence,
            queries: self.queries,
            oracle,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn parfactors(&self) -> &[Parfactor] {
        &self.parfactors
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the evidence by observations of ground atoms.
    pub fn set_evidence(&mut self, observations: &[(FuncApp, Constant)]) -> Result<()> {
        let mut evidence = Vec::with_capacity(observations.len());
        for (atom, value) in observations {
            let term = Term::FuncApp(atom.clone());
            check_term(&self.vocab, &term)?;
            if !atom.is_ground() {
                return Err(unsupported(&self.vocab, &term, "is observed but not ground"));
            }
            if value.domain() != self.vocab.function(atom.func()).range {
                return Err(unsupported(&self.vocab, &term, &format!("cannot take value {}", value)));
            }
            evidence.push(Parfactor::delta(
                Vec::new(),
                Default::default(),
                vec![term],
                &[value.index()],
                &self.vocab,
            )?);
        }
        self.evidence = evidence;
        Ok(())
    }

    /// Replace the queries. Every query must be a ground application of a
    /// random function.
    pub fn set_queries(&mut self, queries: Vec<Term>) -> Result<()> {
        let mut atoms = Vec::with_capacity(queries.len());
        for query in queries {
            let Term::FuncApp(fa) = &query else {
                return Err(FoveError::QueryNotFuncApp {
                    query: query.to_string(),
                });
            };
            check_term(&self.vocab, &query)?;
            if !fa.is_ground() {
                return Err(unsupported(&self.vocab, &query, "is queried but not ground"));
            }
            atoms.push(fa.clone());
        }
        self.queries = atoms;
        Ok(())
    }

    pub fn queries(&self) -> &[FuncApp] {
        &self.queries
    }

    fn factors_with_evidence(&self) -> Vec<Parfactor> {
        let mut factors = self.parfactors.clone();
        factors.extend(self.evidence.iter().cloned());
        factors
    }

    /// Eliminate everything but the query atoms and return the posterior of
    /// each one. With no queries, returns the total weight instead.
    pub fn answer_queries(&mut self) -> Result<QueryAnswers> {
        let query = GroundQuery::new(self.queries.iter().cloned());
        let (remaining, stats) = lifted_elim(
            &self.vocab,
            self.factors_with_evidence(),
            &query,
            &self.queries,
            &mut self.oracle,
            &self.config,
        )?;

        for pf in &remaining {
            if !pf.logical_vars().is_empty() {
                return Err(FoveError::ResidualLogicalVars {
                    parfactor: pf.render(&self.vocab),
                });
            }
            if !pf.terms().iter().all(|t| query.keeps(t)) {
                return Err(FoveError::ResidualNonQueryTerm {
                    parfactor: pf.render(&self.vocab),
                });
            }
        }

        let mut posteriors = IndexMap::new();
        for atom in &self.queries {
            let term = Term::FuncApp(atom.clone());
            let mut holding = Vec::new();
            for pf in &remaining {
                if pf.terms().contains(&term) {
                    if pf.num_terms() != 1 {
                        return Err(FoveError::QueryDependency {
                            parfactor: pf.render(&self.vocab),
                        });
                    }
                    holding.push(pf.clone());
                }
            }
            let posterior = if holding.is_empty() {
                Potential::filled(&[term.range_size(&self.vocab)], 1.0).normalize()?
            } else {
                Parfactor::multiply_all(&holding, &self.vocab)?.potential().normalize()?
            };
            debug!(query = %self.vocab.render_func_app(atom), posterior = ?posterior.to_vec(), "answered");
            posteriors.insert(atom.clone(), posterior);
        }

        let weight = if self.queries.is_empty() {
            let product = Parfactor::multiply_all(&remaining, &self.vocab)?;
            product.potential().as_scalar()
        } else {
            None
        };
        Ok(QueryAnswers {
            posteriors,
            weight,
            stats,
        })
    }

    /// Distribution over the histograms `counting` can take, indexed by
    /// histogram rank.
    ///
    /// The counting term is joined to the model through an all-ones factor
    /// and kept while everything else is eliminated. Evidence on single
    /// atoms it counts splits it during shattering, which is reported as an
    /// unsupported query.
    pub fn histogram_posterior(&mut self, counting: &CountingTerm) -> Result<Potential> {
        let term = Term::Counting(counting.clone());
        check_term(&self.vocab, &term)?;
        if !counting.free_vars().is_empty() {
            return Err(unsupported(&self.vocab, &term, "is queried but has free variables"));
        }
        let hist_type = counting.histogram_type(&self.vocab);
        let anchor = Parfactor::new(
            Vec::new(),
            Default::default(),
            vec![term.clone()],
            Potential::filled(&[hist_type.size()], 1.0),
            &self.vocab,
        )?;
        let mut factors = self.factors_with_evidence();
        factors.push(anchor);

        let query = GroundQuery::default().with_count(counting.clone());
        let (remaining, _) = lifted_elim(&self.vocab, factors, &query, &[], &mut self.oracle, &self.config)?;

        let mut holding = Vec::new();
        for pf in &remaining {
            if !pf.logical_vars().is_empty() {
                return Err(FoveError::ResidualLogicalVars {
                    parfactor: pf.render(&self.vocab),
                });
            }
            if pf.num_terms() > 0 {
                holding.push(pf.clone());
            }
        }
        if holding.is_empty() {
            return Err(unsupported(&self.vocab, &term, "was split apart during shattering"));
        }

        let product = Parfactor::multiply_all(&holding, &self.vocab)?;
        let mut weighted = product.potential().clone();
        for (rank, hist) in hist_type.iter().enumerate() {
            let w = weighted.value(&[rank])? * hist.multinomial_coefficient(hist_type.total());
            weighted.set(&[rank], w)?;
        }
        weighted.normalize()
    }
}
