//! Exact lifted variable elimination with counting formulas.
//!
//! Parfactors stand for whole families of ground factors, one per allowed
//! grounding of their logical variables. This crate eliminates random
//! variables a family at a time instead of one ground atom at a time.
//!
//! # Core Concepts
//!
//! - **Parfactors** ([`Parfactor`]): logical variables, an inequality
//!   constraint, dimension terms and a dense [`Potential`]
//! - **Shattering** ([`shatter`], [`ShatteredParfactorBag`]): splitting
//!   until same-symbol terms cover identical or disjoint atom sets
//! - **Operators** ([`operators`]): propositionalization, count expansion,
//!   count conversion, exponentiation and summing out
//! - **Scheduling** ([`OperatorOracle`], [`GreedyOracle`]): pick the
//!   cheapest valid operator until only query terms remain
//!
//! # Architecture
//!
//! ```text
//! Model -> create_for_cpd -> Parfactors -> shatter -> operator loop -> posteriors
//!                                            ^              |
//!                                            +--reshatter---+
//! ```
//!
//! # Example
//!
//! ```rust
//! use liftve::{Cpd, LiftedVarElim, Model, Parent, RandomFunction};
//! use liftve_ir::{CountingTerm, DomainInfo, Vocabulary, BOOLEAN};
//!
//! let mut vocab = Vocabulary::new();
//! let person = vocab.add_domain(DomainInfo::population("Person", "p", 5)).unwrap();
//! let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();
//!
//! let prior = RandomFunction::new(&vocab, smokes)
//!     .with_dependency(Vec::<Parent>::new(), Cpd::Bernoulli { p_true: vec![0.3] });
//! let count = CountingTerm::unconstrained(prior.arg_vars[0], prior.child());
//!
//! let mut model = Model::new(vocab);
//! model.add_function(prior).unwrap();
//!
//! let mut engine = LiftedVarElim::from_model(model).unwrap();
//! let posterior = engine.histogram_posterior(&count).unwrap();
//! assert_eq!(posterior.len(), 6);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ground;
pub mod model;
pub mod operators;
pub mod oracle;
pub mod parfactor;
pub mod potential;
pub mod query;
pub mod shatter;

pub use config::{EliminationStats, EngineConfig};
pub use engine::{check_parfactors, check_term, lifted_elim, LiftedVarElim, QueryAnswers};
pub use error::{FoveError, Result};
pub use ground::{ground_atoms, ground_joint, ground_marginal, ground_partition};
pub use model::{create_for_cpd, Cpd, DependencyModel, Model, Parent, RandomFunction};
pub use operators::{valid_ops, LiftedOperator, OperatorKind};
pub use oracle::{GreedyOracle, OperatorOracle};
pub use parfactor::{GroundFactor, Parfactor};
pub use potential::Potential;
pub use query::{ElimTester, GroundQuery};
pub use shatter::{compact, shatter, shatter_with_limit, ShatteredParfactorBag, DEFAULT_SHATTER_STEPS};
