//! # liftve IR
//!
//! Symbolic layer for lifted variable elimination over parfactors.
//!
//! This crate holds everything that can be reasoned about without touching
//! a number: the vocabulary of typed domains and function symbols, terms
//! (logical variables, constants, function applications and counting
//! terms), substitutions, inequality constraints and the histogram
//! combinatorics that counting terms range over.
//!
//! ## Core Components
//!
//! ### Vocabulary ([`Vocabulary`])
//! - Domains with a finite list of guaranteed objects ([`DomainInfo`])
//! - Random and non-random function signatures ([`FunctionSignature`])
//! - Canonical constants and fresh logical variables
//!
//! ### Terms ([`Term`])
//! - [`FuncApp`]: a function applied to variables and constants
//! - [`CountingTerm`]: `#x[f(.., x, ..)]` restricted by a constraint, whose
//!   value is a [`Histogram`]; equality is alpha-equivalence
//!
//! ### Constraints ([`Constraint`])
//! - Per-variable excluded sets, normal form and contradiction checks
//! - Substitution, projection, simplification and grounding counts
//! - [`overlap`] between two constrained terms (none, partial, full)
//!
//! ### Histograms ([`HistogramType`])
//! - Ranking and unranking of histograms with a fixed total
//! - Multinomial coefficients
//!
//! ## Example
//!
//! ```rust
//! use liftve_ir::{Arg, Constraint, DomainInfo, FuncApp, Term, Vocabulary, BOOLEAN, overlap};
//!
//! let mut vocab = Vocabulary::new();
//! let person = vocab.add_domain(DomainInfo::population("Person", "p", 10)).unwrap();
//! let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();
//!
//! let x = vocab.new_var(person);
//! let alice = vocab.constant(person, "p0").unwrap();
//!
//! let lifted = Term::FuncApp(FuncApp::new(smokes, vec![Arg::Var(x)]));
//! let ground = Term::FuncApp(FuncApp::new(smokes, vec![Arg::Const(alice)]));
//!
//! // Smokes(X) covers Smokes(p0) and nine more atoms: a partial overlap.
//! let o = overlap(&lifted, &Constraint::new([x]), &ground, &Constraint::default(), &vocab).unwrap();
//! assert!(o.is_partial());
//! ```

pub mod constraint;
pub mod error;
pub mod histogram;
pub mod overlap;
pub mod substitution;
pub mod term;
pub mod vocabulary;

pub use constraint::Constraint;
pub use error::{IrError, Result};
pub use histogram::{log_factorial, multichoose, Histogram, HistogramIter, HistogramType};
pub use overlap::{make_overlap_subst, overlap, Overlap};
pub use substitution::Substitution;
pub use term::{Arg, Constant, CountingTerm, FuncApp, LogicalVar, Term};
pub use vocabulary::{
    DomainId, DomainInfo, DomainKind, FuncId, FunctionKind, FunctionSignature, Vocabulary, BOOLEAN,
};
