//! Property-based tests for shattering and elimination.

use approx::assert_abs_diff_eq;
use liftve::{
    ground_marginal, ground_partition, shatter, Cpd, LiftedVarElim, Model, Parent, Parfactor, Potential,
    RandomFunction, ShatteredParfactorBag,
};
use liftve_ir::{Arg, Constant, Constraint, DomainInfo, FuncApp, Term, Vocabulary, BOOLEAN};
use proptest::prelude::*;

// ============================================================================
// Helper Functions
// ============================================================================

/// A prior on Smokes, a pairwise factor over distinct people and one
/// observation per entry of `observed`.
fn random_set(n: usize, p: f64, pair: [f64; 4], observed: &[(usize, bool)]) -> (Vocabulary, Vec<Parfactor>) {
    let mut vocab = Vocabulary::new();
    let person = vocab.add_domain(DomainInfo::population("Person", "p", n)).unwrap();
    let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();

    let x = vocab.new_var(person);
    let prior = Parfactor::unconstrained(
        vec![x],
        vec![Term::FuncApp(FuncApp::new(smokes, vec![Arg::Var(x)]))],
        Potential::from_vec(&[2], vec![1.0 - p, p]).unwrap(),
        &vocab,
    )
    .unwrap();

    let a = vocab.new_var(person);
    let b = vocab.new_var(person);
    let pairwise = Parfactor::new(
        vec![a, b],
        Constraint::new([a, b]).add_constraint(a, Arg::Var(b)),
        vec![
            Term::FuncApp(FuncApp::new(smokes, vec![Arg::Var(a)])),
            Term::FuncApp(FuncApp::new(smokes, vec![Arg::Var(b)])),
        ],
        Potential::from_vec(&[2, 2], pair.to_vec()).unwrap(),
        &vocab,
    )
    .unwrap();

    let mut pfs = vec![prior, pairwise];
    for (who, value) in observed {
        let atom = FuncApp::new(smokes, vec![Arg::Const(Constant::new(person, (*who % n) as u32))]);
        pfs.push(
            Parfactor::delta(
                Vec::new(),
                Default::default(),
                vec![Term::FuncApp(atom)],
                &[usize::from(*value)],
                &vocab,
            )
            .unwrap(),
        );
    }
    (vocab, pfs)
}

// ============================================================================
// Shattering Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: shattering never changes the weight of the model
    #[test]
    fn shatter_preserves_partition(
        n in 2usize..5,
        p in 0.05f64..0.95,
        pair in prop::array::uniform4(0.1f64..2.0),
        observed in prop::collection::vec((0usize..4, any::<bool>()), 0..3)
    ) {
        let (vocab, pfs) = random_set(n, p, pair, &observed);
        let shattered = shatter(&vocab, pfs.clone(), &[]).unwrap();
        let before = ground_partition(&vocab, &pfs).unwrap();
        let after = ground_partition(&vocab, &shattered).unwrap();
        prop_assert!((before - after).abs() <= 1e-9 * before.abs().max(1.0));
    }

    /// Property: shattering reaches a fixed point in normal form
    #[test]
    fn shatter_output_is_shattered(
        n in 2usize..5,
        observed in prop::collection::vec((0usize..4, any::<bool>()), 0..3),
        query in 0usize..4
    ) {
        let (vocab, pfs) = random_set(n, 0.3, [1.0, 0.5, 0.5, 2.0], &observed);
        let smokes = vocab.function_id("Smokes").unwrap();
        let person = vocab.domain_id("Person").unwrap();
        let atom = FuncApp::new(smokes, vec![Arg::Const(Constant::new(person, (query % n) as u32))]);

        let shattered = shatter(&vocab, pfs, std::slice::from_ref(&atom)).unwrap();
        prop_assert!(shattered.iter().all(|pf| pf.constraint().is_normal_form()));
        let bag = ShatteredParfactorBag::from_parfactors(&vocab, shattered.clone()).unwrap();
        prop_assert_eq!(bag.len(), shattered.len());
        prop_assert!(bag.is_shattered(std::slice::from_ref(&atom)).unwrap());
    }

    /// Property: a lifted marginal equals the enumerated one
    #[test]
    fn lifted_marginal_matches_enumeration(
        n in 2usize..4,
        p in 0.05f64..0.95,
        pair in prop::array::uniform4(0.1f64..2.0),
        observed in prop::collection::vec((0usize..3, any::<bool>()), 0..2),
        query in 0usize..3
    ) {
        let (vocab, pfs) = random_set(n, p, pair, &observed);
        let smokes = vocab.function_id("Smokes").unwrap();
        let person = vocab.domain_id("Person").unwrap();
        let atom = FuncApp::new(smokes, vec![Arg::Const(Constant::new(person, (query % n) as u32))]);
        let expected = ground_marginal(&vocab, &pfs, &atom).unwrap();

        let mut engine = LiftedVarElim::new(vocab, pfs);
        engine.set_queries(vec![Term::FuncApp(atom.clone())]).unwrap();
        let answers = engine.answer_queries().unwrap();
        let posterior = answers.posterior(&atom).unwrap();
        prop_assert!((posterior.get(&[1]).unwrap() - expected.get(&[1]).unwrap()).abs() < 1e-9);
    }
}

// ============================================================================
// Model Compilation
// ============================================================================

proptest! {
    /// Property: a compiled prior has the posterior it was given
    #[test]
    fn compiled_prior_roundtrips(p in 0.01f64..0.99, n in 1usize..6) {
        let mut vocab = Vocabulary::new();
        let person = vocab.add_domain(DomainInfo::population("Person", "p", n)).unwrap();
        let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();
        let rf = RandomFunction::new(&vocab, smokes).with_dependency(Vec::<Parent>::new(), Cpd::Bernoulli { p_true: vec![p] });
        let atom = FuncApp::new(smokes, vec![Arg::Const(Constant::new(person, 0))]);

        let mut model = Model::new(vocab);
        model.add_function(rf).unwrap();
        let mut engine = LiftedVarElim::from_model(model).unwrap();
        engine.set_queries(vec![Term::FuncApp(atom.clone())]).unwrap();
        let answers = engine.answer_queries().unwrap();
        assert_abs_diff_eq!(answers.posterior(&atom).unwrap().get(&[1]).unwrap(), p, epsilon = 1e-9);
    }
}
