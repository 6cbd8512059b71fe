use super::*;
use approx::assert_relative_eq;
use liftve_ir::{DomainId, DomainInfo, BOOLEAN};

use crate::error::FoveError;

struct Fixture {
    vocab: Vocabulary,
    person: DomainId,
    smokes: FuncId,
    friends: FuncId,
}

fn fixture(n: usize) -> Fixture {
    let mut vocab = Vocabulary::new();
    let person = vocab.add_domain(DomainInfo::population("Person", "p", n)).unwrap();
    let smokes = vocab.add_random_function("Smokes", vec![person], BOOLEAN).unwrap();
    let friends = vocab
        .add_random_function("Friends", vec![person, person], BOOLEAN)
        .unwrap();
    Fixture {
        vocab,
        person,
        smokes,
        friends,
    }
}

impl Fixture {
    fn var(&self) -> LogicalVar {
        self.vocab.new_var(self.person)
    }

    fn obj(&self, name: &str) -> Arg {
        Arg::Const(self.vocab.constant(self.person, name).unwrap())
    }

    fn smokes(&self, a: Arg) -> Term {
        Term::FuncApp(FuncApp::new(self.smokes, vec![a]))
    }

    fn friends(&self, a: Arg, b: Arg) -> Term {
        Term::FuncApp(FuncApp::new(self.friends, vec![a, b]))
    }
}

/// A family of deterministic worlds over Boolean atoms.
fn world(seed: usize) -> impl Fn(&FuncApp) -> usize {
    move |fa: &FuncApp| {
        let mut h = seed.wrapping_mul(2654435761) ^ (fa.func().0 as usize * 97);
        for a in fa.args() {
            h = h.wrapping_mul(31).wrapping_add(a.as_const().map_or(0, |c| c.index() + 1));
        }
        (h >> 3) % 2
    }
}

fn total_weight(pfs: &[Parfactor], vocab: &Vocabulary, seed: usize) -> f64 {
    pfs.iter().map(|pf| pf.weight(vocab, world(seed)).unwrap()).product()
}

fn assert_same_weights(before: &[Parfactor], after: &[Parfactor], vocab: &Vocabulary) {
    for seed in 0..8 {
        assert_relative_eq!(
            total_weight(before, vocab, seed),
            total_weight(after, vocab, seed),
            max_relative = 1e-9
        );
    }
}

#[test]
fn test_new_checks_shape() {
    let f = fixture(3);
    let x = f.var();
    let bad = Parfactor::unconstrained(vec![x], vec![f.smokes(Arg::Var(x))], Potential::filled(&[3], 1.0), &f.vocab);
    assert!(matches!(bad, Err(FoveError::DimensionMismatch { .. })));

    let var_dim = Parfactor::unconstrained(vec![x], vec![Term::Var(x)], Potential::filled(&[3], 1.0), &f.vocab);
    assert!(matches!(var_dim, Err(FoveError::UnsupportedTerm { .. })));
}

#[test]
fn test_new_rejects_non_normal_counting_constraint() {
    let f = fixture(4);
    let x = f.var();
    let y = f.var();
    // y != {x, p0} but x is allowed to be p0
    let ct = CountingTerm::unconstrained(y, FuncApp::new(f.smokes, vec![Arg::Var(y)]))
        .add_constraint(Arg::Var(x))
        .add_constraint(f.obj("p0"));
    let result = Parfactor::unconstrained(
        vec![x],
        vec![f.smokes(Arg::Var(x)), Term::Counting(ct)],
        Potential::filled(&[2, 3], 1.0),
        &f.vocab,
    );
    assert!(matches!(
        result,
        Err(FoveError::Ir(IrError::CountingConstraintNotNormal { .. }))
    ));
}

#[test]
fn test_renamed_copy_is_alpha_variant() {
    let f = fixture(3);
    let x = f.var();
    let pf = Parfactor::new(
        vec![x],
        Constraint::new([x]).add_constraint(x, f.obj("p1")),
        vec![f.smokes(Arg::Var(x))],
        Potential::from_vec(&[2], vec![0.2, 0.9]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let copy = pf.renamed_copy(&f.vocab).unwrap();
    assert_ne!(copy.logical_vars(), pf.logical_vars());
    assert_eq!(copy.num_groundings(&f.vocab), 2);
    assert_same_weights(&[pf], &[copy], &f.vocab);
}

#[test]
fn test_split_on_constant() {
    let f = fixture(4);
    let x = f.var();
    let pf = Parfactor::unconstrained(
        vec![x],
        vec![f.smokes(Arg::Var(x))],
        Potential::from_vec(&[2], vec![0.4, 1.7]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let mut residuals = Vec::new();
    let main = pf.split_on(x, f.obj("p2"), &mut residuals, &f.vocab).unwrap();
    assert!(main.logical_vars().is_empty());
    assert_eq!(main.term(0), &f.smokes(f.obj("p2")));
    assert_eq!(residuals.len(), 1);
    assert_eq!(residuals[0].num_groundings(&f.vocab), 3);

    let mut after = residuals;
    after.push(main);
    assert_same_weights(&[pf], &after, &f.vocab);
}

#[test]
fn test_split_on_fresh_variable_renames() {
    let f = fixture(3);
    let x = f.var();
    let z = f.var();
    let pf = Parfactor::unconstrained(vec![x], vec![f.smokes(Arg::Var(x))], Potential::filled(&[2], 1.0), &f.vocab)
        .unwrap();
    let mut residuals = Vec::new();
    let renamed = pf.split_on(x, Arg::Var(z), &mut residuals, &f.vocab).unwrap();
    assert!(residuals.is_empty());
    assert_eq!(renamed.logical_vars(), &[z]);
}

#[test]
fn test_split_on_constraint_partitions_groundings() {
    let f = fixture(5);
    let x = f.var();
    let pf = Parfactor::new(
        vec![x],
        Constraint::new([x]).add_constraint(x, f.obj("p0")),
        vec![f.smokes(Arg::Var(x))],
        Potential::from_vec(&[2], vec![0.5, 2.5]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let other: BTreeSet<Arg> = [f.obj("p1"), f.obj("p2")].into_iter().collect();
    let mut residuals = Vec::new();
    let inside = pf.split_on_constraint(x, &other, &mut residuals, &f.vocab).unwrap();
    assert_eq!(inside.num_groundings(&f.vocab), 2);
    let counts: usize = residuals.iter().map(|p| p.num_groundings(&f.vocab)).sum();
    assert_eq!(counts, 2);

    let mut after = residuals;
    after.push(inside);
    assert_same_weights(&[pf], &after, &f.vocab);
}

#[test]
fn test_split_on_constraint_with_no_overlap_fails() {
    let f = fixture(2);
    let x = f.var();
    let pf = Parfactor::new(
        vec![x],
        Constraint::new([x]).add_constraint(x, f.obj("p0")),
        vec![f.smokes(Arg::Var(x))],
        Potential::filled(&[2], 1.0),
        &f.vocab,
    )
    .unwrap();
    let other: BTreeSet<Arg> = [f.obj("p1")].into_iter().collect();
    let err = pf.split_on_constraint(x, &other, &mut Vec::new(), &f.vocab);
    assert!(matches!(err, Err(FoveError::Ir(IrError::EmptyOverlap { .. }))));
}

#[test]
fn test_shatter_against_lifted_and_ground() {
    let f = fixture(4);
    let x = f.var();
    let lifted = Parfactor::unconstrained(
        vec![x],
        vec![f.smokes(Arg::Var(x))],
        Potential::from_vec(&[2], vec![0.3, 1.1]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let ground = Parfactor::unconstrained(
        vec![],
        vec![f.smokes(f.obj("p1"))],
        Potential::from_vec(&[2], vec![2.0, 0.5]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let (mut mine, mut theirs) = (Vec::new(), Vec::new());
    assert!(lifted.shatter(&ground, 0, 0, &mut mine, &mut theirs, &f.vocab).unwrap());
    assert_eq!(mine.len(), 2);
    assert_eq!(theirs.len(), 1);

    let mut after = mine;
    after.extend(theirs);
    assert_same_weights(&[lifted.clone(), ground.clone()], &after, &f.vocab);

    // full overlaps are left alone
    let copy = lifted.renamed_copy(&f.vocab).unwrap();
    assert!(!lifted
        .shatter(&copy, 0, 0, &mut Vec::new(), &mut Vec::new(), &f.vocab)
        .unwrap());
}

#[test]
fn test_shatter_against_ground_query() {
    let f = fixture(3);
    let x = f.var();
    let pf = Parfactor::unconstrained(vec![x], vec![f.smokes(Arg::Var(x))], Potential::filled(&[2], 1.5), &f.vocab)
        .unwrap();
    let query = FuncApp::new(f.smokes, vec![f.obj("p0")]);
    let mut residuals = Vec::new();
    assert!(pf.shatter_against_ground(0, &query, &mut residuals, &f.vocab).unwrap());
    assert!(residuals
        .iter()
        .any(|p| p.terms() == [Term::FuncApp(query.clone())].as_slice()));
    assert_same_weights(&[pf], &residuals, &f.vocab);
}

#[test]
fn test_shatter_within_splits_ground_sibling() {
    let f = fixture(3);
    let x = f.var();
    let pf = Parfactor::unconstrained(
        vec![x],
        vec![f.smokes(Arg::Var(x)), f.smokes(f.obj("p0"))],
        Potential::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let mut residuals = Vec::new();
    assert!(pf.shatter_within(0, 1, &mut residuals, &f.vocab).unwrap());
    assert_same_weights(&[pf], &residuals, &f.vocab);
}

#[test]
fn test_shatter_within_splits_either_term_order() {
    let f = fixture(3);
    for ground_first in [false, true] {
        let x = f.var();
        let mut terms = vec![f.smokes(Arg::Var(x)), f.smokes(f.obj("p0"))];
        if ground_first {
            terms.reverse();
        }
        let pf = Parfactor::unconstrained(
            vec![x],
            terms,
            Potential::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
            &f.vocab,
        )
        .unwrap();
        let mut residuals = Vec::new();
        assert!(pf.shatter_within(0, 1, &mut residuals, &f.vocab).unwrap());
        assert_eq!(residuals.len(), 2);
        assert_same_weights(&[pf], &residuals, &f.vocab);

        // x = p0 and x != p0 leave nothing to split
        for piece in &residuals {
            let mut scratch = Vec::new();
            assert!(!piece.shatter_within(0, 1, &mut scratch, &f.vocab).unwrap());
            assert!(scratch.is_empty());
        }
    }
}

#[test]
fn test_shatter_within_leaves_full_overlap_alone() {
    let f = fixture(4);
    let x = f.var();
    let y = f.var();
    let pf = Parfactor::new(
        vec![x, y],
        Constraint::new([x, y]).add_constraint(x, Arg::Var(y)),
        vec![f.smokes(Arg::Var(x)), f.smokes(Arg::Var(y))],
        Potential::filled(&[2, 2], 1.0),
        &f.vocab,
    )
    .unwrap();
    let mut residuals = Vec::new();
    assert!(!pf.shatter_within(0, 1, &mut residuals, &f.vocab).unwrap());
    assert!(!pf.shatter_within(1, 0, &mut residuals, &f.vocab).unwrap());
    assert!(residuals.is_empty());
}

#[test]
fn test_shatter_against_ground_reports_nothing_for_ground_term() {
    let f = fixture(3);
    let pf = Parfactor::unconstrained(vec![], vec![f.smokes(f.obj("p1"))], Potential::filled(&[2], 1.0), &f.vocab)
        .unwrap();
    let mut residuals = Vec::new();
    let same = FuncApp::new(f.smokes, vec![f.obj("p1")]);
    let other = FuncApp::new(f.smokes, vec![f.obj("p2")]);
    assert!(!pf.shatter_against_ground(0, &same, &mut residuals, &f.vocab).unwrap());
    assert!(!pf.shatter_against_ground(0, &other, &mut residuals, &f.vocab).unwrap());
    assert!(residuals.is_empty());
}

#[test]
fn test_expand_count_on_constant() {
    let f = fixture(4);
    let y = f.var();
    let ct = CountingTerm::unconstrained(y, FuncApp::new(f.smokes, vec![Arg::Var(y)]));
    let pf = Parfactor::unconstrained(
        vec![],
        vec![Term::Counting(ct)],
        Potential::from_vec(&[5], vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let expanded = pf.expand_count(y, f.obj("p3"), 0, &mut Vec::new(), &f.vocab).unwrap();
    assert_eq!(expanded.num_terms(), 2);
    assert_eq!(expanded.potential().shape(), &[4, 2]);
    assert_eq!(expanded.term(1), &f.smokes(f.obj("p3")));
    assert_same_weights(&[pf], &[expanded], &f.vocab);
}

#[test]
fn test_expand_count_into_all_constants() {
    let f = fixture(2);
    let y = f.var();
    let ct = CountingTerm::unconstrained(y, FuncApp::new(f.smokes, vec![Arg::Var(y)]));
    let pf = Parfactor::unconstrained(
        vec![],
        vec![Term::Counting(ct)],
        Potential::from_vec(&[3], vec![0.5, 1.0, 4.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let fas = vec![
        FuncApp::new(f.smokes, vec![f.obj("p0")]),
        FuncApp::new(f.smokes, vec![f.obj("p1")]),
    ];
    let expanded = pf.expand_count_into(0, vec![], fas, &f.vocab).unwrap();
    // [2,0] -> 0.5, [1,1] -> 1.0, [0,2] -> 4.0
    assert_eq!(expanded.potential().to_vec(), vec![0.5, 1.0, 1.0, 4.0]);
}

#[test]
fn test_sum_out_counting_term_uses_multinomials() {
    let f = fixture(2);
    let y = f.var();
    let ct = CountingTerm::unconstrained(y, FuncApp::new(f.smokes, vec![Arg::Var(y)]));
    let pf = Parfactor::unconstrained(vec![], vec![Term::Counting(ct)], Potential::filled(&[3], 1.0), &f.vocab)
        .unwrap();
    let summed = pf.sum_out(0, &f.vocab).unwrap();
    assert_relative_eq!(summed.potential().as_scalar().unwrap(), 4.0);
}

#[test]
fn test_exponentiate_unused_var() {
    let f = fixture(4);
    let x = f.var();
    let pf = Parfactor::new(
        vec![x],
        Constraint::new([x]).add_constraint(x, f.obj("p0")),
        vec![f.smokes(f.obj("p0"))],
        Potential::from_vec(&[2], vec![2.0, 0.5]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    assert_eq!(pf.unused_vars(), vec![x]);
    let exp = pf.exponentiate(x, &f.vocab).unwrap();
    assert!(exp.logical_vars().is_empty());
    assert_eq!(exp.potential().to_vec(), vec![8.0, 0.125]);
    assert_same_weights(&[pf], &[exp], &f.vocab);
}

#[test]
fn test_multiply_all_aligns_terms() {
    let f = fixture(3);
    let x = f.var();
    let a = Parfactor::unconstrained(
        vec![x],
        vec![f.smokes(Arg::Var(x))],
        Potential::from_vec(&[2], vec![0.5, 2.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let b = Parfactor::unconstrained(
        vec![x],
        vec![f.friends(Arg::Var(x), Arg::Var(x)), f.smokes(Arg::Var(x))],
        Potential::from_vec(&[2, 2], vec![1.0, 3.0, 5.0, 7.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let product = Parfactor::multiply_all(&[a.clone(), b.clone()], &f.vocab).unwrap();
    assert_eq!(product.terms(), &[f.smokes(Arg::Var(x)), f.friends(Arg::Var(x), Arg::Var(x))]);
    assert_eq!(product.potential().to_vec(), vec![0.5, 2.5, 6.0, 14.0]);
    assert_same_weights(&[a, b], &[product], &f.vocab);
}

#[test]
fn test_make_constraints_normal_form() {
    let f = fixture(4);
    let x = f.var();
    let y = f.var();
    let constraint = Constraint::new([x, y])
        .add_constraint(x, Arg::Var(y))
        .add_constraint(x, f.obj("p0"));
    assert!(!constraint.is_normal_form());
    let pf = Parfactor::new(
        vec![x, y],
        constraint,
        vec![f.friends(Arg::Var(x), Arg::Var(y))],
        Potential::from_vec(&[2], vec![1.5, 0.25]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let pieces = pf.make_constraints_normal_form(&f.vocab).unwrap();
    assert!(pieces.len() >= 2);
    assert!(pieces.iter().all(|p| p.constraint().is_normal_form()));
    assert_same_weights(&[pf], &pieces, &f.vocab);
}

#[test]
fn test_get_merged_recovers_split() {
    let f = fixture(3);
    let x = f.var();
    let pot = Potential::from_vec(&[2], vec![0.3, 0.7]).unwrap();
    let ground = Parfactor::unconstrained(vec![], vec![f.smokes(f.obj("p0"))], pot.clone(), &f.vocab).unwrap();
    let rest = Parfactor::new(
        vec![x],
        Constraint::new([x]).add_constraint(x, f.obj("p0")),
        vec![f.smokes(Arg::Var(x))],
        pot,
        &f.vocab,
    )
    .unwrap();
    let merged = ground.get_merged(&rest, 1e-9, &f.vocab).unwrap();
    assert_eq!(merged.num_groundings(&f.vocab), 3);
    assert_same_weights(&[ground.clone(), rest.clone()], &[merged], &f.vocab);

    // identical parfactors have no split variable
    assert!(rest.get_merged(&rest.renamed_copy(&f.vocab).unwrap(), 1e-9, &f.vocab).is_none());

    let other_pot = Parfactor::unconstrained(
        vec![],
        vec![f.smokes(f.obj("p0"))],
        Potential::from_vec(&[2], vec![0.4, 0.6]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    assert!(other_pot.get_merged(&rest, 1e-9, &f.vocab).is_none());
}

#[test]
fn test_collapse_duplicate_terms_takes_diagonal() {
    let f = fixture(2);
    let pf = Parfactor::unconstrained(
        vec![],
        vec![f.smokes(f.obj("p0")), f.smokes(f.obj("p0"))],
        Potential::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let collapsed = pf.collapse_duplicate_terms(&f.vocab).unwrap();
    assert_eq!(collapsed.num_terms(), 1);
    assert_eq!(collapsed.potential().to_vec(), vec![1.0, 4.0]);
    assert_same_weights(&[pf], &[collapsed], &f.vocab);
}

#[test]
fn test_delta() {
    let f = fixture(2);
    let pf = Parfactor::delta(vec![], Constraint::default(), vec![f.smokes(f.obj("p1"))], &[1], &f.vocab).unwrap();
    assert_eq!(pf.potential().to_vec(), vec![0.0, 1.0]);
    assert!(Parfactor::delta(vec![], Constraint::default(), vec![f.smokes(f.obj("p1"))], &[2], &f.vocab).is_err());
}

#[test]
fn test_ground_factors_respect_constraint() {
    let f = fixture(3);
    let x = f.var();
    let y = f.var();
    let pf = Parfactor::new(
        vec![x, y],
        Constraint::new([x, y]).add_constraint(x, Arg::Var(y)),
        vec![f.friends(Arg::Var(x), Arg::Var(y))],
        Potential::filled(&[2], 1.0),
        &f.vocab,
    )
    .unwrap();
    let factors = pf.ground_factors(&f.vocab);
    assert_eq!(factors.len(), 6);
    assert_eq!(pf.num_groundings(&f.vocab), 6);
    assert!(factors.iter().all(|g| g.terms[0].free_vars().is_empty()));
}
