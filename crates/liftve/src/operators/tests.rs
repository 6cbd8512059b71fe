use super::*;
use approx::assert_relative_eq;
use liftve_ir::{Arg, Constraint, CountingTerm, DomainId, DomainInfo, FuncApp, FuncId, BOOLEAN};

use crate::error::FoveError;
use crate::ground::ground_partition;
use crate::potential::Potential;
use crate::query::GroundQuery;

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

    fn smokes_app(&self, a: Arg) -> FuncApp {
        FuncApp::new(self.smokes, vec![a])
    }

    fn smokes(&self, a: Arg) -> Term {
        Term::FuncApp(self.smokes_app(a))
    }

    fn prior(&self, p: f64) -> Parfactor {
        let x = self.var();
        Parfactor::unconstrained(
            vec![x],
            vec![self.smokes(Arg::Var(x))],
            Potential::from_vec(&[2], vec![1.0 - p, p]).unwrap(),
            &self.vocab,
        )
        .unwrap()
    }

    fn influence(&self) -> Parfactor {
        let x = self.var();
        let y = self.var();
        Parfactor::new(
            vec![x, y],
            Constraint::new([x, y]).add_constraint(x, Arg::Var(y)),
            vec![
                Term::FuncApp(FuncApp::new(self.friends, vec![Arg::Var(x), Arg::Var(y)])),
                self.smokes(Arg::Var(x)),
                self.smokes(Arg::Var(y)),
            ],
            Potential::from_fn(&[2, 2, 2], |idx| if idx[0] == 1 && idx[1] != idx[2] { 0.4 } else { 1.0 }),
            &self.vocab,
        )
        .unwrap()
    }
}

fn eliminate_all() -> GroundQuery {
    GroundQuery::default()
}

fn kinds(ops: &[Box<dyn LiftedOperator>]) -> Vec<OperatorKind> {
    let mut kinds: Vec<OperatorKind> = ops.iter().map(|op| op.kind()).collect();
    kinds.sort();
    kinds.dedup();
    kinds
}

fn apply_first(pfs: &mut Vec<Parfactor>, kind: OperatorKind, vocab: &Vocabulary) {
    let op = valid_ops(pfs, &eliminate_all(), vocab)
        .unwrap()
        .into_iter()
        .find(|op| op.kind() == kind)
        .unwrap();
    op.operate(pfs, vocab).unwrap();
}

#[test]
fn test_operator_kind_names() {
    assert_eq!(OperatorKind::CountExpansion.to_string(), "count-expansion");
    assert_eq!(OperatorKind::SummingOut.to_string(), "summing-out");
}

#[test]
fn test_valid_ops_for_a_prior() {
    let f = fixture(3);
    let pfs = vec![f.prior(0.3)];
    let ops = valid_ops(&pfs, &eliminate_all(), &f.vocab).unwrap();
    assert_eq!(
        kinds(&ops),
        vec![
            OperatorKind::Propositionalization,
            OperatorKind::CountConversion,
            OperatorKind::SummingOut
        ]
    );
}

#[test]
fn test_nothing_to_do_when_everything_is_kept() {
    let f = fixture(3);
    let pfs = vec![f.prior(0.3)];
    let keep_all = |_: &Term, _: &Constraint| false;
    assert!(!has_any_to_elim(&pfs, &keep_all));
    assert!(Propositionalization::candidates(&pfs, &keep_all, &f.vocab).is_empty());
    assert!(SummingOut::candidates(&pfs, &keep_all, &f.vocab).unwrap().is_empty());
}

#[test]
fn test_every_operator_preserves_partition() {
    let f = fixture(3);
    let pfs = shatter(&f.vocab, vec![f.prior(0.3), f.influence()], &[]).unwrap();
    let expected = ground_partition(&f.vocab, &pfs).unwrap();

    let ops = valid_ops(&pfs, &eliminate_all(), &f.vocab).unwrap();
    assert!(!ops.is_empty());
    for op in ops {
        let description = op.describe();
        let mut applied = pfs.clone();
        op.operate(&mut applied, &f.vocab).unwrap();
        assert_relative_eq!(
            ground_partition(&f.vocab, &applied).unwrap(),
            expected,
            max_relative = 1e-9
        );
        assert!(!description.is_empty());
    }
}

#[test]
fn test_summing_out_a_prior_leaves_its_mass() {
    let f = fixture(3);
    let mut pfs = vec![f.prior(0.3)];
    apply_first(&mut pfs, OperatorKind::SummingOut, &f.vocab);
    assert_eq!(pfs.len(), 1);
    assert!(pfs[0].terms().is_empty());
    assert_relative_eq!(pfs[0].potential().as_scalar().unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_count_conversion_builds_histogram_table() {
    let f = fixture(3);
    let mut pfs = vec![f.prior(0.3)];
    apply_first(&mut pfs, OperatorKind::CountConversion, &f.vocab);

    assert_eq!(pfs.len(), 1);
    let pf = &pfs[0];
    assert!(pf.logical_vars().is_empty());
    let Term::Counting(ct) = pf.term(0) else {
        panic!("expected a counting term, got {}", pf.term(0));
    };
    let hist_type = ct.histogram_type(&f.vocab);
    assert_eq!(pf.potential().len(), hist_type.size());
    for i in 0..hist_type.size() {
        let h = hist_type.nth(i).unwrap();
        let expected = 0.7f64.powi(h.count(0).unwrap() as i32) * 0.3f64.powi(h.count(1).unwrap() as i32);
        assert_relative_eq!(pf.potential().get(&[i]).unwrap(), expected, epsilon = 1e-12);
    }
}

#[test]
fn test_count_conversion_reuses_existing_counting_term() {
    let f = fixture(3);
    let x = f.var();
    let y = f.var();
    let ct = CountingTerm::unconstrained(y, f.smokes_app(Arg::Var(y)));
    let pf = Parfactor::unconstrained(
        vec![x],
        vec![f.smokes(Arg::Var(x)), Term::Counting(ct)],
        Potential::filled(&[2, 4], 1.0),
        &f.vocab,
    )
    .unwrap();
    let ops = CountConversion::candidates(std::slice::from_ref(&pf), &f.vocab);
    assert_eq!(ops.len(), 1);
    // one counting dimension left
    assert_relative_eq!(ops[0].log_cost(), 4f64.ln(), epsilon = 1e-12);
}

#[test]
fn test_exponentiation_drops_unused_var() {
    let f = fixture(3);
    let x = f.var();
    let y = f.var();
    let pf = Parfactor::unconstrained(
        vec![x, y],
        vec![f.smokes(Arg::Var(x))],
        Potential::from_vec(&[2], vec![0.5, 2.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let mut pfs = vec![pf.clone()];
    let ops = Exponentiation::candidates(&pfs);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].log_cost(), 0.0);
    Box::new(ops.into_iter().next().unwrap()).operate(&mut pfs, &f.vocab).unwrap();

    assert_eq!(pfs[0].logical_vars(), &[x]);
    assert_eq!(pfs[0].potential().to_vec(), vec![0.125, 8.0]);
    assert_relative_eq!(
        ground_partition(&f.vocab, &pfs).unwrap(),
        ground_partition(&f.vocab, &[pf]).unwrap(),
        max_relative = 1e-9
    );
}

#[test]
fn test_summing_out_refuses_partially_counted_atoms() {
    let f = fixture(3);
    let y = f.var();
    let ct = CountingTerm::unconstrained(y, f.smokes_app(Arg::Var(y)));
    let counted = Parfactor::unconstrained(
        Vec::new(),
        vec![Term::Counting(ct)],
        Potential::from_vec(&[4], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        &f.vocab,
    )
    .unwrap();
    let pfs = vec![f.prior(0.3), counted];
    let ops = SummingOut::candidates(&pfs, &eliminate_all(), &f.vocab).unwrap();
    assert!(ops.is_empty());
}

#[test]
fn test_summing_out_refuses_self_overlap() {
    let f = fixture(3);
    let pfs = vec![f.influence()];
    let ops = SummingOut::candidates(&pfs, &eliminate_all(), &f.vocab).unwrap();
    // only Friends can go; both Smokes terms cover the same atoms
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].targets().len(), 1);
}

#[test]
fn test_summing_out_on_a_stale_set_is_an_error() {
    let f = fixture(3);
    let pfs = vec![f.prior(0.3)];
    let op = SummingOut::candidates(&pfs, &eliminate_all(), &f.vocab)
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    let result = Box::new(op).operate(&mut Vec::new(), &f.vocab);
    assert!(matches!(result, Err(FoveError::UnsupportedTerm { .. })));
}

#[test]
fn test_count_expansion_then_sum_out() {
    let f = fixture(3);
    let mut pfs = vec![f.prior(0.3)];
    apply_first(&mut pfs, OperatorKind::CountConversion, &f.vocab);
    let before = ground_partition(&f.vocab, &pfs).unwrap();

    apply_first(&mut pfs, OperatorKind::CountExpansion, &f.vocab);
    assert!(pfs.iter().all(|pf| pf.terms().iter().all(|t| t.as_counting().is_none())));
    assert_relative_eq!(ground_partition(&f.vocab, &pfs).unwrap(), before, max_relative = 1e-9);
}

#[test]
fn test_propositionalization_grounds_each_constant() {
    let f = fixture(3);
    let mut pfs = vec![f.prior(0.3)];
    apply_first(&mut pfs, OperatorKind::Propositionalization, &f.vocab);
    assert_eq!(pfs.len(), 3);
    assert!(pfs.iter().all(|pf| pf.logical_vars().is_empty()));
    assert_relative_eq!(ground_partition(&f.vocab, &pfs).unwrap(), 1.0, max_relative = 1e-9);
}
