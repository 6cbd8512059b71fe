//! Splitting parfactors so that overlapping terms line up.

use std::collections::BTreeSet;

use liftve_ir::{overlap, Arg, Constraint, FuncApp, IrError, LogicalVar, Substitution, Term, Vocabulary};
use tracing::trace;

use super::Parfactor;
use crate::error::Result;

impl Parfactor {
    /// Split this parfactor and `other` until term `i` here and term `j`
    /// there either coincide or are disjoint.
    ///
    /// Returns false when the terms already overlap fully or not at all, or
    /// when neither side has anything to split off. Otherwise the pieces of
    /// this parfactor go to `mine`, those of `other` to `theirs`, and both
    /// originals are to be discarded.
    pub fn shatter(
        &self,
        other: &Parfactor,
        i: usize,
        j: usize,
        mine: &mut Vec<Parfactor>,
        theirs: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<bool> {
        let t1 = &self.terms[i];
        let t2 = &other.terms[j];
        let Some(o) = overlap(t1, &self.constraint, t2, &other.constraint, vocab) else {
            return Ok(false);
        };
        if o.is_full() {
            return Ok(false);
        }
        let (mine_before, theirs_before) = (mine.len(), theirs.len());
        let cvar1 = t1.as_counting().map(|ct| ct.var());
        let cvar2 = t2.as_counting().map(|ct| ct.var());
        self.separate(&o.theta, &o.c2_theta, cvar1, i, mine, vocab)?;
        other.separate(&o.theta, &o.c1_theta, cvar2, j, theirs, vocab)?;
        if self.left_whole(&mine[mine_before..], vocab) && other.left_whole(&theirs[theirs_before..], vocab) {
            mine.truncate(mine_before);
            theirs.truncate(theirs_before);
            return Ok(false);
        }
        trace!(mine = %self, theirs = %other, theta = %o.theta, "shattered on partial overlap");
        Ok(true)
    }

    /// Split so that term `i` either covers the ground atom `ground` alone
    /// or does not cover it at all.
    pub fn shatter_against_ground(
        &self,
        i: usize,
        ground: &FuncApp,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<bool> {
        let t2 = Term::FuncApp(ground.clone());
        self.separate_on_overlap(i, &t2, &Constraint::default(), residuals, vocab)
    }

    /// Split on a partial overlap between terms `i` and `j` of this
    /// parfactor, in whichever direction has something to split off.
    ///
    /// The terms are compared across groundings, so the other side is a
    /// renamed-apart copy. With `[F(p0), F(x)]` only `x` can be split, so
    /// the pair is tried both ways round.
    pub fn shatter_within(
        &self,
        i: usize,
        j: usize,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<bool> {
        let apart = self.renamed_copy(vocab)?;
        Ok(self.separate_on_overlap(i, &apart.terms[j], &apart.constraint, residuals, vocab)?
            || self.separate_on_overlap(j, &apart.terms[i], &apart.constraint, residuals, vocab)?)
    }

    /// Separate this parfactor on the overlap of term `i` with `t2` under
    /// `c2`. Reports false, leaving `residuals` as it was, when the overlap
    /// is full or empty or the split would leave this parfactor whole.
    fn separate_on_overlap(
        &self,
        i: usize,
        t2: &Term,
        c2: &Constraint,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<bool> {
        let t1 = &self.terms[i];
        let Some(o) = overlap(t1, &self.constraint, t2, c2, vocab) else {
            return Ok(false);
        };
        if o.is_full() {
            return Ok(false);
        }
        let before = residuals.len();
        let cvar = t1.as_counting().map(|ct| ct.var());
        self.separate(&o.theta, &o.c2_theta, cvar, i, residuals, vocab)?;
        if self.left_whole(&residuals[before..], vocab) {
            residuals.truncate(before);
            return Ok(false);
        }
        Ok(true)
    }

    /// Whether `pieces` is just this parfactor again, up to renaming.
    fn left_whole(&self, pieces: &[Parfactor], vocab: &Vocabulary) -> bool {
        let [piece] = pieces else {
            return false;
        };
        self.vars.len() == piece.vars.len()
            && self.potential.shape() == piece.potential.shape()
            && self.terms.iter().zip(&piece.terms).all(|(a, b)| {
                a.signature() == b.signature() && a.as_counting().is_some() == b.as_counting().is_some()
            })
            && self.num_groundings(vocab) == piece.num_groundings(vocab)
    }

    /// Carve out the piece of this parfactor that agrees with θ and `c`,
    /// pushing it and every split-off remainder onto `residuals`.
    ///
    /// `cvar` is the counting variable of term `index` when that term is a
    /// counting term.
    pub fn separate(
        &self,
        theta: &Substitution,
        c: &Constraint,
        cvar: Option<LogicalVar>,
        index: usize,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<()> {
        let mut p = self.clone();
        for (l, t) in theta.iter() {
            if self.vars.contains(&l) && p.vars.contains(&l) {
                p = p.split_on(l, t, residuals, vocab)?;
            }
        }
        for (l, excluded) in c.iter() {
            if !p.vars.contains(&l) {
                continue;
            }
            let mut carved = p.constraint.excluded(l).clone();
            carved.extend(excluded.iter().copied());
            if p.constraint.replace_excluded(l, carved).has_contradiction(vocab) {
                // no grounding of p lies in the overlap
                residuals.push(p.renamed_copy(vocab)?);
                return Ok(());
            }
            p = p.split_on_constraint(l, excluded, residuals, vocab)?;
        }
        if let Some(cvar) = cvar {
            let t = theta.replacement(cvar);
            p = p.expand_count(cvar, t, index, residuals, vocab)?;
            if let Arg::Var(tv) = t {
                if !p.vars.contains(&tv) && c.constrains(tv) {
                    p = p.expand_count_on_constraint(tv, c.excluded(tv), index, residuals, vocab)?;
                }
            }
        }
        residuals.push(p.renamed_copy(vocab)?);
        Ok(())
    }

    /// Split on `l = t`: return the part with `l` replaced by `t`, pushing
    /// the part with `l != t` onto `residuals` unless it is empty.
    ///
    /// Renaming `l` to a variable not quantified here is not a split.
    pub fn split_on(
        &self,
        l: LogicalVar,
        t: Arg,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<Parfactor> {
        let theta = Substitution::singleton(l, t);
        if let Arg::Var(tv) = t {
            if !self.vars.contains(&tv) {
                return self.apply_substitution(&theta, vocab);
            }
        }
        trace!(parfactor = %self, var = %l, term = %t, "splitting on equality");
        let rest = self.copy_with_constraint(l, t, vocab)?;
        if !rest.constraint.has_contradiction(vocab) {
            residuals.push(rest);
        }
        self.apply_substitution(&theta, vocab)
    }

    /// Both halves of the split on `l = t`, or this parfactor alone when
    /// `l != t` already holds.
    pub fn split_on_pair(&self, l: LogicalVar, t: Arg, vocab: &Vocabulary) -> Result<Vec<Parfactor>> {
        if self.constraint.excluded(l).contains(&t) {
            return Ok(vec![self.clone()]);
        }
        Ok(vec![
            self.apply_substitution(&Substitution::singleton(l, t), vocab)?,
            self.copy_with_constraint(l, t, vocab)?,
        ])
    }

    /// Restrict `l` to the values allowed by both this parfactor and
    /// `excluded_in_other`, pushing the remainder onto `residuals`.
    pub fn split_on_constraint(
        &self,
        l: LogicalVar,
        excluded_in_other: &BTreeSet<Arg>,
        residuals: &mut Vec<Parfactor>,
        vocab: &Vocabulary,
    ) -> Result<Parfactor> {
        trace!(parfactor = %self, var = %l, "splitting on constraint");
        let excluded_in_this = self.constraint.excluded(l).clone();
        let mut excluded_in_overlap = excluded_in_this.clone();
        excluded_in_overlap.extend(excluded_in_other.iter().copied());
        let overlap = self.constraint.replace_excluded(l, excluded_in_overlap.clone());
        if overlap.has_contradiction(vocab) {
            return Err(IrError::EmptyOverlap { var: l.to_string() }.into());
        }
        let inside = self.with_constraint(overlap, vocab)?;

        let mut excluded_in_main = excluded_in_this.clone();
        for term in excluded_in_other {
            if term.is_var() && !excluded_in_this.contains(term) {
                residuals.push(self.apply_substitution(&Substitution::singleton(l, *term), vocab)?);
                excluded_in_main.insert(*term);
            }
        }
        if excluded_in_overlap.len() > excluded_in_main.len() {
            excluded_in_main.extend(
                vocab
                    .constants(l.domain())
                    .map(Arg::Const)
                    .filter(|c| !excluded_in_other.contains(c)),
            );
            residuals.push(self.with_constraint(self.constraint.replace_excluded(l, excluded_in_main), vocab)?);
        }
        Ok(inside)
    }

    /// Split until the constraint is in normal form. Pieces whose
    /// constraint is contradictory carry no groundings and are dropped.
    pub fn make_constraints_normal_form(&self, vocab: &Vocabulary) -> Result<Vec<Parfactor>> {
        if self.constraint.is_normal_form() {
            return Ok(vec![self.clone()]);
        }
        let mut worklist = vec![self.clone()];
        let mut result = Vec::new();
        while let Some(p) = worklist.pop() {
            match p.constraint.normal_form_violation() {
                Some((y, t)) => worklist.extend(p.split_on_pair(y, t, vocab)?),
                None if p.constraint.has_contradiction(vocab) => {}
                None => result.push(p),
            }
        }
        Ok(result)
    }
}
