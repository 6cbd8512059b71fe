//! Shattering: splitting a parfactor set until any two terms with the same
//! function symbol cover either the same ground atoms or disjoint ones.

use indexmap::IndexMap;
use tracing::{debug, trace};

use liftve_ir::{FuncApp, FuncId, Vocabulary};

use crate::error::{FoveError, Result};
use crate::parfactor::Parfactor;

/// Splits and additions a bag may perform before shattering is abandoned.
pub const DEFAULT_SHATTER_STEPS: usize = 100_000;

/// A set of parfactors kept shattered with respect to each other.
///
/// Terms are indexed by function symbol, so a new parfactor is only
/// compared against terms that could overlap it. Parfactors are brought
/// into normal form before they are compared.
#[derive(Debug)]
pub struct ShatteredParfactorBag<'v> {
    vocab: &'v Vocabulary,
    slots: Vec<Option<Parfactor>>,
    by_signature: IndexMap<FuncId, Vec<(usize, usize)>>,
    steps: usize,
    step_limit: usize,
}

impl<'v> ShatteredParfactorBag<'v> {
    pub fn new(vocab: &'v Vocabulary) -> Self {
        Self {
            vocab,
            slots: Vec::new(),
            by_signature: IndexMap::new(),
            steps: 0,
            step_limit: DEFAULT_SHATTER_STEPS,
        }
    }

    /// Fail with [`FoveError::ShatterLimitExceeded`] after `limit` steps.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Build a bag holding a shattered version of `parfactors`.
    pub fn from_parfactors(vocab: &'v Vocabulary, parfactors: Vec<Parfactor>) -> Result<Self> {
        let mut bag = Self::new(vocab);
        bag.add_all(parfactors)?;
        Ok(bag)
    }

    /// Steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn step(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(FoveError::ShatterLimitExceeded { limit: self.step_limit });
        }
        Ok(())
    }

    pub fn add(&mut self, pf: Parfactor) -> Result<()> {
        self.add_all(vec![pf])
    }

    /// Add parfactors, splitting them and the clean ones they overlap
    /// until everything is shattered again.
    pub fn add_all(&mut self, parfactors: Vec<Parfactor>) -> Result<()> {
        let mut stack = Vec::with_capacity(parfactors.len());
        for pf in parfactors {
            stack.push(pf.renamed_copy(self.vocab)?);
        }

        while let Some(dirty) = stack.pop() {
            self.step()?;
            if !dirty.constraint().is_normal_form() {
                stack.extend(dirty.make_constraints_normal_form(self.vocab)?);
                continue;
            }
            let mut residuals = Vec::new();
            if self.split_dirty(&dirty, &mut residuals)? {
                stack.extend(residuals);
            } else {
                self.add_safe(dirty);
            }
        }
        Ok(())
    }

    /// Try one split of `dirty` against itself or a clean parfactor.
    fn split_dirty(&mut self, dirty: &Parfactor, residuals: &mut Vec<Parfactor>) -> Result<bool> {
        for i in 0..dirty.num_terms() {
            for j in i + 1..dirty.num_terms() {
                if dirty.term_signature(i) == dirty.term_signature(j)
                    && dirty.shatter_within(i, j, residuals, self.vocab)?
                {
                    trace!(parfactor = %dirty, i, j, "split within parfactor");
                    return Ok(true);
                }
            }
        }

        for i in 0..dirty.num_terms() {
            let Some(sig) = dirty.term_signature(i) else {
                continue;
            };
            let clean: Vec<(usize, usize)> = self.by_signature.get(&sig).cloned().unwrap_or_default();
            for (id, c_index) in clean {
                let Some(cpf) = self.slots.get(id).and_then(Option::as_ref) else {
                    continue;
                };
                let mut theirs = Vec::new();
                if cpf.shatter(dirty, c_index, i, residuals, &mut theirs, self.vocab)? {
                    trace!(clean = %cpf, dirty = %dirty, "split clean parfactor");
                    residuals.append(&mut theirs);
                    self.remove(id);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn add_safe(&mut self, pf: Parfactor) {
        let id = self.slots.len();
        for i in 0..pf.num_terms() {
            if let Some(sig) = pf.term_signature(i) {
                self.by_signature.entry(sig).or_default().push((id, i));
            }
        }
        self.slots.push(Some(pf));
    }

    fn remove(&mut self, id: usize) -> Option<Parfactor> {
        let pf = self.slots.get_mut(id)?.take()?;
        for ptrs in self.by_signature.values_mut() {
            ptrs.retain(|(pid, _)| *pid != id);
        }
        Some(pf)
    }

    /// Split so that no term partially covers a query atom.
    pub fn split_on_query_terms(&mut self, queries: &[FuncApp]) -> Result<()> {
        for query in queries {
            loop {
                self.step()?;
                let ptrs = self.by_signature.get(&query.func()).cloned().unwrap_or_default();
                let mut split = None;
                for (id, index) in ptrs {
                    let Some(pf) = self.slots.get(id).and_then(Option::as_ref) else {
                        continue;
                    };
                    let mut residuals = Vec::new();
                    if pf.shatter_against_ground(index, query, &mut residuals, self.vocab)? {
                        split = Some((id, residuals));
                        break;
                    }
                }
                let Some((id, residuals)) = split else {
                    break;
                };
                trace!(query = %query, "split on query atom");
                self.remove(id);
                for residual in residuals {
                    self.add(residual)?;
                }
            }
        }
        Ok(())
    }

    pub fn parfactors(&self) -> impl Iterator<Item = &Parfactor> + '_ {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.parfactors().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_parfactors(self) -> Vec<Parfactor> {
        self.slots.into_iter().flatten().collect()
    }

    /// Check every pair of same-signature terms, and every term against the
    /// query atoms, for partial overlaps. Quadratic; meant for tests.
    pub fn is_shattered(&self, queries: &[FuncApp]) -> Result<bool> {
        let pfs: Vec<&Parfactor> = self.parfactors().collect();
        let mut scratch = Vec::new();
        for (a, p) in pfs.iter().enumerate() {
            for k in 0..p.num_terms() {
                for l in k + 1..p.num_terms() {
                    if p.term_signature(k) == p.term_signature(l) && p.shatter_within(k, l, &mut scratch, self.vocab)? {
                        return Ok(false);
                    }
                }
                for q in &pfs[a + 1..] {
                    for l in 0..q.num_terms() {
                        if p.term_signature(k) == q.term_signature(l)
                            && p.shatter(q, k, l, &mut scratch, &mut Vec::new(), self.vocab)?
                        {
                            return Ok(false);
                        }
                    }
                }
                for query in queries {
                    if p.shatter_against_ground(k, query, &mut scratch, self.vocab)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Shatter `parfactors` against each other and the query atoms, then bring
/// every constraint into normal form and merge repeated dimensions.
pub fn shatter(vocab: &Vocabulary, parfactors: Vec<Parfactor>, queries: &[FuncApp]) -> Result<Vec<Parfactor>> {
    shatter_with_limit(vocab, parfactors, queries, DEFAULT_SHATTER_STEPS)
}

/// [`shatter`] with a bound on the total number of bag steps.
pub fn shatter_with_limit(
    vocab: &Vocabulary,
    parfactors: Vec<Parfactor>,
    queries: &[FuncApp],
    limit: usize,
) -> Result<Vec<Parfactor>> {
    let mut current = normal_form_all(vocab, parfactors)?.0;
    let mut used = 0;
    loop {
        let mut bag = ShatteredParfactorBag::new(vocab).with_step_limit(limit.saturating_sub(used));
        let shattered = bag.add_all(current).and_then(|()| bag.split_on_query_terms(queries));
        if let Err(FoveError::ShatterLimitExceeded { .. }) = shattered {
            return Err(FoveError::ShatterLimitExceeded { limit });
        }
        shattered?;
        used += bag.steps();
        let (normal, changed) = normal_form_all(vocab, bag.into_parfactors())?;
        current = normal
            .iter()
            .map(|pf| pf.collapse_duplicate_terms(vocab))
            .collect::<Result<Vec<_>>>()?;
        if !changed {
            break;
        }
        debug!(parfactors = current.len(), "normal form split shattered parfactors, shattering again");
    }
    debug!(parfactors = current.len(), steps = used, "shattered");
    Ok(current)
}

fn normal_form_all(vocab: &Vocabulary, parfactors: Vec<Parfactor>) -> Result<(Vec<Parfactor>, bool)> {
    let mut out = Vec::with_capacity(parfactors.len());
    let mut changed = false;
    for pf in parfactors {
        if pf.constraint().is_normal_form() {
            out.push(pf);
        } else {
            changed = true;
            out.extend(pf.make_constraints_normal_form(vocab)?);
        }
    }
    Ok((out, changed))
}

/// Repeatedly replace pairs of parfactors by their merge.
pub fn compact(vocab: &Vocabulary, mut parfactors: Vec<Parfactor>, tolerance: f64) -> Vec<Parfactor> {
    'outer: loop {
        for i in 0..parfactors.len() {
            for j in i + 1..parfactors.len() {
                if let Some(merged) = parfactors[i].get_merged(&parfactors[j], tolerance, vocab) {
                    trace!(merged = %merged, "merged parfactors");
                    parfactors.remove(j);
                    parfactors[i] = merged;
                    continue 'outer;
                }
            }
        }
        return parfactors;
    }
}
