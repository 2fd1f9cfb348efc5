use std::collections::BTreeMap;

use trellis_base::{illegal_state, Result};
use trellis_codec::Scalar;

/// One position of a query pattern: a concrete scalar, or a named hole that
/// captures whatever the matched tuple holds there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Bound(Scalar),
    Var(String),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Term {
        Term::Var(name.into())
    }

    pub(crate) fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }
}

impl From<Scalar> for Term {
    fn from(value: Scalar) -> Term {
        Term::Bound(value)
    }
}

/// Variable name → matched scalar, accumulated across the patterns of one
/// query.
pub type Bindings = BTreeMap<String, Scalar>;

pub(crate) fn permute(tuple: &[Scalar], order: &[usize]) -> Vec<Scalar> {
    order.iter().map(|&i| tuple[i].clone()).collect()
}

pub(crate) fn unpermute(permuted: &[Scalar], order: &[usize]) -> Vec<Scalar> {
    let mut out = vec![Scalar::Null; permuted.len()];
    for (got, &original) in permuted.iter().zip(order) {
        out[original] = got.clone();
    }
    out
}

// Pick the subspace whose permutation opens with exactly the pattern's
// bound positions, in some order. The planner's coverage invariant says one
// always exists; a miss here is a library bug, not a user error.
pub(crate) fn choose_subspace<'n>(
    pattern: &[Term],
    subspaces: &'n [Vec<usize>],
) -> Result<(usize, &'n [usize])> {
    let bound = pattern
        .iter()
        .enumerate()
        .filter(|(_, term)| !term.is_var())
        .fold(0u32, |m, (i, _)| m | 1 << i);
    let width = bound.count_ones() as usize;
    for (subspace, order) in subspaces.iter().enumerate() {
        let head = order[..width].iter().fold(0u32, |m, &p| m | 1 << p);
        if head == bound {
            return Ok((subspace, order));
        }
    }
    Err(illegal_state("no subspace covers the pattern's bound positions"))
}

/// The pattern's concrete scalars in subspace order, up to the first
/// variable.
pub(crate) fn scan_prefix(pattern: &[Term], order: &[usize]) -> Vec<Scalar> {
    let mut out = Vec::new();
    for &i in order {
        match &pattern[i] {
            Term::Bound(value) => out.push(value.clone()),
            Term::Var(_) => break,
        }
    }
    out
}

/// Replace every variable already present in `bindings` with its value.
pub(crate) fn substitute(pattern: &[Term], bindings: &Bindings) -> Vec<Term> {
    pattern
        .iter()
        .map(|term| match term {
            Term::Var(name) => match bindings.get(name) {
                Some(value) => Term::Bound(value.clone()),
                None => term.clone(),
            },
            bound => bound.clone(),
        })
        .collect()
}

/// Extend `seed` with one entry per variable position of `pattern`, taking
/// values from the matched tuple.
pub(crate) fn capture(pattern: &[Term], tuple: &[Scalar], seed: &Bindings) -> Bindings {
    let mut out = seed.clone();
    for (term, value) in pattern.iter().zip(tuple) {
        if let Term::Var(name) = term {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}
