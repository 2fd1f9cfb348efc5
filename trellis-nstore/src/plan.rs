// For arity n, the minimum family of permutations of {0..n-1} such that
// every non-empty subset of positions is the head-set of some permutation.
// A pattern whose bound positions are exactly that subset then lands on one
// subspace whose keys sort those positions first, and a single prefix scan
// answers it.
//
// The minimum family size is the central binomial coefficient C(n, n/2):
// cover the boolean lattice of subsets with that many symmetric chains and
// read one permutation off each chain. Each chain is built from one
// floor(n/2)-subset by repeatedly retiring the leftmost (outside, inside)
// neighbour pair onto two stacks.

use itertools::Itertools;
use trellis_base::{illegal_state, invalid_input, Result};

/// Largest supported tuple arity. C(12, 6) = 924 subspaces per tuple is
/// already far past any sane write amplification.
pub const MAX_ARITY: usize = 12;

pub fn permutations_for_arity(n: usize) -> Result<Vec<Vec<usize>>> {
    if n < 1 || n > MAX_ARITY {
        return Err(invalid_input(format!("tuple arity {n} outside 1..={MAX_ARITY}")));
    }
    let mut out: Vec<Vec<usize>> = (0..n)
        .combinations(n / 2)
        .map(|chosen| chain_permutation(n, &chosen))
        .collect();
    out.sort();
    if !covers_all_patterns(&out, n) {
        return Err(illegal_state(format!(
            "permutation family for arity {n} misses a pattern shape"
        )));
    }
    Ok(out)
}

fn chain_permutation(n: usize, chosen: &[usize]) -> Vec<usize> {
    let mut middle: Vec<(usize, bool)> = (0..n).map(|i| (i, chosen.contains(&i))).collect();
    let mut ins = Vec::new();
    let mut outs = Vec::new();
    loop {
        let pair = (0..middle.len().saturating_sub(1)).find(|&i| !middle[i].1 && middle[i + 1].1);
        match pair {
            Some(i) => {
                outs.push(middle[i].0);
                ins.push(middle[i + 1].0);
                middle.drain(i..=i + 1);
            }
            None => break,
        }
    }
    let mut perm: Vec<usize> = ins.into_iter().rev().collect();
    perm.extend(middle.into_iter().map(|(i, _)| i));
    perm.extend(outs.into_iter().rev());
    perm
}

// Post-condition check: every non-empty subset of positions must appear as
// the head-set of some permutation.
fn covers_all_patterns(perms: &[Vec<usize>], n: usize) -> bool {
    (1u32..1 << n).all(|want| {
        let size = want.count_ones() as usize;
        perms
            .iter()
            .any(|perm| perm[..size].iter().fold(0u32, |m, &p| m | 1 << p) == want)
    })
}
