// A relation of n-tuples stored once per permutation subspace, so that any
// partial-binding pattern is answerable with a single prefix range scan.
//
// Row layout: key = encode(prefix ++ (subspace,) ++ permute(tuple)), value
// = 0x01. Nothing else is persisted; the whole structure is derivable from
// (prefix, arity). Membership of a tuple means all of its subspace rows
// exist; add and delete write every subspace inside the caller's
// transaction, so readers never see a torn tuple.

mod pattern;
mod plan;

pub use pattern::{Bindings, Term};
pub use plan::{permutations_for_arity, MAX_ARITY};

use pattern::{capture, choose_subspace, permute, scan_prefix, substitute, unpermute};
use trellis_base::{corrupt, invalid_input, Result};
use trellis_codec::{decode, encode, successor, Scalar};
use trellis_kv::Txn;

// The stored value for every subspace row; presence is the information.
const ROW_PRESENT: &[u8] = &[0x01];

/// One named n-ary relation: a key prefix, an arity, and the permutation
/// family computed for that arity. Immutable once constructed, so handles
/// share it freely.
#[derive(Clone, Debug)]
pub struct NStore {
    name: String,
    prefix: Vec<Scalar>,
    arity: usize,
    subspaces: Vec<Vec<usize>>,
}

// The single-hop plan for one pattern: which permutation the scanned keys
// use, and the half-open byte range to walk.
struct Hop<'n> {
    order: &'n [usize],
    start: Vec<u8>,
    end: Vec<u8>,
}

impl NStore {
    pub fn new(name: impl Into<String>, prefix: Vec<Scalar>, arity: usize) -> Result<NStore> {
        let subspaces = permutations_for_arity(arity)?;
        Ok(NStore {
            name: name.into(),
            prefix,
            arity,
            subspaces,
        })
    }

    /// A relation whose key prefix is its own name.
    pub fn named(name: impl Into<String>, arity: usize) -> Result<NStore> {
        let name = name.into();
        let prefix = vec![Scalar::Text(name.clone())];
        NStore::new(name, prefix, arity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &[Scalar] {
        &self.prefix
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn subspaces(&self) -> &[Vec<usize>] {
        &self.subspaces
    }

    fn check_arity(&self, len: usize, what: &str) -> Result<()> {
        if len != self.arity {
            return Err(invalid_input(format!(
                "{what} has {len} elements, relation {:?} holds {}-tuples",
                self.name, self.arity
            )));
        }
        Ok(())
    }

    fn subspace_key(&self, subspace: usize, items: &[Scalar]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + 1 + items.len());
        full.extend_from_slice(&self.prefix);
        full.push(Scalar::Int(subspace as i64));
        full.extend_from_slice(items);
        encode(&full)
    }

    fn plan_hop(&self, pattern: &[Term]) -> Result<Hop<'_>> {
        let (subspace, order) = choose_subspace(pattern, &self.subspaces)?;
        let head = scan_prefix(pattern, order);
        let start = self.subspace_key(subspace, &head);
        // An all-0xFF start has no successor; extending by one zero byte is
        // the next valid exclusive bound.
        let end = match successor(&start) {
            Some(end) => end,
            None => {
                let mut end = start.clone();
                end.push(0x00);
                end
            }
        };
        Ok(Hop { order, start, end })
    }

    // Strip prefix and subspace discriminant, undo the permutation.
    fn decode_row(&self, key: &[u8], order: &[usize]) -> Result<Vec<Scalar>> {
        let decoded = decode(key)?;
        let skip = self.prefix.len() + 1;
        if decoded.len() != skip + self.arity {
            return Err(corrupt(format!(
                "row in relation {:?} decodes to {} elements, expected {}",
                self.name,
                decoded.len(),
                skip + self.arity
            )));
        }
        Ok(unpermute(&decoded[skip..], order))
    }

    /// Write the tuple into every subspace. Idempotent.
    pub fn add(&self, txn: &Txn, tuple: &[Scalar]) -> Result<()> {
        self.check_arity(tuple.len(), "tuple")?;
        for (subspace, order) in self.subspaces.iter().enumerate() {
            let key = self.subspace_key(subspace, &permute(tuple, order));
            txn.set(&key, ROW_PRESENT)?;
        }
        Ok(())
    }

    /// Remove the tuple from every subspace. Idempotent.
    pub fn delete(&self, txn: &Txn, tuple: &[Scalar]) -> Result<()> {
        self.check_arity(tuple.len(), "tuple")?;
        for (subspace, order) in self.subspaces.iter().enumerate() {
            let key = self.subspace_key(subspace, &permute(tuple, order));
            txn.delete(&key)?;
        }
        Ok(())
    }

    /// Point lookup in subspace 0, whose permutation is the identity (it
    /// sorts first in the lexicographic family).
    pub fn exists(&self, txn: &Txn, tuple: &[Scalar]) -> Result<bool> {
        self.check_arity(tuple.len(), "tuple")?;
        let key = self.subspace_key(0, &permute(tuple, &self.subspaces[0]));
        Ok(txn.get(&key)?.is_some())
    }

    /// How many stored tuples match the pattern.
    pub fn count(&self, txn: &Txn, pattern: &[Term]) -> Result<u64> {
        self.check_arity(pattern.len(), "pattern")?;
        let hop = self.plan_hop(pattern)?;
        txn.count(&hop.start, &hop.end, 0, None)
    }

    /// Total key+value bytes of the rows matching the pattern, in its
    /// chosen subspace.
    pub fn bytes(&self, txn: &Txn, pattern: &[Term]) -> Result<u64> {
        self.check_arity(pattern.len(), "pattern")?;
        let hop = self.plan_hop(pattern)?;
        txn.bytes(&hop.start, &hop.end, 0, None)
    }

    /// Conjunctive query: nested-loop join over the patterns in caller
    /// order. Each partial binding substitutes into the next pattern, the
    /// pattern picks its subspace, and one prefix scan extends the binding
    /// per matching row. Result order follows the byte order of each chosen
    /// subspace; a variable reused across patterns must rebind to the same
    /// value by construction.
    pub fn query(&self, txn: &Txn, patterns: &[Vec<Term>]) -> Result<Vec<Bindings>> {
        if patterns.is_empty() {
            return Err(invalid_input("query needs at least one pattern"));
        }
        let mut bindings = vec![Bindings::new()];
        for pattern in patterns {
            self.check_arity(pattern.len(), "pattern")?;
            let mut extended = Vec::new();
            for binding in &bindings {
                let bound = substitute(pattern, binding);
                let hop = self.plan_hop(&bound)?;
                for (key, _) in txn.query(&hop.start, &hop.end, 0, None)? {
                    let tuple = self.decode_row(&key, hop.order)?;
                    extended.push(capture(pattern, &tuple, binding));
                }
            }
            bindings = extended;
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod test;
