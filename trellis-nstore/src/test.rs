use tempfile::TempDir;
use test_log::test;
use trellis_base::ErrorKind;
use trellis_codec::Scalar;
use trellis_kv::{with_txn, with_txn_read, Storage};

use crate::{permutations_for_arity, NStore, Term};

fn s(text: &str) -> Scalar {
    Scalar::Text(text.into())
}

fn b(text: &str) -> Term {
    Term::Bound(s(text))
}

fn v(name: &str) -> Term {
    Term::var(name)
}

fn open_temp() -> (TempDir, Storage) {
    let dir = TempDir::new().unwrap();
    let store = Storage::open_with(dir.path().join("test.db"), Some(4), None).unwrap();
    (dir, store)
}

fn table_rows(store: &Storage) -> u64 {
    with_txn_read(store, |txn| txn.count(&[], &[0xFF], 0, None)).unwrap()
}

#[test]
fn test_permutation_tables() {
    assert_eq!(permutations_for_arity(1).unwrap(), vec![vec![0]]);
    assert_eq!(
        permutations_for_arity(2).unwrap(),
        vec![vec![0, 1], vec![1, 0]]
    );
    assert_eq!(
        permutations_for_arity(3).unwrap(),
        vec![vec![0, 1, 2], vec![1, 2, 0], vec![2, 0, 1]]
    );
    assert_eq!(
        permutations_for_arity(4).unwrap(),
        vec![
            vec![0, 1, 2, 3],
            vec![1, 2, 3, 0],
            vec![2, 0, 3, 1],
            vec![3, 0, 1, 2],
            vec![3, 1, 2, 0],
            vec![3, 2, 0, 1],
        ]
    );
}

// Family size is the central binomial coefficient, and every non-empty
// subset of positions must be the head-set of some permutation.
#[test]
fn test_family_size_and_coverage() {
    let central = [1usize, 2, 3, 6, 10, 20, 35];
    for (n, want) in (1..=7).zip(central) {
        let perms = permutations_for_arity(n).unwrap();
        assert_eq!(perms.len(), want, "arity {n}");
        for subset in 1u32..1 << n {
            let size = subset.count_ones() as usize;
            let covered = perms
                .iter()
                .any(|perm| perm[..size].iter().fold(0u32, |m, &p| m | 1 << p) == subset);
            assert!(covered, "arity {n} subset {subset:#b} uncovered");
        }
    }
}

#[test]
fn test_arity_bounds() {
    assert_eq!(
        permutations_for_arity(0).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        permutations_for_arity(13).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
}

#[test]
fn test_subspace_key_layout() {
    let (_dir, store) = open_temp();
    let ns = NStore::new("r", vec![s("p")], 1).unwrap();
    let seed = ns.clone();
    with_txn(&store, move |txn| seed.add(txn, &[Scalar::Int(0)])).unwrap();

    // encode(("p", 0, 0)): text tag + "p" + terminator, then the subspace
    // discriminant and the element, both IntZero.
    let key = vec![0x02, 0x70, 0x00, 0x04, 0x04];
    let value = with_txn_read(&store, move |txn| txn.get(&key)).unwrap();
    assert_eq!(value, Some(vec![0x01]));
}

#[test]
fn test_add_exists_delete() {
    let (_dir, store) = open_temp();
    let ns = NStore::named("triples", 3).unwrap();
    let tuple = [s("alice"), s("knows"), s("bob")];

    let (seed, t) = (ns.clone(), tuple.clone());
    with_txn(&store, move |txn| seed.add(txn, &t)).unwrap();

    // One row per subspace.
    assert_eq!(table_rows(&store), 3);

    let (q, t) = (ns.clone(), tuple.clone());
    assert!(with_txn_read(&store, move |txn| q.exists(txn, &t)).unwrap());
    let q = ns.clone();
    assert!(!with_txn_read(&store, move |txn| q.exists(
        txn,
        &[s("alice"), s("knows"), s("carol")]
    ))
    .unwrap());

    // Add is idempotent: the table does not grow on repeat.
    let (seed, t) = (ns.clone(), tuple.clone());
    with_txn(&store, move |txn| seed.add(txn, &t)).unwrap();
    assert_eq!(table_rows(&store), 3);

    // Delete clears every subspace row.
    let (del, t) = (ns.clone(), tuple.clone());
    with_txn(&store, move |txn| del.delete(txn, &t)).unwrap();
    assert_eq!(table_rows(&store), 0);
    let (q, t) = (ns.clone(), tuple);
    assert!(!with_txn_read(&store, move |txn| q.exists(txn, &t)).unwrap());
}

fn seed_triples(store: &Storage, ns: &NStore) {
    let seed = ns.clone();
    with_txn(store, move |txn| {
        seed.add(txn, &[s("alice"), s("knows"), s("bob")])?;
        seed.add(txn, &[s("alice"), s("likes"), s("python")])?;
        seed.add(txn, &[s("bob"), s("knows"), s("carol")])
    })
    .unwrap();
}

#[test]
fn test_single_pattern_query() {
    let (_dir, store) = open_temp();
    let ns = NStore::named("triples", 3).unwrap();
    seed_triples(&store, &ns);

    let q = ns.clone();
    let out = with_txn_read(&store, move |txn| {
        q.query(txn, &[vec![v("x"), b("knows"), v("y")]])
    })
    .unwrap();

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get("x"), Some(&s("alice")));
    assert_eq!(out[0].get("y"), Some(&s("bob")));
    assert_eq!(out[1].get("x"), Some(&s("bob")));
    assert_eq!(out[1].get("y"), Some(&s("carol")));
}

#[test]
fn test_fully_bound_query() {
    let (_dir, store) = open_temp();
    let ns = NStore::named("triples", 3).unwrap();
    seed_triples(&store, &ns);

    let q = ns.clone();
    let hit = with_txn_read(&store, move |txn| {
        q.query(txn, &[vec![b("alice"), b("knows"), b("bob")]])
    })
    .unwrap();
    assert_eq!(hit.len(), 1);
    assert!(hit[0].is_empty());

    let q = ns.clone();
    let miss = with_txn_read(&store, move |txn| {
        q.query(txn, &[vec![b("alice"), b("knows"), b("nobody")]])
    })
    .unwrap();
    assert!(miss.is_empty());
}

#[test]
fn test_join_query() {
    let (_dir, store) = open_temp();
    let ns = NStore::named("hyperdev", 3).unwrap();
    let seed = ns.clone();
    with_txn(&store, move |txn| {
        seed.add(txn, &[s("P4X432"), s("blog/title"), s("hyper.dev")])?;
        seed.add(txn, &[s("123456"), s("post/blog"), s("P4X432")])?;
        seed.add(txn, &[s("123456"), s("post/title"), s("Hello World")])
    })
    .unwrap();

    let q = ns.clone();
    let out = with_txn_read(&store, move |txn| {
        q.query(
            txn,
            &[
                vec![v("blog"), b("blog/title"), b("hyper.dev")],
                vec![v("post"), b("post/blog"), v("blog")],
                vec![v("post"), b("post/title"), v("title")],
            ],
        )
    })
    .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("blog"), Some(&s("P4X432")));
    assert_eq!(out[0].get("post"), Some(&s("123456")));
    assert_eq!(out[0].get("title"), Some(&s("Hello World")));
}

#[test]
fn test_count_and_bytes_patterns() {
    let (_dir, store) = open_temp();
    let ns = NStore::named("triples", 3).unwrap();
    seed_triples(&store, &ns);

    let q = ns.clone();
    assert_eq!(
        with_txn_read(&store, move |txn| q.count(txn, &[v("x"), b("knows"), v("y")])).unwrap(),
        2
    );
    let q = ns.clone();
    assert_eq!(
        with_txn_read(&store, move |txn| q.count(txn, &[v("x"), v("p"), v("y")])).unwrap(),
        3
    );
    let q = ns.clone();
    assert_eq!(
        with_txn_read(&store, move |txn| q.count(txn, &[b("alice"), b("hates"), v("y")])).unwrap(),
        0
    );

    let q = ns.clone();
    let total = with_txn_read(&store, move |txn| q.bytes(txn, &[v("x"), v("p"), v("y")])).unwrap();
    // Three keys plus three one-byte values in the scanned subspace.
    let q = ns.clone();
    let keys = with_txn_read(&store, move |txn| {
        let hopless: u64 = txn
            .query(&[], &[0xFF], 0, None)?
            .iter()
            .filter(|(k, _)| {
                // Rows of subspace 0 start with the prefix and IntZero.
                k.starts_with(&[0x02, 0x74, 0x72, 0x69, 0x70, 0x6C, 0x65, 0x73, 0x00, 0x04])
            })
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum();
        Ok(hopless)
    })
    .unwrap();
    assert_eq!(total, keys);
}

// Bound-position sets that land on later subspaces still answer with one
// prefix scan.
#[test]
fn test_trailing_bound_position() {
    let (_dir, store) = open_temp();
    let ns = NStore::named("quads", 4).unwrap();
    let seed = ns.clone();
    with_txn(&store, move |txn| {
        seed.add(txn, &[s("a"), s("b"), s("c"), s("d")])?;
        seed.add(txn, &[s("a"), s("b"), s("c"), s("e")])
    })
    .unwrap();

    let q = ns.clone();
    assert_eq!(
        with_txn_read(&store, move |txn| {
            q.count(txn, &[v("w"), v("x"), v("y"), b("d")])
        })
        .unwrap(),
        1
    );
    let q = ns.clone();
    assert_eq!(
        with_txn_read(&store, move |txn| {
            q.count(txn, &[v("w"), b("b"), v("y"), b("e")])
        })
        .unwrap(),
        1
    );
}

#[test]
fn test_arity_mismatch() {
    let (_dir, store) = open_temp();
    let ns = NStore::named("triples", 3).unwrap();

    let bad = ns.clone();
    let err = with_txn(&store, move |txn| bad.add(txn, &[s("too"), s("short")])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let bad = ns.clone();
    let err = with_txn_read(&store, move |txn| {
        bad.query(txn, &[vec![v("x"), b("knows")]])
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let bad = ns.clone();
    let err = with_txn_read(&store, move |txn| bad.query(txn, &[])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
