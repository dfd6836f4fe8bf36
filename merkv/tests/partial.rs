mod common;

use common::{array, cause, dict, init_logging, verify, Dict};
use merkv::{Dictionary, Options, Query, Transport, Verifier, VerifyError};
use merkv_core::{proof::tag, Keccak256Hasher};

fn numbered(count: i32) -> Dict {
    let pairs: Vec<(String, String)> = (0..count)
        .map(|i| (i.to_string(), format!("{}val", i)))
        .collect();
    dict(&pairs)
}

fn keys(range: std::ops::Range<i32>) -> Vec<String> {
    range.map(|i| i.to_string()).collect()
}

fn open(proof: &[u8]) -> Dict {
    Dictionary::from_proof(proof, Options::new()).unwrap()
}

#[test]
fn sub_proofs_from_partial_dictionaries() {
    init_logging();
    let d = numbered(100);

    let partial = open(&d.prove_keys(&keys(-50..50)).unwrap());
    assert_eq!(partial.root(), d.root());
    assert_eq!(partial.get(b"33").unwrap(), Some(b"33val".to_vec()));

    // a partial dictionary proves anything it knows about.
    let sub = open(&partial.prove_keys(&keys(-10..10)).unwrap());
    assert_eq!(sub.root(), d.root());
    for i in -10..10 {
        let expected = (i >= 0).then(|| format!("{}val", i).into_bytes());
        assert_eq!(sub.get(i.to_string().as_bytes()).unwrap(), expected, "key {}", i);
    }

    let err = sub.get(b"33").unwrap_err();
    assert_eq!(cause(&err), Some(VerifyError::IncompleteTree));
}

#[test]
fn merging_proofs_reveals_more() {
    init_logging();
    let d = numbered(100);

    let mut merged = open(&d.prove_keys(&keys(0..10)).unwrap());
    assert!(merged.get(b"33").is_err());

    merged.merge_proof(&d.prove_keys(&keys(30..40)).unwrap()).unwrap();
    assert_eq!(merged.root(), d.root());
    for i in (0..10).chain(30..40) {
        let key = i.to_string();
        assert_eq!(merged.get(key.as_bytes()).unwrap(), d.get(key.as_bytes()).unwrap());
    }
    assert!(merged.get(b"77").is_err());

    // both halves are now provable together.
    let both = merged.prove_keys(&["3", "33"]).unwrap();
    let verified = verify(&both, &Query::new().include("3").include("33")).unwrap();
    assert_eq!(verified.root, d.root());
    assert_eq!(
        verified.values,
        vec![Some(b"3val".to_vec()), Some(b"33val".to_vec())]
    );

    // updates apply across what both proofs revealed.
    merged.put(b"33", b"new").unwrap();
    let mut expected = d.clone();
    expected.put(b"33", b"new").unwrap();
    assert_eq!(merged.root(), expected.root());
}

#[test]
fn merging_a_different_root_fails() {
    let d = numbered(20);
    let mut partial = open(&d.prove_keys(&["1"]).unwrap());

    let other = dict(&[("x", "y")]);
    let err = partial
        .merge_proof(&other.prove_keys(&["x"]).unwrap())
        .unwrap_err();
    assert_eq!(cause(&err), Some(VerifyError::RootMismatch));
    assert_eq!(partial.root(), d.root());
    assert_eq!(partial.get(b"1").unwrap(), Some(b"1val".to_vec()));
}

#[test]
fn index_range_proofs() {
    init_logging();
    let values: Vec<String> = (0..100).map(|i| format!("e{}", i)).collect();
    let d = array(&values);

    let partial = open(&d.prove_index_range(20, 29).unwrap());
    assert_eq!(partial.root(), d.root());

    let entries = partial.entries(20, 29).unwrap();
    let expected: Vec<(u64, Vec<u8>)> = (20..30)
        .map(|i| (i, format!("e{}", i).into_bytes()))
        .collect();
    assert_eq!(entries, expected);

    let err = partial.entries(0, 99).unwrap_err();
    assert_eq!(cause(&err), Some(VerifyError::IncompleteTree));
    assert_eq!(d.entries(95, 1000).unwrap().len(), 5);

    // two disjoint ranges merge into one partial dictionary.
    let mut merged = partial.clone();
    merged.merge_proof(&d.prove_index_range(60, 69).unwrap()).unwrap();
    assert_eq!(merged.entries(60, 69).unwrap().len(), 10);
    assert_eq!(merged.entries(20, 29).unwrap(), expected);
}

#[test]
fn depth_limited_range_proofs_carry_witnesses() {
    init_logging();
    let d = numbered(64);

    let proof = d.prove_range(&[0; 32], &[0xFF; 32], Some(0)).unwrap();
    assert_eq!(proof[1], tag::WITNESS);
    let verified = verify(&proof, &Query::new().expect_root(d.root())).unwrap();
    assert_eq!(verified.root, d.root());

    let err = verify(&proof, &Query::new().include("1")).unwrap_err();
    assert_eq!(cause(&err), Some(VerifyError::IncompleteTree));

    let shallow = d.prove_range(&[0; 32], &[0xFF; 32], Some(3)).unwrap();
    let mut partial = open(&shallow);
    assert_eq!(partial.root(), d.root());

    // witnesses fill in once the keys below them are proven.
    partial.merge_proof(&d.prove_keys(&keys(0..64)).unwrap()).unwrap();
    for i in 0..64 {
        let key = i.to_string();
        assert_eq!(partial.get(key.as_bytes()).unwrap(), d.get(key.as_bytes()).unwrap());
    }
}

#[test]
fn range_proofs_over_hex() {
    let mut options = Options::new();
    options.transport(Transport::Hex);
    let mut d: Dict = Dictionary::new(options.clone());
    for i in 0..10u64 {
        d.push(format!("{}", i).as_bytes()).unwrap();
    }

    let proof = d.prove_index_range(3, 5).unwrap();
    assert!(proof.iter().all(|b| b.is_ascii_hexdigit()));

    let verifier = Verifier::<Keccak256Hasher>::new(options);
    let verified = verifier
        .verify(&proof, &Query::new().include_index(4))
        .unwrap();
    assert_eq!(verified.values, vec![Some(b"4".to_vec())]);

    // the right edge lies outside of the range.
    let err = verifier
        .verify(&proof, &Query::new().include_index(4).push("10"))
        .unwrap_err();
    assert_eq!(cause(&err), Some(VerifyError::IncompleteTree));
}
