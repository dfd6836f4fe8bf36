#![no_main]

mod common;

use common::Batch;
use libfuzzer_sys::fuzz_target;
use merkv_core::{
    key::hash_key,
    proof::{export, import},
    update::{apply, Update},
    Keccak256Hasher, KeyHash, Tree,
};

type H = Keccak256Hasher;

fn op(key: u8, value: Option<u8>) -> (KeyHash, Update) {
    let update = match value {
        Some(v) => Update::put(vec![v]),
        None => Update::Delete,
    };
    (hash_key::<H>(&[key]), update)
}

fuzz_target!(|batch: Batch| {
    let mut tree = Tree::<H>::new();
    apply(&mut tree, batch.initial.iter().map(|(k, v)| op(*k, Some(*v))).collect()).unwrap();

    let mut batched = tree.clone();
    apply(&mut batched, batch.updates.iter().map(|(k, v)| op(*k, *v)).collect()).unwrap();

    let mut one_by_one = tree.clone();
    for (k, v) in &batch.updates {
        apply(&mut one_by_one, vec![op(*k, *v)]).unwrap();
    }
    assert_eq!(batched.root(), one_by_one.root());

    // the same batch applied through a proof revealing every leaf.
    let mut all: Vec<KeyHash> = batch.initial.iter().map(|(k, _)| hash_key::<H>(&[*k])).collect();
    all.extend(batch.updates.iter().map(|(k, _)| hash_key::<H>(&[*k])));
    if all.is_empty() {
        return;
    }
    let mut partial = import::<H>(&export(&tree, &all).unwrap()).unwrap();
    assert_eq!(partial.root(), tree.root());
    apply(&mut partial, batch.updates.iter().map(|(k, v)| op(*k, *v)).collect()).unwrap();
    assert_eq!(partial.root(), batched.root());
});
