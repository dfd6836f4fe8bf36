#![no_main]

use libfuzzer_sys::fuzz_target;
use merkv_core::{
    proof::{decode, encode, export, import, Encoding},
    verify_and_update, Keccak256Hasher, Query,
};

type H = Keccak256Hasher;

fuzz_target!(|data: &[u8]| {
    // arbitrary input must be rejected or accepted, never panic.
    let _ = verify_and_update::<H>(data, &Query::new().include(data).push(data));

    let Ok(proof) = decode::<H>(data) else {
        return;
    };
    let encoding = if data[0] == 1 {
        Encoding::FullKeys
    } else {
        Encoding::HashedKeys
    };
    if let Ok(bytes) = encode(&proof, encoding) {
        assert_eq!(decode::<H>(&bytes).ok(), Some(proof.clone()));
    }

    let Ok(tree) = import::<H>(&proof) else {
        return;
    };
    let key_hashes: Vec<_> = proof.strands.iter().map(|s| s.key_hash).collect();
    if let Ok(again) = export(&tree, &key_hashes) {
        assert_eq!(import::<H>(&again).map(|t| t.root()), Ok(tree.root()));
    }
});
