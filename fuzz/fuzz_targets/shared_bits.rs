#![no_main]

mod common;

use common::KeyPair;
use libfuzzer_sys::fuzz_target;
use merkv_core::key;

fuzz_target!(|pair: KeyPair| {
    let KeyPair { shared, a, b } = pair;

    assert_eq!(shared, key::shared_bits(&a, &b));
    assert_eq!(key::prefix(&a, shared), key::prefix(&b, shared));
    assert_eq!(
        key::keep_prefix_bits(&a, shared),
        key::keep_prefix_bits(&b, shared)
    );
});
