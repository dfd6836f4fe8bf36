#![no_main]

use libfuzzer_sys::fuzz_target;
use merkv_core::key::{from_integer, to_integer, MAX_INTEGER};

fuzz_target!(|pair: (u64, u64)| {
    let (a, b) = pair;

    let (ka, kb) = match (from_integer(a), from_integer(b)) {
        (Ok(ka), Ok(kb)) => (ka, kb),
        (ka, kb) => {
            assert_eq!(ka.is_err(), a > MAX_INTEGER);
            assert_eq!(kb.is_err(), b > MAX_INTEGER);
            return;
        }
    };

    assert_eq!(to_integer(&ka), Some(a));
    assert_eq!(to_integer(&kb), Some(b));
    // the encoding preserves order, so the largest index is always the rightmost key.
    assert_eq!(a.cmp(&b), ka.cmp(&kb));
});
