use merkv::{
    Dictionary, Keccak256Hasher, KeyHash, Node, NodeHasher, Options, Query, ValueHasher,
    Verified, Verifier, EMPTY,
};
use merkv_core::trie::{BranchData, LeafData};
use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

pub type Dict = Dictionary<Keccak256Hasher>;

const ENV_NAME_LOG: &str = "MERKV_LOG";

static LOGGING: Once = Once::new();

/// Route tracing output to the test harness, filtered by `MERKV_LOG`. Silent when unset.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let filter = match std::env::var(ENV_NAME_LOG) {
            Ok(env) => EnvFilter::builder().parse(env).unwrap(),
            Err(_) => return,
        };
        let _ = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .compact()
            .try_init();
    });
}

pub fn dict<K: AsRef<[u8]>, V: AsRef<[u8]>>(pairs: &[(K, V)]) -> Dict {
    let mut d = Dict::new(Options::new());
    d.apply(pairs.iter().map(|(k, v)| {
        (
            merkv::Target::Key(k.as_ref().to_vec()),
            Some(v.as_ref().to_vec()),
        )
    }))
    .unwrap();
    d
}

/// Build a dictionary one key at a time.
#[allow(dead_code)]
pub fn dict_incremental<K: AsRef<[u8]>, V: AsRef<[u8]>>(pairs: &[(K, V)]) -> Dict {
    let mut d = Dict::new(Options::new());
    for (k, v) in pairs {
        d.put(k.as_ref(), v.as_ref()).unwrap();
    }
    d
}

#[allow(dead_code)]
pub fn array<V: AsRef<[u8]>>(values: &[V]) -> Dict {
    let mut d = Dict::new(Options::new());
    for v in values {
        d.push(v.as_ref()).unwrap();
    }
    d
}

/// `count` distinct records with keys and values drawn from a seeded PRNG.
#[allow(dead_code)]
pub fn records(seed: u64, count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    use rand::{Rng as _, SeedableRng as _};
    let mut s = [0; 16];
    s[0..8].copy_from_slice(&seed.to_le_bytes());
    let mut rng = rand_pcg::Lcg64Xsh32::from_seed(s);

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let key_len = rng.gen_range(1..40);
        let key: Vec<u8> = (0..key_len).map(|_| rng.gen()).collect();
        if !seen.insert(key.clone()) {
            continue;
        }
        let value_len = rng.gen_range(0..64);
        let value: Vec<u8> = (0..value_len).map(|_| rng.gen()).collect();
        out.push((key, value));
    }
    out
}

#[allow(dead_code)]
pub fn as_refs(records: &[(Vec<u8>, Vec<u8>)]) -> Vec<(&[u8], &[u8])> {
    records.iter().map(|(k, v)| (&k[..], &v[..])).collect()
}

pub fn verify(proof: &[u8], query: &Query) -> anyhow::Result<Verified> {
    Verifier::<Keccak256Hasher>::new(Options::new()).verify(proof, query)
}

/// The core error behind a facade error.
#[allow(dead_code)]
pub fn cause(err: &anyhow::Error) -> Option<merkv::VerifyError> {
    err.downcast_ref::<merkv::VerifyError>().copied()
}

/// The root of the canonical trie holding `leaves`, computed from scratch: split the sorted key
/// hashes on successive bits, hash single keys as leaves and everything else as branches.
#[allow(dead_code)]
pub fn reference_root<'a>(leaves: impl IntoIterator<Item = (KeyHash, &'a [u8])>) -> Node {
    let mut leaves: Vec<(KeyHash, [u8; 32])> = leaves
        .into_iter()
        .map(|(k, v)| (k, Keccak256Hasher::hash_value(v)))
        .collect();
    leaves.sort();
    reference_node(&leaves, 0)
}

#[allow(dead_code)]
fn reference_node(leaves: &[(KeyHash, [u8; 32])], depth: usize) -> Node {
    match leaves {
        [] => EMPTY,
        [(key_hash, value_hash)] => Keccak256Hasher::hash_leaf(&LeafData {
            key_hash: *key_hash,
            value_hash: *value_hash,
        }),
        _ => {
            let bit = |k: &KeyHash| (k[depth / 8] >> (7 - depth % 8)) & 1 == 1;
            let split = leaves.iter().take_while(|(k, _)| !bit(k)).count();
            Keccak256Hasher::hash_branch(&BranchData {
                left: reference_node(&leaves[..split], depth + 1),
                right: reference_node(&leaves[split..], depth + 1),
            })
        }
    }
}
