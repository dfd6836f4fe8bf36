use merkv_core::Encoding;

/// How encoded proofs travel between a [`crate::Dictionary`] and a [`crate::Verifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Raw bytes.
    #[default]
    Compact,
    /// Lowercase hex text. An optional `0x` prefix is accepted when reading.
    Hex,
}

/// Options for a [`crate::Dictionary`] or a [`crate::Verifier`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Whether leaves keep their full key next to the key hash.
    pub(crate) track_keys: bool,
    pub(crate) encoding: Encoding,
    pub(crate) transport: Transport,
    /// Proofs longer than this, in transported bytes, are rejected before decoding.
    pub(crate) max_proof_len: usize,
    pub(crate) max_strands: usize,
}

impl Options {
    /// Create a new `Options` instance with the default values.
    pub fn new() -> Self {
        Self {
            track_keys: true,
            encoding: Encoding::HashedKeys,
            transport: Transport::Compact,
            max_proof_len: 16 * 1024 * 1024,
            max_strands: 1 << 16,
        }
    }

    /// Keep the full key of every leaf written through the dictionary.
    ///
    /// Required for producing proofs with [`Encoding::FullKeys`].
    ///
    /// Default: on.
    pub fn track_keys(&mut self, track_keys: bool) {
        self.track_keys = track_keys;
    }

    /// Set how leaf keys are written into proofs.
    ///
    /// Default: [`Encoding::HashedKeys`].
    pub fn proof_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// Default: [`Transport::Compact`].
    pub fn transport(&mut self, transport: Transport) {
        self.transport = transport;
    }

    /// Set the maximum length of a proof accepted by the verifier.
    ///
    /// Must be more than 0.
    ///
    /// Default: 16MiB.
    pub fn max_proof_len(&mut self, max_proof_len: usize) {
        assert!(max_proof_len > 0);
        self.max_proof_len = max_proof_len;
    }

    /// Set the maximum number of strands accepted by the verifier.
    ///
    /// Must be more than 0.
    ///
    /// Default: 65536.
    pub fn max_strands(&mut self, max_strands: usize) {
        assert!(max_strands > 0);
        self.max_strands = max_strands;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
