use digest::Digest;

use crate::StrongDigest;

/// Streaming SHA-1 hasher.
#[derive(Clone, Debug)]
pub struct Sha1 {
    inner: sha1::Sha1,
}

impl Default for Sha1 {
    fn default() -> Self {
        Self::new()
    }
}

impl StrongDigest for Sha1 {
    type Digest = [u8; 20];
    const NAME: &'static str = "sha1";

    fn new() -> Self {
        Self {
            inner: sha1::Sha1::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finalize(self) -> Self::Digest {
        self.inner.finalize().into()
    }
}
