use digest::Digest;

use crate::StrongDigest;

/// Streaming MD5 hasher.
#[derive(Clone, Debug)]
pub struct Md5 {
    inner: md5::Md5,
}

impl Default for Md5 {
    fn default() -> Self {
        Self::new()
    }
}

impl StrongDigest for Md5 {
    type Digest = [u8; 16];
    const NAME: &'static str = "md5";

    fn new() -> Self {
        Self {
            inner: md5::Md5::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finalize(self) -> Self::Digest {
        self.inner.finalize().into()
    }
}
