#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-checksums` exposes streaming strong-checksum primitives for the
//! sealing pipeline. Every sealed file gets both a SHA-1 and an MD5 digest
//! (§3 of the design: the digest map always carries both), so the gather
//! stage can fan written bytes into two independent hashers through one
//! [`StrongDigest`]-bounded interface.
//!
//! # Design
//!
//! [`Sha1`] and [`Md5`] wrap the `sha1`/`md-5` RustCrypto crates behind a
//! shared streaming trait, mirroring how upstream hashing wrappers in this
//! workspace's lineage abstract over the negotiated algorithm rather than
//! hard-coding one hasher everywhere a digest is needed.

mod md5;
mod sha1;

pub use md5::Md5;
pub use sha1::Sha1;

/// Trait implemented by the strong checksum algorithms the pipeline uses.
///
/// Callers feed data incrementally via [`Self::update`] and obtain the final
/// digest through [`Self::finalize`].
pub trait StrongDigest: Sized {
    /// Type returned when finalising the digest.
    type Digest: AsRef<[u8]> + Copy;

    /// Stable name used as the key in a file's digest map.
    const NAME: &'static str;

    /// Creates a hasher with an empty state.
    fn new() -> Self;

    /// Feeds additional bytes into the digest state.
    fn update(&mut self, data: &[u8]);

    /// Finalises the digest and returns the resulting hash.
    fn finalize(self) -> Self::Digest;
}
