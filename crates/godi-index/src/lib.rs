#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-index` encodes and decodes the signed seal file written at the root
//! of every sealed tree (§4.5, §6). The wire format is a gzip-compressed
//! stream of self-describing [`FileInfo`] records followed by a trailing
//! SHA-1 signature over their stable byte serialization.
//!
//! # Design
//!
//! The original encoding relies on its serialization layer to signal
//! end-of-stream via a dynamic type mismatch. This implementation uses an
//! explicit one-byte terminator tag ahead of the trailer instead, so the
//! decoder can stream records through a caller-supplied predicate without
//! knowing the record count up front.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::read::GzDecoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use thiserror::Error;

use godi_core::{Digests, FileInfo, GodiError};

/// Version word written at the start of every index stream.
pub const VERSION: u32 = 1;

const TAG_RECORD: u8 = 0;
const TAG_END: u8 = 1;
const SIGNATURE_LEN: usize = 20;

/// Errors specific to the index codec, convertible into [`GodiError`].
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying I/O failure while reading or writing the stream.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Stream did not carry a supported version word.
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),
    /// Stream ended (or was truncated) before a complete record or trailer.
    #[error("truncated index stream: {0}")]
    Truncated(&'static str),
    /// An unrecognised terminator tag byte was encountered.
    #[error("invalid record tag {0}")]
    InvalidTag(u8),
    /// The trailing signature did not match the decoded content.
    #[error("index signature mismatch")]
    SignatureMismatch,
}

impl From<IndexError> for GodiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::SignatureMismatch => Self::SignatureMismatch,
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Encodes `records` to `writer` as a gzip-compressed, signed index stream.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn encode(records: &[FileInfo], writer: &mut dyn Write) -> Result<(), IndexError> {
    let mut gz = GzEncoder::new(writer, Compression::best());
    let mut signer = Sha1::new();

    gz.write_all(&VERSION.to_le_bytes())?;
    for record in records {
        gz.write_all(&[TAG_RECORD])?;
        write_record(&mut gz, record)?;
        update_signature(&mut signer, record);
    }
    gz.write_all(&[TAG_END])?;

    let signature = signer.finalize();
    gz.write_all(&signature)?;
    gz.finish()?;
    Ok(())
}

/// Decodes an index stream from `reader`, keeping only the records for which
/// `keep` returns `true`, and verifies the trailing signature against every
/// record encountered on the wire (kept or not).
///
/// Decoding stops early, without validating the rest of the file, the first
/// time `keep` returns `false` — matching the streaming-filter contract of
/// §4.5. Call with `|_| true` to decode the whole stream.
///
/// # Errors
///
/// Returns an error if the stream is truncated, carries an unsupported
/// version, or its trailing signature does not match its contents.
pub fn decode_filter(
    reader: &mut dyn Read,
    mut keep: impl FnMut(&FileInfo) -> bool,
) -> Result<Vec<FileInfo>, IndexError> {
    let mut gz = GzDecoder::new(reader);
    let mut signer = Sha1::new();
    let mut kept = Vec::new();

    let mut version_buf = [0u8; 4];
    read_exact_or_truncated(&mut gz, &mut version_buf, "version word")?;
    let version = u32::from_le_bytes(version_buf);
    if version != VERSION {
        return Err(IndexError::UnsupportedVersion(version));
    }

    loop {
        let mut tag = [0u8; 1];
        read_exact_or_truncated(&mut gz, &mut tag, "record tag")?;
        match tag[0] {
            TAG_RECORD => {
                let record = read_record(&mut gz)?;
                update_signature(&mut signer, &record);
                let should_keep = keep(&record);
                if should_keep {
                    kept.push(record);
                } else {
                    return Ok(kept);
                }
            }
            TAG_END => break,
            other => return Err(IndexError::InvalidTag(other)),
        }
    }

    let mut signature = [0u8; SIGNATURE_LEN];
    read_exact_or_truncated(&mut gz, &mut signature, "trailing signature")?;
    if signer.finalize().as_slice() != signature {
        return Err(IndexError::SignatureMismatch);
    }

    Ok(kept)
}

fn read_exact_or_truncated(reader: &mut impl Read, buf: &mut [u8], what: &'static str) -> Result<(), IndexError> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            IndexError::Truncated(what)
        } else {
            IndexError::Io(err)
        }
    })
}

fn write_record(writer: &mut impl Write, record: &FileInfo) -> Result<(), IndexError> {
    write_string(writer, &path_to_string(&record.path))?;
    write_string(writer, &path_to_string(&record.rela_path))?;
    writer.write_all(&record.size.to_le_bytes())?;
    writer.write_all(&mod_time_nanos(record.mod_time).to_le_bytes())?;

    writer.write_all(&(record.digests.len() as u32).to_le_bytes())?;
    for (name, digest) in &record.digests {
        write_string(writer, name)?;
        write_bytes(writer, digest)?;
    }
    Ok(())
}

fn read_record(reader: &mut impl Read) -> Result<FileInfo, IndexError> {
    let path = PathBuf::from(read_string(reader)?);
    let rela_path = PathBuf::from(read_string(reader)?);

    let mut i64_buf = [0u8; 8];
    read_exact_or_truncated(reader, &mut i64_buf, "size")?;
    let size = i64::from_le_bytes(i64_buf);
    read_exact_or_truncated(reader, &mut i64_buf, "mod_time")?;
    let mod_time_nanos = i64::from_le_bytes(i64_buf);

    let mut count_buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut count_buf, "digest count")?;
    let count = u32::from_le_bytes(count_buf);

    let mut digests = Digests::new();
    for _ in 0..count {
        let name = read_string(reader)?;
        let digest = read_bytes(reader)?;
        digests.insert(name, digest);
    }

    let root = root_from_path(&path, &rela_path);

    Ok(FileInfo {
        path,
        root,
        rela_path,
        size,
        mod_time: nanos_to_mod_time(mod_time_nanos),
        digests,
    })
}

/// Recovers `root` from a decoded `path`/`rela_path` pair: `path` always
/// equals `root.join(rela_path)` (§3 invariant), so `root` is `path` with
/// `rela_path`'s components stripped from the end.
fn root_from_path(path: &std::path::Path, rela_path: &std::path::Path) -> PathBuf {
    let depth = rela_path.components().count();
    let mut ancestors = path.ancestors();
    ancestors
        .nth(depth)
        .map(std::path::Path::to_path_buf)
        .unwrap_or_default()
}

fn write_string(writer: &mut impl Write, s: &str) -> io::Result<()> {
    write_bytes(writer, s.as_bytes())
}

fn write_bytes(writer: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)
}

fn read_string(reader: &mut impl Read) -> Result<String, IndexError> {
    let bytes = read_bytes(reader)?;
    String::from_utf8(bytes).map_err(|_| IndexError::Truncated("utf8 string"))
}

fn read_bytes(reader: &mut impl Read) -> Result<Vec<u8>, IndexError> {
    let mut len_buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut len_buf, "length prefix")?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    read_exact_or_truncated(reader, &mut buf, "length-prefixed data")?;
    Ok(buf)
}

fn path_to_string(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

fn mod_time_nanos(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as i64)
}

fn nanos_to_mod_time(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + std::time::Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH
    }
}

fn update_signature(signer: &mut Sha1, record: &FileInfo) {
    signer.update(path_to_string(&record.path).as_bytes());
    signer.update(path_to_string(&record.rela_path).as_bytes());
    signer.update(record.size.to_le_bytes());
    signer.update(mod_time_nanos(record.mod_time).to_le_bytes());
    for (name, digest) in &record.digests {
        signer.update(name.as_bytes());
        signer.update(digest);
    }
}
