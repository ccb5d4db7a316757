#![deny(missing_docs)]

//! Hashing utilities shared by the krait crates.
//!
//! Package archives and the files inside them are identified by their MD5 or
//! SHA256 digests. This crate wraps the [RustCrypto/hashes](https://github.com/RustCrypto/hashes)
//! implementations with the small set of helpers the rest of the workspace
//! needs: computing the digest of a file or byte slice, parsing hex digests,
//! and hashing data while it is being written somewhere else.

#[cfg(feature = "serde")]
pub mod serde;

pub use digest;
pub use md5::Md5;
pub use sha2::Sha256;

use digest::{Digest, Output};
use std::io::{Read, Write};
use std::{fs::File, path::Path};

/// A type alias for the output of a SHA256 hash.
pub type Sha256Hash = sha2::digest::Output<Sha256>;

/// A type alias for the output of an MD5 hash.
pub type Md5Hash = md5::digest::Output<Md5>;

/// Compute a hash of the file at the specified location.
pub fn compute_file_digest<D: Digest + Default + Write>(
    path: impl AsRef<Path>,
) -> Result<Output<D>, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = D::default();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Compute a hash of the specified bytes.
pub fn compute_bytes_digest<D: Digest + Default + Write>(bytes: impl AsRef<[u8]>) -> Output<D> {
    let mut hasher = D::default();
    hasher.update(bytes);
    hasher.finalize()
}

/// Parses a hash hex string to a digest. Returns `None` if the string is not
/// a valid hex representation of the digest.
pub fn parse_digest_from_hex<D: Digest>(str: &str) -> Option<Output<D>> {
    let mut hash = <Output<D>>::default();
    match hex::decode_to_slice(str, &mut hash) {
        Ok(_) => Some(hash),
        Err(_) => None,
    }
}

/// A simple object that provides a [`Write`] implementation that also
/// immediately hashes the bytes written to it. Call
/// [`HashingWriter::finalize`] to retrieve both the original `impl Write`
/// object as well as the hash.
pub struct HashingWriter<W, D: Digest> {
    writer: W,
    hasher: D,
}

impl<W, D: Digest + Default> HashingWriter<W, D> {
    /// Constructs a new instance from a writer and a new (empty) hasher.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: Default::default(),
        }
    }
}

impl<W, D: Digest> HashingWriter<W, D> {
    /// Consumes this instance and returns the original writer and the hash of
    /// all bytes written to this instance.
    pub fn finalize(self) -> (W, Output<D>) {
        (self.writer, self.hasher.finalize())
    }
}

impl<W: Write, D: Digest> Write for HashingWriter<W, D> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes = self.writer.write(buf)?;
        self.hasher.update(&buf[..bytes]);
        Ok(bytes)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// The read counterpart of [`HashingWriter`]: forwards reads to the wrapped
/// reader while hashing every byte that passes through.
pub struct HashingReader<R, D: Digest> {
    reader: R,
    hasher: D,
}

impl<R, D: Digest + Default> HashingReader<R, D> {
    /// Constructs a new instance from a reader and a new (empty) hasher.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Default::default(),
        }
    }
}

impl<R, D: Digest> HashingReader<R, D> {
    /// Consumes this instance and returns the original reader and the hash of
    /// all bytes read from this instance.
    pub fn finalize(self) -> (R, Output<D>) {
        (self.reader, self.hasher.finalize())
    }
}

impl<R: Read, D: Digest> Read for HashingReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes = self.reader.read(buf)?;
        self.hasher.update(&buf[..bytes]);
        Ok(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::{compute_bytes_digest, compute_file_digest, parse_digest_from_hex};
    use md5::Md5;
    use sha2::Sha256;
    use std::io::Write;

    #[test]
    fn bytes_digest() {
        let digest = compute_bytes_digest::<Md5>("Hello, world!");
        assert_eq!(format!("{digest:x}"), "6cd3556deb0da54bca060b4c39479839");
    }

    #[test]
    fn file_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Hello, world!").unwrap();
        let digest = compute_file_digest::<Sha256>(file.path()).unwrap();
        assert_eq!(
            format!("{digest:x}"),
            "315f5bdb76d078c43b8ac0064e4a0164612b1fce77c869345bfc94c75894edd3"
        );
    }

    #[test]
    fn hex_roundtrip() {
        let digest = compute_bytes_digest::<Sha256>(b"roundtrip");
        let parsed = parse_digest_from_hex::<Sha256>(&format!("{digest:x}")).unwrap();
        assert_eq!(digest, parsed);
        assert!(parse_digest_from_hex::<Sha256>("not-hex").is_none());
        assert!(parse_digest_from_hex::<Sha256>("abcd").is_none());
    }

    #[test]
    fn hashing_writer() {
        let mut writer = super::HashingWriter::<_, Sha256>::new(Vec::new());
        writer.write_all(b"Hello, world!").unwrap();
        let (buffer, hash) = writer.finalize();
        assert_eq!(buffer, b"Hello, world!");
        assert_eq!(hash, compute_bytes_digest::<Sha256>(b"Hello, world!"));
    }

    #[test]
    fn hashing_reader() {
        let mut reader = super::HashingReader::<_, Sha256>::new(&b"Hello, world!"[..]);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut out).unwrap();
        let (_, hash) = reader.finalize();
        assert_eq!(out, b"Hello, world!");
        assert_eq!(hash, compute_bytes_digest::<Sha256>(b"Hello, world!"));
    }
}
