//! Helpers for constructing small package archives in tests.

use std::io::Write;

/// Builds a `.tar.bz2` archive in memory from (path, contents) pairs.
pub(crate) fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tarball = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tarball.append_data(&mut header, path, *contents).unwrap();
    }
    let data = tarball.into_inner().unwrap();

    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(&data).unwrap();
    encoder.finish().unwrap()
}
