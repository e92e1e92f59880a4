//! Compression codecs found in Debian repositories.
//!
//! A `.deb` stores its `control.tar` member either uncompressed or wrapped in
//! gzip, xz or zstd, and APT indices are published next to a gzip copy
//! (`Packages.gz`). This crate puts those codecs behind a single
//! [`Compression`] enum:
//!
//! - **Detection** from magic bytes ([`Compression::from_magic_bytes`]).
//! - **In-memory** compression/decompression ([`Compression::compress`],
//!   [`Compression::decompress`]).
//! - **Streaming** decompression via wrapped readers
//!   ([`Compression::wrap_reader`]).
//!
//! Gzip is written at level 9, which is what APT tooling produces for indices.

mod detect;
pub mod error;
mod ops;

pub use crate::detect::MAGIC_LEN;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A compression format that may wrap a Debian archive member or index.
///
/// Defaults to [`None`](Self::None) (plain data).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstd compression (.zst)
    Zstd,
}

impl Compression {
    /// Returns the file extension for this compression format, including the
    /// leading dot (empty for [`None`](Self::None)).
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Xz => ".xz",
            Compression::Zstd => ".zst",
        }
    }

    /// Returns the short name used in configuration and logs.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
        }
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::None);
    }

    #[rstest]
    #[case(Compression::None, "")]
    #[case(Compression::Gzip, ".gz")]
    #[case(Compression::Xz, ".xz")]
    #[case(Compression::Zstd, ".zst")]
    fn test_extension(#[case] format: Compression, #[case] expected: &str) {
        assert_eq!(format.extension(), expected);
    }
}
