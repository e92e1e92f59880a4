use crate::Compression;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Longest magic sequence of any supported format. Callers peeking at a stream
/// need at least this many bytes for a reliable answer.
pub const MAGIC_LEN: usize = XZ_MAGIC.len();

impl Compression {
    /// Detect compression format from magic bytes.
    ///
    /// Returns [`None`](Self::None) if no magic bytes match or the input is too
    /// short to detect any format; a plain tar archive has no magic at offset 0.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&GZIP_MAGIC) {
            return Compression::Gzip;
        }
        if bytes.starts_with(&XZ_MAGIC) {
            return Compression::Xz;
        }
        if bytes.starts_with(&ZSTD_MAGIC) {
            return Compression::Zstd;
        }
        Compression::None
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case(b"./control", Compression::None)]
    #[case(&[], Compression::None)]
    #[case(&[0x1F, 0x8B, 0x08, 0x00], Compression::Gzip)]
    #[case(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00], Compression::Xz)]
    #[case(&[0x28, 0xB5, 0x2F, 0xFD], Compression::Zstd)]
    // Truncated xz magic is not enough to decide.
    #[case(&[0xFD, 0x37, 0x7A], Compression::None)]
    fn test_from_magic_bytes(#[case] bytes: &[u8], #[case] expected: Compression) {
        assert_eq!(Compression::from_magic_bytes(bytes), expected);
    }
}
