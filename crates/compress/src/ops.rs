//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Write};
use tracing::instrument;
use xz2::{read::XzDecoder, write::XzEncoder};
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

// `Packages.gz` is always written at level 9 to match what APT tooling emits.
const GZIP_LEVEL: u32 = 9;
const XZ_LEVEL: u32 = 9;
const ZSTD_LEVEL: i32 = 19;

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use jewel_compress::Compression;
    ///
    /// let index = b"Package: demo\nVersion: 1.0.0\n\n";
    /// let compressed = Compression::Gzip.compress(index).unwrap();
    /// assert_eq!(Compression::from_magic_bytes(&compressed), Compression::Gzip);
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.compress_into(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a byte slice in memory.
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut reader = self.wrap_reader(input)?;
        reader.read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
        Ok(output)
    }

    #[instrument(skip(input, output), fields(
        format = %self,
        input_size = input.len(),
        output_size
    ))]
    pub fn compress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut *output, GzCompression::new(GZIP_LEVEL));
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
            Compression::Xz => {
                let mut encoder = XzEncoder::new(&mut *output, XZ_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
            Compression::Zstd => {
                let mut encoder = ZstdEncoder::new(&mut *output, ZSTD_LEVEL).or_raise(|| ErrorKind::Encoder)?;
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    /// Wrap a reader with the matching decompression layer.
    ///
    /// This is how archive members are read straight off a network stream
    /// without buffering the whole member first.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Cursor, Read};
    /// use jewel_compress::Compression;
    ///
    /// let compressed = Compression::Xz.compress(b"Architecture: amd64\n").unwrap();
    /// let mut reader = Compression::Xz.wrap_reader(Cursor::new(compressed)).unwrap();
    /// let mut text = String::new();
    /// reader.read_to_string(&mut text).unwrap();
    /// assert_eq!(text, "Architecture: amd64\n");
    /// ```
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Xz => Box::new(XzDecoder::new(reader)),
            Compression::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Encoder)?),
        })
    }
}
