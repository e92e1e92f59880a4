use crate::control::ControlMetadata;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use jewel_compress::{Compression, MAGIC_LEN};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::instrument;

/// Name of the metadata file inside `control.tar`.
pub const CONTROL_MEMBER: &str = "control";

/// Streams a raw `control.tar[.gz|.xz|.zst]` member and writes only its
/// `control` file into `into`, returning the written path.
///
/// The codec is detected from the first bytes of the stream, so the caller
/// does not need the member name from the `ar` header. Reading stops as soon
/// as `control` has been found; the rest of the stream is never pulled.
///
/// # Errors
/// - [`ErrorKind::ControlNotFound`] if the archive has no `control` file.
/// - [`ErrorKind::Archive`] if the stream is not a (compressed) tar archive.
/// - [`ErrorKind::Interrupted`] if the underlying reader reports a broken
///   connection.
/// - [`ErrorKind::Io`] if the file cannot be written to `into`.
#[instrument(skip(reader), fields(dir = %into.display(), compression))]
pub fn extract_control<R: Read>(mut reader: R, into: &Path) -> Result<PathBuf> {
    let mut head = Vec::with_capacity(MAGIC_LEN);
    reader.by_ref().take(MAGIC_LEN as u64).read_to_end(&mut head).map_err(archive_error)?;
    let compression = Compression::from_magic_bytes(&head);
    tracing::Span::current().record("compression", compression.as_str());

    let decoder = compression.wrap_reader(Cursor::new(head).chain(reader)).or_raise(|| ErrorKind::Archive)?;
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        if !entry.header().entry_type().is_file() || !is_control_path(&entry.path().map_err(archive_error)?) {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(archive_error)?;
        let target = into.join(CONTROL_MEMBER);
        std::fs::write(&target, &content).or_raise(|| ErrorKind::Io)?;
        tracing::debug!(size = content.len(), "Extracted control file");
        return Ok(target);
    }
    exn::bail!(ErrorKind::ControlNotFound)
}

/// Reads and parses a previously extracted control file.
pub fn read_control(path: &Path) -> Result<ControlMetadata> {
    let bytes = std::fs::read(path).or_raise(|| ErrorKind::Io)?;
    ControlMetadata::parse(&String::from_utf8_lossy(&bytes))
}

/// `control` and `./control` both name the member; anything nested does not.
fn is_control_path(path: &Path) -> bool {
    let mut parts = path.components().filter(|c| !matches!(c, Component::CurDir));
    matches!(parts.next(), Some(Component::Normal(name)) if name == CONTROL_MEMBER) && parts.next().is_none()
}

fn archive_error(err: io::Error) -> exn::Exn<ErrorKind> {
    let kind = match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::TimedOut => ErrorKind::Interrupted,
        _ => ErrorKind::Archive,
    };
    exn::Exn::from(err).raise(kind)
}
