use crate::error::{ErrorKind, Result};
use std::ops::RangeInclusive;

// Layout of a conforming `.deb`:
//
//   0   "!<arch>\n"                       global header, 8 bytes
//   8   debian-binary member header       60 bytes
//   68  "2.0\n"                           4 bytes, even so no padding
//   72  control.tar.* member header       60 bytes, size field at +48 (10 bytes)
//   132 control.tar.* data
const GLOBAL_HEADER_LEN: u64 = 8;
const MEMBER_HEADER_LEN: u64 = 60;
const SIZE_FIELD_OFFSET: u64 = 48;
const SIZE_FIELD_LEN: u64 = 10;
const DEBIAN_BINARY_LEN: u64 = 4;
const CONTROL_HEADER_OFFSET: u64 = GLOBAL_HEADER_LEN + MEMBER_HEADER_LEN + DEBIAN_BINARY_LEN;

/// Inclusive byte window holding the control member's ASCII size field.
pub const CONTROL_SIZE_FIELD: RangeInclusive<u64> =
    CONTROL_HEADER_OFFSET + SIZE_FIELD_OFFSET..=CONTROL_HEADER_OFFSET + SIZE_FIELD_OFFSET + SIZE_FIELD_LEN - 1;

/// Offset of the first byte of the control member's data.
pub const CONTROL_DATA_OFFSET: u64 = CONTROL_HEADER_OFFSET + MEMBER_HEADER_LEN;

/// Parses an `ar` member size field: ASCII decimal, space padded.
///
/// # Examples
///
/// ```
/// assert_eq!(jewel_deb::parse_member_size(b"45        ").unwrap(), 45);
/// assert!(jewel_deb::parse_member_size(b"4x        ").is_err());
/// ```
pub fn parse_member_size(field: &[u8]) -> Result<u64> {
    let invalid = || ErrorKind::MemberSize(String::from_utf8_lossy(field).into_owned());
    let text = std::str::from_utf8(field).map_err(|_| invalid())?.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        exn::bail!(invalid());
    }
    Ok(text.parse::<u64>().map_err(|_| invalid())?)
}

/// Inclusive byte window holding the raw control member, given its size.
pub fn control_member_range(size: u64) -> Result<RangeInclusive<u64>> {
    if size == 0 {
        exn::bail!(ErrorKind::EmptyMember);
    }
    let end = CONTROL_DATA_OFFSET
        .checked_add(size - 1)
        .ok_or_else(|| exn::Exn::from(ErrorKind::MemberSize(size.to_string())))?;
    Ok(CONTROL_DATA_OFFSET..=end)
}
