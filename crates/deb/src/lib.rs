//! Debian binary package (`.deb`) metadata parsing.
//!
//! A `.deb` is an `ar` archive with three members, always in this order:
//! `debian-binary`, `control.tar[.gz|.xz|.zst]` and `data.tar[...]`. Because
//! the first member has a fixed size, the header of the control member sits at
//! a fixed offset, which lets callers read just the metadata from a remote
//! package with two small range requests:
//!
//! 1. bytes [`CONTROL_SIZE_FIELD`] hold the control member size as ASCII
//!    decimal ([`parse_member_size`]),
//! 2. [`control_member_range`] then covers the raw `control.tar` bytes, which
//!    [`extract_control`] unpacks and [`ControlMetadata::parse`] reads.

mod ar;
mod control;
pub mod error;
mod extract;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;

pub use crate::ar::{CONTROL_DATA_OFFSET, CONTROL_SIZE_FIELD, control_member_range, parse_member_size};
pub use crate::control::ControlMetadata;
pub use crate::extract::{CONTROL_MEMBER, extract_control, read_control};
