//! Deterministic in-process toolchain for testing.

use crate::SigningToolchain;
use crate::error::{ErrorKind, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const FAKE_PUBLIC_KEY: &[u8] = b"-----BEGIN PGP PUBLIC KEY BLOCK-----\nfake\n-----END PGP PUBLIC KEY BLOCK-----\n";

/// A toolchain whose output depends only on its input.
///
/// The digest lists each file with its size; signatures embed the signed
/// length. Every call is recorded in order.
#[derive(Default)]
pub struct FakeToolchain {
    calls: Mutex<Vec<&'static str>>,
    clear_signs: AtomicUsize,
    fail_clear_sign_after: Option<usize>,
}
impl FakeToolchain {
    /// Let the first `n` clear-sign calls succeed and fail every later one.
    pub fn failing_clear_sign_after(n: usize) -> Self {
        Self { fail_clear_sign_after: Some(n), ..Self::default() }
    }

    /// Operations invoked so far, in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, call: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl SigningToolchain for FakeToolchain {
    fn digest(&self, files: &[(PathBuf, Vec<u8>)]) -> Result<Vec<u8>> {
        self.record("digest");
        let mut sorted: Vec<_> = files.iter().map(|(path, contents)| (path.display().to_string(), contents.len())).collect();
        sorted.sort();
        let mut block = String::from("Files:\n");
        for (path, size) in sorted {
            block.push_str(&format!(" {size:>16} {path}\n"));
        }
        Ok(block.into_bytes())
    }

    fn detach_sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.record("detach_sign");
        Ok(signature(data))
    }

    fn clear_sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.record("clear_sign");
        let seen = self.clear_signs.fetch_add(1, Ordering::SeqCst);
        if self.fail_clear_sign_after.is_some_and(|limit| seen >= limit) {
            exn::bail!(ErrorKind::ToolFailed { tool: "gpg", code: Some(2) });
        }
        let mut signed = b"-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA512\n\n".to_vec();
        signed.extend_from_slice(data);
        signed.extend_from_slice(&signature(data));
        Ok(signed)
    }

    fn export_public_key(&self) -> Result<Vec<u8>> {
        self.record("export_public_key");
        Ok(FAKE_PUBLIC_KEY.to_vec())
    }
}

fn signature(data: &[u8]) -> Vec<u8> {
    format!("-----BEGIN PGP SIGNATURE-----\nfake {}\n-----END PGP SIGNATURE-----\n", data.len()).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_order_independent() {
        let toolchain = FakeToolchain::default();
        let a = (PathBuf::from("binary-amd64/Packages"), b"abc".to_vec());
        let b = (PathBuf::from("binary-amd64/Packages.gz"), b"de".to_vec());
        let forward = toolchain.digest(&[a.clone(), b.clone()]).unwrap();
        let backward = toolchain.digest(&[b, a]).unwrap();
        assert_eq!(forward, backward);
        assert!(String::from_utf8(forward).unwrap().ends_with("2 binary-amd64/Packages.gz\n"));
    }

    #[test]
    fn test_failing_clear_sign_after() {
        let toolchain = FakeToolchain::failing_clear_sign_after(1);
        assert!(toolchain.clear_sign(b"first").is_ok());
        let err = toolchain.clear_sign(b"second").unwrap_err();
        assert!(matches!(&*err, ErrorKind::ToolFailed { .. }));
        assert_eq!(toolchain.calls(), ["clear_sign", "clear_sign"]);
    }
}
