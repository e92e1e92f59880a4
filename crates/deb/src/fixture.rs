//! In-memory `.deb` builders for tests.
//!
//! Panics on any failure; never use outside of tests.

use jewel_compress::Compression;
use std::io::Read;

const AR_MAGIC: &[u8] = b"!<arch>\n";

/// Builds a conforming `.deb` whose control archive holds `control` only.
pub fn deb(control: &str, compression: Compression) -> Vec<u8> {
    let control_tar = control_tar(&[("./control", control.as_bytes())], compression);
    let data_tar = control_tar_bytes(&[("./usr/share/doc/fixture/copyright", &b"public domain\n"[..])]);
    let data_tar = Compression::Gzip.compress(&data_tar).expect("compress data.tar");
    let control_name = format!("control.tar{}", compression.extension());
    ar(&[
        ("debian-binary", &b"2.0\n"[..]),
        (control_name.as_str(), control_tar.as_slice()),
        ("data.tar.gz", data_tar.as_slice()),
    ])
}

/// Builds a (compressed) control tarball from `(path, content)` pairs.
pub fn control_tar(members: &[(&str, &[u8])], compression: Compression) -> Vec<u8> {
    compression.compress(&control_tar_bytes(members)).expect("compress control.tar")
}

fn control_tar_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).expect("append tar member");
    }
    builder.into_inner().expect("finish tar")
}

/// Builds a BSD/SysV-compatible `ar` archive from `(name, content)` pairs.
pub fn ar(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = AR_MAGIC.to_vec();
    for (name, content) in members {
        let header = format!("{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n", name, 0, 0, 0, "100644", content.len());
        assert_eq!(header.len(), 60, "ar header for {name}");
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(content);
        if content.len() % 2 == 1 {
            out.push(b'\n');
        }
    }
    out
}

/// Reads the control file the slow way: walks every `ar` header of a full
/// download instead of relying on fixed offsets.
pub fn control_from_full_deb(deb: &[u8]) -> String {
    assert!(deb.starts_with(AR_MAGIC), "not an ar archive");
    let mut offset = AR_MAGIC.len();
    while offset + 60 <= deb.len() {
        let header = &deb[offset..offset + 60];
        let name = std::str::from_utf8(&header[..16]).expect("ar name").trim_end();
        let size: usize = std::str::from_utf8(&header[48..58]).expect("ar size").trim().parse().expect("ar size");
        let data = &deb[offset + 60..offset + 60 + size];
        if name.starts_with("control.tar") {
            let decoded = Compression::from_magic_bytes(data).decompress(data).expect("decompress control.tar");
            let mut archive = tar::Archive::new(decoded.as_slice());
            for entry in archive.entries().expect("tar entries") {
                let mut entry = entry.expect("tar entry");
                if entry.path().expect("tar path").ends_with("control") {
                    let mut text = String::new();
                    entry.read_to_string(&mut text).expect("read control");
                    return text;
                }
            }
            panic!("control.tar has no control file");
        }
        offset += 60 + size + size % 2;
    }
    panic!("no control.tar member");
}
