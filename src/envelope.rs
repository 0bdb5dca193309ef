// Binary layout of an encrypted SecureBox file.
//
// ```text
// [0..16)    AES initialization vector
// [16..272)  symmetric key wrapped with the recipient's RSA-2048 key
// [272..)    AES-CBC ciphertext
// ```

use regex::Regex;
use std::sync::LazyLock;

use crate::{Error, Result};

pub const IV_LEN: usize = 16;
pub const WRAPPED_KEY_LEN: usize = 256;
pub const HEADER_LEN: usize = IV_LEN + WRAPPED_KEY_LEN;

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"filename=(.+)").expect("filename pattern compiles"));

/// Borrowed view over the three parts of an encrypted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub iv: &'a [u8],
    pub wrapped_key: &'a [u8],
    pub ciphertext: &'a [u8],
}

impl<'a> Envelope<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedEnvelope(format!(
                "expected at least {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let (iv, rest) = bytes.split_at(IV_LEN);
        let (wrapped_key, ciphertext) = rest.split_at(WRAPPED_KEY_LEN);
        Ok(Envelope {
            iv,
            wrapped_key,
            ciphertext,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.iv.len() + self.wrapped_key.len() + self.ciphertext.len());
        out.extend_from_slice(self.iv);
        out.extend_from_slice(self.wrapped_key);
        out.extend_from_slice(self.ciphertext);
        out
    }
}

/// Extract the file name from a `Content-Disposition` header value.
///
/// Takes everything after `filename=`, drops double quotes and keeps only the
/// last path component so a download can never escape the files directory.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let raw = FILENAME_RE.captures(header)?.get(1)?.as_str().replace('"', "");
    let name = raw
        .trim()
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_string();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}
