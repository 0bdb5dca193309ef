// File workflows: upload, download, list and delete against a `FileStore`,
// plus the local-only sign/encrypt operations. Everything here is generic
// over the store and the cipher so it runs the same against the real
// `ApiClient` or an in-memory fake.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::api::FileListing;
use crate::cipher::Cipher;
use crate::config::Settings;
use crate::envelope::Envelope;
use crate::{Error, Result};

/// The remote side of SecureBox.
pub trait FileStore {
    /// Upload the file at `path` under `file_name`, returning its id.
    fn upload(&self, path: &Path, file_name: &str) -> Result<String>;
    fn download(&self, file_id: &str) -> Result<Downloaded>;
    fn list(&self) -> Result<FileListing>;
    fn delete(&self, file_id: &str) -> Result<()>;
}

/// Raw result of a download, before decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub file_name: String,
    pub content_length: u64,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub file_id: String,
    /// The signed and encrypted file that was sent.
    pub encrypted: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub file_name: String,
    pub bytes_downloaded: u64,
    pub saved_to: PathBuf,
}

/// Sign `file`, encrypt it for `dest_id` and upload it under its own name.
pub fn upload<S, C>(store: &S, cipher: &C, settings: &Settings, file: &str, dest_id: &str) -> Result<UploadOutcome>
where
    S: FileStore + ?Sized,
    C: Cipher + ?Sized,
{
    let signed = sign(cipher, settings, file)?;
    let encrypted = encrypt(cipher, settings, &signed.to_string_lossy(), dest_id)?;
    let name = file_name(Path::new(file))?;

    info!(file = name, dest_id, "uploading");
    let file_id = store.upload(&encrypted, name)?;
    Ok(UploadOutcome { file_id, encrypted })
}

/// Fetch `file_id`, decrypt it, check the signature of `source_id` and
/// save the payload under the file name the server reports.
pub fn download<S, C>(store: &S, cipher: &C, settings: &Settings, file_id: &str, source_id: &str) -> Result<DownloadOutcome>
where
    S: FileStore + ?Sized,
    C: Cipher + ?Sized,
{
    let downloaded = store.download(file_id)?;
    let env = Envelope::parse(&downloaded.body)?;

    let key = cipher.decrypt_symmetric_key(env.wrapped_key)?;
    let signed = cipher.decrypt_message(env.ciphertext, env.iv, &key)?;
    let payload = cipher.verify_signature(&signed, source_id)?;

    let saved_to = settings.ensure_files_dir()?.join(&downloaded.file_name);
    write(&saved_to, &payload)?;
    info!(file_id, path = %saved_to.display(), "download verified and saved");

    Ok(DownloadOutcome {
        file_name: downloaded.file_name,
        bytes_downloaded: downloaded.content_length,
        saved_to,
    })
}

pub fn list<S: FileStore + ?Sized>(store: &S) -> Result<FileListing> {
    store.list()
}

pub fn delete<S: FileStore + ?Sized>(store: &S, file_id: &str) -> Result<()> {
    store.delete(file_id)
}

/// Sign `file` locally, writing `<signed_prefix><name>` in the files directory.
pub fn sign<C: Cipher + ?Sized>(cipher: &C, settings: &Settings, file: &str) -> Result<PathBuf> {
    let input = resolve_input(settings, file);
    let data = read(&input)?;
    let out = output_path(settings, &settings.signed_prefix, &input)?;
    write(&out, &cipher.sign(&data)?)?;
    Ok(out)
}

/// Encrypt `file` for `dest_id`, writing `<enc_prefix><name>` in the files directory.
pub fn encrypt<C: Cipher + ?Sized>(cipher: &C, settings: &Settings, file: &str, dest_id: &str) -> Result<PathBuf> {
    let input = resolve_input(settings, file);
    let data = read(&input)?;
    let out = output_path(settings, &settings.enc_prefix, &input)?;
    write(&out, &cipher.encrypt(&data, dest_id)?)?;
    Ok(out)
}

/// Sign, then encrypt the signed file. Returns the encrypted file.
pub fn enc_sign<C: Cipher + ?Sized>(cipher: &C, settings: &Settings, file: &str, dest_id: &str) -> Result<PathBuf> {
    let signed = sign(cipher, settings, file)?;
    encrypt(cipher, settings, &signed.to_string_lossy(), dest_id)
}

/// Paths that exist as given (or are absolute) are used directly; anything
/// else is looked up in the files directory.
pub fn resolve_input(settings: &Settings, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() || path.exists() {
        path.to_path_buf()
    } else {
        settings.files_dir.join(path)
    }
}

fn output_path(settings: &Settings, prefix: &str, input: &Path) -> Result<PathBuf> {
    let name = file_name(input)?;
    Ok(settings.ensure_files_dir()?.join(format!("{prefix}{name}")))
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::io(
                format!("{} has no usable file name", path.display()),
                std::io::ErrorKind::InvalidInput.into(),
            )
        })
}

fn read(path: &Path) -> Result<Vec<u8>> {
    debug!(path = %path.display(), "reading");
    std::fs::read(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))
}

fn write(path: &Path, data: &[u8]) -> Result<()> {
    debug!(path = %path.display(), bytes = data.len(), "writing");
    std::fs::write(path, data).map_err(|e| Error::io(format!("writing {}", path.display()), e))
}
