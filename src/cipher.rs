// Signing and hybrid encryption.
//
// `Cipher` is the capability the file workflows depend on. `OpensslCipher`
// implements it with RSA-2048 and AES-256-CBC:
//
// - signed message: `signature || payload`, RSA PKCS#1 v1.5 over SHA-256
// - encrypted message: `iv || rsa_oaep(aes_key) || aes_cbc(message)`, see
//   [`crate::envelope`]

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rand::rand_bytes;
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{Signer, Verifier};
use openssl::symm;
use std::path::Path;
use tracing::debug;

use crate::envelope::{Envelope, IV_LEN, WRAPPED_KEY_LEN};
use crate::{Error, Result};

/// Length of the AES-256 session key.
pub const SESSION_KEY_LEN: usize = 32;

pub trait Cipher {
    /// Prepend a signature made with the local private key.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Encrypt `data` so only `recipient_id` can read it.
    fn encrypt(&self, data: &[u8], recipient_id: &str) -> Result<Vec<u8>>;

    /// Unwrap a session key addressed to the local private key.
    fn decrypt_symmetric_key(&self, wrapped: &[u8]) -> Result<Vec<u8>>;

    fn decrypt_message(&self, ciphertext: &[u8], iv: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    /// Check the signature of `sender_id` and return the payload without it.
    fn verify_signature(&self, signed: &[u8], sender_id: &str) -> Result<Vec<u8>>;
}

/// Resolves a SecureBox user id to that user's PEM-encoded public key.
pub trait KeyDirectory {
    fn public_key(&self, user_id: &str) -> Result<String>;
}

impl<T: KeyDirectory + ?Sized> KeyDirectory for &T {
    fn public_key(&self, user_id: &str) -> Result<String> {
        (**self).public_key(user_id)
    }
}

pub struct OpensslCipher<K> {
    key: PKey<Private>,
    directory: K,
}

impl<K: KeyDirectory> OpensslCipher<K> {
    pub fn new(key: PKey<Private>, directory: K) -> Self {
        OpensslCipher { key, directory }
    }

    pub fn from_pem(pem: &[u8], directory: K) -> Result<Self> {
        Ok(Self::new(PKey::private_key_from_pem(pem)?, directory))
    }

    /// Load the private key PEM from disk.
    pub fn from_key_file(path: &Path, directory: K) -> Result<Self> {
        let pem = std::fs::read(path)
            .map_err(|e| Error::io(format!("reading private key {}", path.display()), e))?;
        Self::from_pem(&pem, directory)
    }

    fn public_key_of(&self, user_id: &str) -> Result<PKey<Public>> {
        let pem = self.directory.public_key(user_id)?;
        let rsa = Rsa::public_key_from_pem(pem.as_bytes())
            .or_else(|_| Rsa::public_key_from_pem_pkcs1(pem.as_bytes()))
            .map_err(|_| Error::UnsupportedKey(format!("public key of {user_id} is not RSA PEM")))?;
        Ok(PKey::from_rsa(rsa)?)
    }
}

impl<K: KeyDirectory> Cipher for OpensslCipher<K> {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.set_rsa_padding(Padding::PKCS1)?;
        signer.update(data)?;
        let mut out = signer.sign_to_vec()?;
        debug!(signature_len = out.len(), "signed {} bytes", data.len());
        out.extend_from_slice(data);
        Ok(out)
    }

    fn encrypt(&self, data: &[u8], recipient_id: &str) -> Result<Vec<u8>> {
        let rsa = self.public_key_of(recipient_id)?.rsa()?;
        if rsa.size() as usize != WRAPPED_KEY_LEN {
            return Err(Error::UnsupportedKey(format!(
                "public key of {recipient_id} is {} bits, expected {}",
                rsa.size() * 8,
                WRAPPED_KEY_LEN * 8
            )));
        }

        let mut session_key = [0u8; SESSION_KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand_bytes(&mut session_key)?;
        rand_bytes(&mut iv)?;

        let ciphertext = symm::encrypt(symm::Cipher::aes_256_cbc(), &session_key, Some(&iv), data)?;
        let mut wrapped_key = vec![0u8; rsa.size() as usize];
        let n = rsa.public_encrypt(&session_key, &mut wrapped_key, Padding::PKCS1_OAEP)?;
        wrapped_key.truncate(n);

        Ok(Envelope {
            iv: &iv,
            wrapped_key: &wrapped_key,
            ciphertext: &ciphertext,
        }
        .to_bytes())
    }

    fn decrypt_symmetric_key(&self, wrapped: &[u8]) -> Result<Vec<u8>> {
        let rsa = self.key.rsa()?;
        let mut key = vec![0u8; rsa.size() as usize];
        let n = rsa.private_decrypt(wrapped, &mut key, Padding::PKCS1_OAEP)?;
        key.truncate(n);
        Ok(key)
    }

    fn decrypt_message(&self, ciphertext: &[u8], iv: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        if key.len() != SESSION_KEY_LEN || iv.len() != IV_LEN {
            return Err(Error::MalformedEnvelope(format!(
                "session key of {} bytes and iv of {} bytes",
                key.len(),
                iv.len()
            )));
        }
        Ok(symm::decrypt(symm::Cipher::aes_256_cbc(), key, Some(iv), ciphertext)?)
    }

    fn verify_signature(&self, signed: &[u8], sender_id: &str) -> Result<Vec<u8>> {
        let sender = self.public_key_of(sender_id)?;
        let sig_len = sender.size();
        if signed.len() < sig_len {
            return Err(Error::InvalidSignature {
                sender: sender_id.to_string(),
            });
        }
        let (signature, payload) = signed.split_at(sig_len);

        let mut verifier = Verifier::new(MessageDigest::sha256(), &sender)?;
        verifier.set_rsa_padding(Padding::PKCS1)?;
        verifier.update(payload)?;
        // openssl reports a bad signature either as `false` or as an error stack
        if !verifier.verify(signature).unwrap_or(false) {
            return Err(Error::InvalidSignature {
                sender: sender_id.to_string(),
            });
        }
        Ok(payload.to_vec())
    }
}
