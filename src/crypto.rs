use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};
use crate::key::MasterKey;

pub const IV_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

// Binds the sealed index to its role, a blob sealed under any other context
// will fail to open as an index
pub const INDEX_AAD: &[u8] = b"AIPKG_INDEX_V1";

pub fn gen_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn cipher(key: &MasterKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

// Ciphertext = [encrypted data | tag]
pub fn encrypt(
    plaintext: &[u8],
    key: &MasterKey,
    iv: &[u8; IV_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>> {
    cipher(key)
        .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
        // Only reachable on plaintexts past the GCM length limit
        .map_err(|_| Error::validation("plaintext too large to seal"))
}

// Every failure here collapses into Authentication, the caller must not be
// able to tell a wrong key apart from a damaged blob
pub fn decrypt(sealed: &[u8], key: &MasterKey, iv: &[u8; IV_SIZE], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < TAG_SIZE {
        return Err(Error::Authentication);
    }

    cipher(key)
        .decrypt(Nonce::from_slice(iv), Payload { msg: sealed, aad })
        .map_err(|_| Error::Authentication)
}

#[cfg(test)]
mod test_encrypt_decrypt_roundtrip {
    use super::*;
    use crate::key;
    use std::num::NonZeroU32;

    fn test_key(password: &str) -> MasterKey {
        key::derive(password, &[3u8; key::SALT_SIZE], NonZeroU32::new(10).unwrap()).unwrap()
    }

    #[test]
    fn small_data_roundtrip() {
        let key = test_key("Aviation2025!@Complex");
        let iv = gen_iv();
        let data = b"Hello World!";

        let sealed = encrypt(data, &key, &iv, INDEX_AAD).unwrap();
        assert_eq!(sealed.len(), data.len() + TAG_SIZE);
        assert_ne!(&sealed[..data.len()], data);

        assert_eq!(decrypt(&sealed, &key, &iv, INDEX_AAD).unwrap(), data);
    }

    #[test]
    fn empty_data_roundtrip() {
        let key = test_key("pw");
        let iv = gen_iv();

        let sealed = encrypt(&[], &key, &iv, INDEX_AAD).unwrap();
        assert_eq!(sealed.len(), TAG_SIZE);
        assert!(decrypt(&sealed, &key, &iv, INDEX_AAD).unwrap().is_empty());
    }

    #[test]
    fn wrong_key() {
        let iv = gen_iv();
        let sealed = encrypt(b"index", &test_key("right"), &iv, INDEX_AAD).unwrap();

        assert!(matches!(
            decrypt(&sealed, &test_key("wrong"), &iv, INDEX_AAD),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn wrong_context() {
        let key = test_key("pw");
        let iv = gen_iv();
        let sealed = encrypt(b"index", &key, &iv, b"AIPKG_OTHER_V1").unwrap();

        assert!(matches!(
            decrypt(&sealed, &key, &iv, INDEX_AAD),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn wrong_iv() {
        let key = test_key("pw");
        let sealed = encrypt(b"index", &key, &[1u8; IV_SIZE], INDEX_AAD).unwrap();

        assert!(matches!(
            decrypt(&sealed, &key, &[2u8; IV_SIZE], INDEX_AAD),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn every_flipped_byte_rejected() {
        let key = test_key("pw");
        let iv = gen_iv();
        let sealed = encrypt(b"{\"version\":1,\"files\":[]}", &key, &iv, INDEX_AAD).unwrap();

        for i in 0..sealed.len() {
            let mut damaged = sealed.clone();
            damaged[i] ^= 0x01;
            assert!(matches!(
                decrypt(&damaged, &key, &iv, INDEX_AAD),
                Err(Error::Authentication)
            ));
        }
    }

    #[test]
    fn truncated_blob() {
        let key = test_key("pw");
        let iv = gen_iv();

        assert!(matches!(
            decrypt(&[0u8; TAG_SIZE - 1], &key, &iv, INDEX_AAD),
            Err(Error::Authentication)
        ));
    }
}
