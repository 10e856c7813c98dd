use std::fmt;
use std::num::NonZeroU32;

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub const KEY_SIZE: usize = 32;
pub const SALT_SIZE: usize = 32;
pub const MIN_SALT_SIZE: usize = 16;

pub const DEFAULT_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};

// Upper bound accepted from a package's metadata, a doctored header must not
// be able to pin the verifier for hours
pub const MAX_ITERATIONS: u32 = 10_000_000;

// Scheme:
//  1. salt <- 32 random bytes, stored in the clear in the header
//  2. password + salt -> PBKDF2-HMAC-SHA256 -> master-key
//  3. master-key seals the package index
//
// There is only one shared distribution password per package, the
// master-key never touches disk.
pub struct MasterKey(Zeroizing<[u8; KEY_SIZE]>);

impl MasterKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MasterKey").field(&"****").finish()
    }
}

pub fn gen_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn derive(password: &str, salt: &[u8], iterations: NonZeroU32) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(Error::validation("password must not be empty"));
    }
    if salt.len() < MIN_SALT_SIZE {
        return Err(Error::validation(format!(
            "salt must be at least {} bytes, got {}",
            MIN_SALT_SIZE,
            salt.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations.get(), &mut key[..]);
    Ok(MasterKey(key))
}
