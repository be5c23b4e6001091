use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

// Argon2id work factor, fixed for every digest this service produces.
const MEMORY_KIB: u32 = 19 * 1024;
const ITERATIONS: u32 = 2;
const PARALLELISM: u32 = 1;
const SALT_LEN: usize = 16;

/// Byte length of generated verification/reset tokens before hex encoding.
pub const TOKEN_LEN: usize = 32;

/// Slow, salted password hashing. Distinct from [`hash_token`]: passwords are
/// low-entropy and need a deliberate work factor; generated tokens are
/// already high-entropy and only need a fast deterministic digest for
/// equality lookup.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut params = ParamsBuilder::new();
        params
            .m_cost(MEMORY_KIB)
            .t_cost(ITERATIONS)
            .p_cost(PARALLELISM);
        let params = params.build().map_err(AuthError::from)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Salted digest; the same plaintext never hashes to the same string
    /// twice.
    pub fn hash_password(&self, plaintext: &str) -> AuthResult<String> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(AuthError::from)?;
        Ok(self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)?
            .to_string())
    }

    /// A mismatch reads `Ok(false)`; anything else wrong with the stored
    /// digest is a fatal hashing error, surfaced to the caller.
    pub fn verify_password(&self, plaintext: &str, digest: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(digest)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }
}

/// Cryptographically random token for verification and reset flows,
/// hex-encoded.
pub fn generate_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Deterministic SHA-256 digest of a token, hex-encoded. Used for storing
/// refresh tokens server-side without retaining the plaintext.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
