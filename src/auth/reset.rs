use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::users::repo_types::PendingReset;

const RAW_TOKEN_BYTES: usize = 32;

/// Freshly minted reset token. `raw` goes to the user by e-mail and is
/// never stored; `pending` is what gets persisted.
pub struct GeneratedResetToken {
    pub raw: String,
    pub pending: PendingReset,
}

impl std::fmt::Debug for GeneratedResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedResetToken")
            .field("raw", &"<redacted>")
            .field("pending", &self.pending)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResetTokens {
    ttl: Duration,
}

impl ResetTokens {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn generate(&self, now: OffsetDateTime) -> GeneratedResetToken {
        let mut bytes = [0u8; RAW_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let token_hash = Self::digest(&raw);
        GeneratedResetToken {
            raw,
            pending: PendingReset {
                token_hash,
                expires_at: now + self.ttl,
            },
        }
    }

    /// SHA-256 hex digest. A fast hash suffices: the raw token carries
    /// 256 bits of entropy.
    pub fn digest(raw: &str) -> String {
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    pub fn verify(
        raw: &str,
        stored_hash: &str,
        stored_expiry: OffsetDateTime,
        now: OffsetDateTime,
    ) -> bool {
        Self::digest(raw) == stored_hash && now < stored_expiry
    }
}
