use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;

/// Lifetime of a bearer token issued by `/auth/login`.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// A bearer token plus the instant it stops being usable.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

/// On-disk / keyring representation. Kept private so the secret never
/// gains a `Serialize` impl of its own.
#[derive(Serialize, Deserialize)]
struct TokenRecord {
    token: String,
    expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// A token issued at `issued_at`, valid for [`TOKEN_TTL_HOURS`].
    pub fn issued(token: SecretString, issued_at: DateTime<Utc>) -> Self {
        Self {
            token,
            expires_at: issued_at + Duration::hours(TOKEN_TTL_HOURS),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Encode as `{"token": ..., "expires_at": ...}` for secret storage.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(&TokenRecord {
            token: self.token.expose_secret().to_owned(),
            expires_at: self.expires_at,
        })
        .map_err(|e| Error::Credentials(format!("failed to encode token: {e}")))
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let record: TokenRecord = serde_json::from_str(raw)
            .map_err(|e| Error::Credentials(format!("corrupt stored token: {e}")))?;
        Ok(Self {
            token: SecretString::from(record.token),
            expires_at: record.expires_at,
        })
    }
}

/// Where the client keeps its bearer token between calls.
///
/// Implementations must be cheap to call; the REST client consults the
/// store on every request and the stream client on every handshake.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredToken>, Error>;
    fn save(&self, token: &StoredToken) -> Result<(), Error>;
    fn clear(&self) -> Result<(), Error>;
}

/// Process-local store. Used by tests and by `SIAC_TOKEN` overrides.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredToken>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: StoredToken) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredToken>, Error> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| Error::Credentials("credential slot poisoned".into()))?;
        Ok(slot.clone())
    }

    fn save(&self, token: &StoredToken) -> Result<(), Error> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Credentials("credential slot poisoned".into()))?;
        *slot = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Credentials("credential slot poisoned".into()))?;
        *slot = None;
        Ok(())
    }
}

/// The usable bearer token, if any.
///
/// Absent, expired, and unreadable tokens all mean "unauthenticated";
/// a broken store is logged rather than failing the request.
pub fn active_token(store: &dyn CredentialStore) -> Option<SecretString> {
    match store.load() {
        Ok(Some(stored)) if stored.is_expired() => {
            debug!(expires_at = %stored.expires_at, "stored token expired");
            None
        }
        Ok(Some(stored)) => Some(stored.token),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "could not read credential store");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn token_expires_after_ttl() {
        let issued_at = Utc::now();
        let token = StoredToken::issued(SecretString::from("abc"), issued_at);

        assert!(!token.is_expired_at(issued_at + Duration::hours(23)));
        assert!(token.is_expired_at(issued_at + Duration::hours(24)));
    }

    #[test]
    fn json_encoding_keeps_token_and_expiry() {
        let token = StoredToken::issued(SecretString::from("abc"), Utc::now());
        let decoded = StoredToken::from_json(&token.to_json().unwrap()).unwrap();

        assert_eq!(decoded.token.expose_secret(), "abc");
        assert_eq!(decoded.expires_at, token.expires_at);
    }

    #[test]
    fn corrupt_json_is_a_credentials_error() {
        let err = StoredToken::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Credentials(_)));
    }

    #[test]
    fn active_token_ignores_expired_entries() {
        let store = MemoryCredentialStore::new();
        assert!(active_token(&store).is_none());

        let stale = StoredToken::issued(SecretString::from("old"), Utc::now() - Duration::hours(25));
        store.save(&stale).unwrap();
        assert!(active_token(&store).is_none());

        let fresh = StoredToken::issued(SecretString::from("new"), Utc::now());
        store.save(&fresh).unwrap();
        assert_eq!(active_token(&store).unwrap().expose_secret(), "new");

        store.clear().unwrap();
        assert!(active_token(&store).is_none());
    }
}
