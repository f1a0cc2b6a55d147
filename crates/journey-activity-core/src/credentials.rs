//! Inbound signed-token verification.
//!
//! The orchestrator signs lifecycle calls with a shared secret (HMAC). The
//! verifier never fails loudly: it reports what happened and leaves the
//! trust decision to the caller. Lifecycle steps log and proceed; the payload
//! normalizer only reads claims that verified.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, instrument};

/// Why verification was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoToken,
    NoSecret,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoToken => write!(f, "no token supplied"),
            Self::NoSecret => write!(f, "no signing secret configured"),
        }
    }
}

/// Outcome of verifying one token.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Signature and expiry checked; claims can be trusted.
    Verified { claims: Value },

    /// Nothing to check against.
    Skipped { reason: SkipReason },

    /// The token was present but failed verification.
    Rejected { reason: String },
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Verified claims, if any.
    pub fn claims(&self) -> Option<&Value> {
        match self {
            Self::Verified { claims } => Some(claims),
            _ => None,
        }
    }

    pub fn into_claims(self) -> Option<Value> {
        match self {
            Self::Verified { claims } => Some(claims),
            _ => None,
        }
    }
}

/// Verifies HMAC-signed tokens against the shared activity secret.
#[derive(Clone)]
pub struct CredentialVerifier {
    secret: Option<String>,
}

impl CredentialVerifier {
    pub fn new(secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self { secret }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify `token`. Absent token or secret yields [`Verification::Skipped`].
    ///
    /// Expiry is enforced only when the token carries an `exp` claim.
    #[instrument(skip(self, token), fields(token_present = token.is_some()))]
    pub fn verify(&self, token: Option<&str>) -> Verification {
        let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                return Verification::Skipped {
                    reason: SkipReason::NoToken,
                }
            }
        };

        let secret = match &self.secret {
            Some(secret) => secret,
            None => {
                return Verification::Skipped {
                    reason: SkipReason::NoSecret,
                }
            }
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;

        match decode::<Value>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => {
                debug!("Token verified");
                Verification::Verified {
                    claims: data.claims,
                }
            }
            Err(e) => Verification::Rejected {
                reason: e.to_string(),
            },
        }
    }
}

impl fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
