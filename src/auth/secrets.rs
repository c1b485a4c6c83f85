//! Ordered symmetric key material with graceful rotation.
//!
//! The registry holds the active secret first, followed by retired secrets
//! that are still inside their grace period. New credentials and challenge
//! proofs only ever use the active secret; verification of bearer
//! credentials walks the whole list in order.
//!
//! Rotation is a restart: deploy with the new secret as `JWT_SECRET` and the
//! previous one in `JWT_SECRET_OLD`, then drop `JWT_SECRET_OLD` once every
//! credential signed under it has expired (15 minutes).

use std::fmt;

use crate::error::{AppError, AppResult};

/// Opaque symmetric key material.
///
/// `Debug` is redacted so secrets never reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of key bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<{} bytes redacted>)", self.0.len())
    }
}

/// Position of a secret inside the registry (0 = active, >0 = retired).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPosition(pub usize);

impl KeyPosition {
    /// The active secret's position.
    pub const ACTIVE: KeyPosition = KeyPosition(0);

    /// Whether this position refers to a retired secret.
    pub fn is_retired(&self) -> bool {
        self.0 > 0
    }

    /// Label used in logs and metrics (`"active"` or `"retired"`).
    pub fn label(&self) -> &'static str {
        if self.is_retired() { "retired" } else { "active" }
    }
}

impl fmt::Display for KeyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered, immutable, non-empty list of secrets.
#[derive(Debug, Clone)]
pub struct SecretRegistry {
    active: Secret,
    retired: Vec<Secret>,
}

impl SecretRegistry {
    /// Build a registry from an ordered list (active first).
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` when the list is empty, contains an
    /// empty secret, or contains the same secret twice.
    pub fn new(secrets: Vec<Secret>) -> AppResult<Self> {
        for (i, secret) in secrets.iter().enumerate() {
            if secret.is_empty() {
                return Err(AppError::ConfigError(format!(
                    "signing secret at position {i} is empty"
                )));
            }
            if secrets.iter().take(i).any(|earlier| earlier == secret) {
                return Err(AppError::ConfigError(format!(
                    "signing secret at position {i} duplicates an earlier secret"
                )));
            }
        }

        let mut secrets = secrets.into_iter();
        let Some(active) = secrets.next() else {
            return Err(AppError::ConfigError(
                "at least one signing secret is required".to_string(),
            ));
        };

        Ok(Self {
            active,
            retired: secrets.collect(),
        })
    }

    /// Convenience constructor: active secret plus retired secrets in order.
    pub fn with_retired(
        active: impl Into<Secret>,
        retired: impl IntoIterator<Item = Secret>,
    ) -> AppResult<Self> {
        let mut secrets = vec![active.into()];
        secrets.extend(retired);
        Self::new(secrets)
    }

    /// The secret used for all new signatures.
    pub fn active(&self) -> &Secret {
        &self.active
    }

    /// Iterate over all secrets with their positions, active first.
    pub fn iter(&self) -> impl Iterator<Item = (KeyPosition, &Secret)> {
        std::iter::once(&self.active)
            .chain(self.retired.iter())
            .enumerate()
            .map(|(i, s)| (KeyPosition(i), s))
    }

    /// Total number of secrets (active + retired).
    pub fn len(&self) -> usize {
        1 + self.retired.len()
    }

    /// Always false: a registry holds at least the active secret.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of retired secrets still accepted for verification.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_orders_active_first() {
        let registry =
            SecretRegistry::with_retired("new-secret", [Secret::from("old-secret")]).unwrap();

        assert_eq!(registry.active().as_bytes(), b"new-secret");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.retired_count(), 1);

        let positions: Vec<_> = registry.iter().map(|(p, _)| p).collect();
        assert_eq!(positions, vec![KeyPosition(0), KeyPosition(1)]);
    }

    #[test]
    fn test_empty_registry_rejected() {
        let result = SecretRegistry::new(vec![]);
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = SecretRegistry::with_retired("active", [Secret::from("")]);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("position 1 is empty")
        );
    }

    #[test]
    fn test_duplicate_secret_rejected() {
        let result = SecretRegistry::with_retired("same", [Secret::from("same")]);
        assert!(result.unwrap_err().to_string().contains("duplicates"));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::from("super-secret-value");
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("18 bytes"));
    }

    #[test]
    fn test_key_position_labels() {
        assert_eq!(KeyPosition::ACTIVE.label(), "active");
        assert!(!KeyPosition::ACTIVE.is_retired());
        assert_eq!(KeyPosition(2).label(), "retired");
    }
}
