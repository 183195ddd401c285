//! Session model and wire types for the authentication endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// Last-known device position attached to the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// The process-wide credential record.
///
/// A session is either fully populated after login or fully cleared. The
/// refresh protocol replaces the access token in place and keeps the refresh
/// token unless the server issues a new one.
///
/// Token values never appear in `Debug` output.
#[derive(Clone, Default, PartialEq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub email: Option<String>,
    pub location: Option<Location>,
}

impl Session {
    /// A session populated from a successful login response.
    ///
    /// `fallback_email` is used when the backend omits the email field.
    pub fn from_login(response: LoginResponse, fallback_email: &str) -> Self {
        Self {
            access_token: Some(response.access_token),
            refresh_token: response.refresh_token,
            email: response.email.or_else(|| Some(fallback_email.to_string())),
            location: None,
        }
    }

    /// Access token, treating an empty string as absent.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Refresh token, treating an empty string as absent.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Email, treating a blank string as absent.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.trim().is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token().is_none()
            && self.refresh_token().is_none()
            && self.email().is_none()
            && self.location.is_none()
    }

    /// Apply a refresh-endpoint result.
    ///
    /// Email and location are untouched. Returns whether the refresh token
    /// was rotated.
    pub fn apply_refresh(&mut self, response: RefreshResponse) -> bool {
        self.access_token = Some(response.access_token);
        match response.refresh_token.filter(|t| !t.is_empty()) {
            Some(new_refresh) => {
                let rotated = self.refresh_token() != Some(new_refresh.as_str());
                self.refresh_token = Some(new_refresh);
                rotated
            }
            None => false,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token().map(|_| "[REDACTED]"))
            .field("email", &self.email)
            .field("location", &self.location)
            .finish()
    }
}

/// Persisted shape of a [`Session`].
///
/// Flat record keyed by a single storage key, holding exactly the session
/// fields. Unknown fields are ignored so older records still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
}

impl From<&Session> for StoredSession {
    fn from(session: &Session) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            email: session.email.clone(),
            longitude: session.location.map(|l| l.longitude),
            latitude: session.location.map(|l| l.latitude),
        }
    }
}

impl From<StoredSession> for Session {
    fn from(stored: StoredSession) -> Self {
        let location = match (stored.latitude, stored.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location::new(latitude, longitude)),
            _ => None,
        };

        Self {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            email: stored.email,
            location,
        }
    }
}

/// Email and password for login and account creation.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Reject blank fields before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(AuthError::InvalidCredentials(
                "email is required".to_string(),
            ));
        }
        if self.password.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "password is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of a successful `POST /login`.
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of a successful `POST /refresh`.
#[derive(Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
