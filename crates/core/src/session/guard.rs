use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::SessionProvider;

/// Navigation target requested by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Path component, e.g. `/cards`.
    pub path: String,
    /// Optional query string without the leading `?`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Location {
    /// Location without a query string.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            Some(query) => write!(f, "{}?{}", self.path, query),
            None => f.write_str(&self.path),
        }
    }
}

/// Redirect instruction carrying the originally requested location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    /// Login destination.
    pub to: String,
    /// Where to send the user once a session exists.
    pub from: Location,
}

/// Outcome of evaluating the gate for a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision<V> {
    /// A session exists; the view is handed back untouched.
    Render(V),
    /// No session; navigate to the login destination instead.
    Redirect(Redirect),
}

impl<V> GuardDecision<V> {
    /// Whether the protected view may render.
    pub fn is_render(&self) -> bool {
        matches!(self, GuardDecision::Render(_))
    }
}

/// Gate that lets protected views render only when a session token is stored.
#[derive(Debug, Clone)]
pub struct SessionGuard<P> {
    provider: P,
    login_path: String,
}

impl<P: SessionProvider> SessionGuard<P> {
    /// Build a guard redirecting to `login_path`.
    pub fn new(provider: P, login_path: impl Into<String>) -> Self {
        Self {
            provider,
            login_path: login_path.into(),
        }
    }

    /// Destination used for redirects.
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Whether a session token is currently present.
    pub fn is_authenticated(&self) -> bool {
        self.provider.token().is_some()
    }

    /// Decide whether `view` may render for a request to `location`.
    pub fn check<V>(&self, view: V, location: &Location) -> GuardDecision<V> {
        if self.is_authenticated() {
            debug!(location = %location, "session present; rendering");
            GuardDecision::Render(view)
        } else {
            debug!(location = %location, to = %self.login_path, "no session; redirecting");
            GuardDecision::Redirect(Redirect {
                to: self.login_path.clone(),
                from: location.clone(),
            })
        }
    }
}
