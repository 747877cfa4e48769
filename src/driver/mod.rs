//! The UI automation surface the enrollment core depends on.
//!
//! The core asks for semantic [`Target`]s ("the search field", "a rendered
//! contact entry") and never sees a selector language. Adapters translate
//! targets into whatever their backend understands; the marker and invite
//! texts live in adapter configuration, not in the state machine.

pub mod chrome;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Delay between polls while waiting for a target to render.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opaque handle to an element in the live UI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Things the core looks for in the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Rendered once the app has finished loading and is logged in.
    AppReady,
    /// The chat list entry for a group, by display name.
    GroupTitle(String),
    /// Text input of the add-participant search.
    SearchField,
    /// Any contact entry rendered in the participant list.
    ContactEntry,
    /// Marker inside an entry saying the contact is already a member.
    AlreadyMemberMarker,
    /// Invite action inside an entry.
    InviteAction,
    /// A contact entry whose checkbox is checked.
    CheckedEntry,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::AppReady => write!(f, "app ready marker"),
            Target::GroupTitle(name) => write!(f, "group '{}'", name),
            Target::SearchField => write!(f, "search field"),
            Target::ContactEntry => write!(f, "contact entry"),
            Target::AlreadyMemberMarker => write!(f, "already-member marker"),
            Target::InviteAction => write!(f, "invite action"),
            Target::CheckedEntry => write!(f, "checked contact entry"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {waited:?} waiting for {target}")]
    Timeout { target: String, waited: Duration },

    #[error("element {0} is no longer attached to the page")]
    Stale(String),

    #[error("driver rejected command: {0}")]
    Protocol(String),

    #[error("driver unreachable: {0}")]
    Transport(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

/// Pass `result` through, closing `driver` first when it is an error.
///
/// For setup steps that run after the backend session exists. A failure to
/// close is logged and the setup error is returned.
pub async fn close_on_failure<D, T, E>(driver: &mut D, result: Result<T, E>) -> Result<T, E>
where
    D: UiDriver + ?Sized,
{
    if result.is_ok() {
        return result;
    }
    if let Err(close_err) = driver.close().await {
        tracing::warn!(error = %close_err, "failed to close driver after setup error");
    }
    result
}

/// Capabilities the enrollment core needs from a UI automation backend.
#[async_trait]
pub trait UiDriver: Send {
    /// All elements currently matching `target`, in document order.
    async fn find_all(&mut self, target: &Target) -> Result<Vec<ElementRef>, DriverError>;

    /// Elements matching `target` inside `parent`.
    async fn find_within(
        &mut self,
        parent: &ElementRef,
        target: &Target,
    ) -> Result<Vec<ElementRef>, DriverError>;

    async fn text(&mut self, element: &ElementRef) -> Result<String, DriverError>;

    async fn click(&mut self, element: &ElementRef) -> Result<(), DriverError>;

    async fn send_text(&mut self, element: &ElementRef, text: &str) -> Result<(), DriverError>;

    /// Remove any text from an input.
    async fn clear(&mut self, element: &ElementRef) -> Result<(), DriverError>;

    async fn is_checked(&mut self, element: &ElementRef) -> Result<bool, DriverError>;

    /// End the backend session. Called exactly once on every exit path.
    async fn close(&mut self) -> Result<(), DriverError>;

    /// First element matching `target`, polling until `timeout` elapses.
    async fn wait_for(
        &mut self,
        target: &Target,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.find_all(target).await?.into_iter().next() {
                return Ok(found);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DriverError::Timeout {
                    target: target.to_string(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
