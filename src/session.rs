//! Scoped UI session: wait for the app, open the group, release on exit.

use crate::driver::{DriverError, Target, UiDriver, close_on_failure};
use crate::errors::{EnrollError, Result};
use std::time::Duration;

/// A driver that has the target group open.
///
/// Call [`Session::release`] on every exit path. Dropping an unreleased
/// session only logs a warning because closing the backend is async.
pub struct Session<D: UiDriver> {
    driver: D,
    group: String,
    released: bool,
}

impl<D: UiDriver> Session<D> {
    /// Wait up to `login_timeout` for the app to load, then open `group`.
    ///
    /// The driver is closed before returning an error.
    pub async fn open(mut driver: D, group: &str, login_timeout: Duration) -> Result<Self> {
        let entered = enter_group(&mut driver, group, login_timeout).await;
        close_on_failure(&mut driver, entered).await?;
        tracing::info!(group, "group opened");
        Ok(Self {
            driver,
            group: group.to_string(),
            released: false,
        })
    }

    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }

    pub async fn release(mut self) -> std::result::Result<(), DriverError> {
        self.released = true;
        self.driver.close().await
    }
}

impl<D: UiDriver> Drop for Session<D> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(group = %self.group, "session dropped without release");
        }
    }
}

async fn enter_group<D: UiDriver>(driver: &mut D, group: &str, timeout: Duration) -> Result<()> {
    driver
        .wait_for(&Target::AppReady, timeout)
        .await
        .map_err(|e| EnrollError::Session(format!("app did not finish loading: {}", e)))?;

    let title = driver
        .wait_for(&Target::GroupTitle(group.to_string()), timeout)
        .await
        .map_err(|e| EnrollError::Session(format!("group '{}' not found: {}", group, e)))?;

    driver
        .click(&title)
        .await
        .map_err(|e| EnrollError::Session(format!("could not open group '{}': {}", group, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;

    fn driver_with_group(group: &str) -> FakeDriver {
        let mut driver = FakeDriver::with_contacts(Vec::new());
        driver.groups.push(group.to_string());
        driver
    }

    #[tokio::test]
    async fn test_open_and_release() {
        let mut session =
            Session::open(driver_with_group("Family"), "Family", Duration::from_secs(1))
                .await
                .unwrap();
        assert_eq!(session.driver().closed, 0);
        session.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_group_is_session_error() {
        let err = Session::open(driver_with_group("Family"), "Work", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        match err {
            EnrollError::Session(msg) => assert!(msg.contains("Work")),
            other => panic!("Expected Session, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_app_not_ready_is_session_error() {
        let mut driver = driver_with_group("Family");
        driver.app_ready = false;
        let err = Session::open(driver, "Family", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("did not finish loading"));
    }
}
