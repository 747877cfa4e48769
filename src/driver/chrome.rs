//! [`UiDriver`] over the Chrome DevTools Protocol, via `chromiumoxide`.
//!
//! Either launches a Chrome with its own profile or attaches to one already
//! running with remote debugging. Targets are resolved to XPath expressions
//! taken from the `[selectors]` and `[markers]` sections of the
//! configuration.

use super::{DriverError, ElementRef, Target, UiDriver, close_on_failure};
use crate::config::{DriverSection, MarkersSection, SelectorsSection};
use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::task::JoinHandle;

/// Attribute used to scope lookups inside a previously found element.
const SCOPE_ATTR: &str = "data-enroll-scope";

/// Chrome answers a search with no hits with this error instead of an
/// empty list.
const EMPTY_SEARCH: &str = "Invalid search result range";

/// Node lookups on a detached element fail with one of these.
const DETACHED: [&str; 3] = [
    "No node with given id",
    "Could not find node with given id",
    "Cannot find context with specified id",
];

const SELECT_CONTENTS: &str = "function() {
    this.focus();
    const range = document.createRange();
    range.selectNodeContents(this);
    const selection = window.getSelection();
    selection.removeAllRanges();
    selection.addRange(range);
}";

// Entries are list rows, so the checkbox is a descendant.
const ENTRY_CHECKED: &str = "function() {
    const box = this.querySelector('input[type=\"checkbox\"], [role=\"checkbox\"]');
    if (!box) { return false; }
    return box.checked === true || box.getAttribute('aria-checked') === 'true';
}";

/// Quote `text` as an XPath string literal.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Maps semantic targets to XPath.
#[derive(Debug, Clone)]
pub struct TargetMap {
    selectors: SelectorsSection,
    markers: MarkersSection,
}

impl TargetMap {
    pub fn new(selectors: SelectorsSection, markers: MarkersSection) -> Self {
        Self { selectors, markers }
    }

    pub fn xpath(&self, target: &Target) -> String {
        match target {
            Target::AppReady => self.selectors.app_ready.clone(),
            Target::GroupTitle(name) => self
                .selectors
                .group_title
                .replace("{name}", &xpath_literal(name)),
            Target::SearchField => self.selectors.search_field.clone(),
            Target::ContactEntry => self.selectors.contact_entry.clone(),
            Target::AlreadyMemberMarker => format!(
                "//div[contains(text(), {})]",
                xpath_literal(&self.markers.already_in_group)
            ),
            Target::InviteAction => format!(
                "//div[contains(text(), {})]",
                xpath_literal(&self.markers.invite)
            ),
            Target::CheckedEntry => self.selectors.checked_entry.clone(),
        }
    }

    /// XPath for `target` among the descendants of the element tagged `scope`.
    pub fn within(&self, scope: &str, target: &Target) -> String {
        let xpath = self.xpath(target);
        let descendant = xpath.trim_start_matches('.').trim_start_matches('/');
        format!(
            "//*[@{}={}]//{}",
            SCOPE_ATTR,
            xpath_literal(scope),
            descendant
        )
    }
}

fn is_empty_search(message: &str) -> bool {
    message.contains(EMPTY_SEARCH)
}

fn is_detached(message: &str) -> bool {
    DETACHED.iter().any(|m| message.contains(m))
}

fn cdp_error(err: CdpError) -> DriverError {
    match err {
        CdpError::Ws(e) => DriverError::Transport(e.to_string()),
        CdpError::Io(e) => DriverError::Transport(e.to_string()),
        CdpError::NoResponse => DriverError::Transport("browser did not respond".to_string()),
        other => {
            let message = other.to_string();
            if is_detached(&message) {
                DriverError::Stale(message)
            } else {
                DriverError::Protocol(message)
            }
        }
    }
}

fn browser_config(driver: &DriverSection) -> Result<BrowserConfig, DriverError> {
    let mut builder = BrowserConfig::builder().viewport(None);
    if !driver.headless {
        builder = builder.with_head();
    }
    if let Some(profile) = &driver.profile_dir {
        builder = builder.user_data_dir(profile);
    }
    if let Some(executable) = &driver.chrome_executable {
        builder = builder.chrome_executable(executable);
    }
    builder
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .build()
        .map_err(DriverError::Protocol)
}

pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Whether the browser process belongs to this session.
    launched: bool,
    page: Option<Page>,
    elements: HashMap<String, Element>,
    targets: TargetMap,
    closed: bool,
}

impl ChromeSession {
    /// Start (or attach to) a browser and open the app in a new tab.
    ///
    /// The browser is closed before a failed navigation is reported.
    pub async fn connect(
        driver: &DriverSection,
        selectors: SelectorsSection,
        markers: MarkersSection,
    ) -> Result<Self, DriverError> {
        let (browser, mut handler, launched) = match &driver.debugging_url {
            Some(url) => {
                let (browser, handler) =
                    Browser::connect(url.clone()).await.map_err(cdp_error)?;
                tracing::debug!(%url, "attached to running browser");
                (browser, handler, false)
            }
            None => {
                let (browser, handler) = Browser::launch(browser_config(driver)?)
                    .await
                    .map_err(cdp_error)?;
                tracing::debug!("browser launched");
                (browser, handler, true)
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser event error");
                }
            }
        });

        let mut session = Self {
            browser,
            handler,
            launched,
            page: None,
            elements: HashMap::new(),
            targets: TargetMap::new(selectors, markers),
            closed: false,
        };
        let opened = session.open_app(&driver.app_url).await;
        close_on_failure(&mut session, opened).await?;
        Ok(session)
    }

    async fn open_app(&mut self, url: &str) -> Result<(), DriverError> {
        let page = self.browser.new_page(url).await.map_err(cdp_error)?;
        tracing::debug!(%url, "app opened");
        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page, DriverError> {
        self.page
            .as_ref()
            .ok_or_else(|| DriverError::Protocol("no page is open".to_string()))
    }

    fn element(&self, element: &ElementRef) -> Result<&Element, DriverError> {
        self.elements
            .get(element.id())
            .ok_or_else(|| DriverError::Stale(element.id().to_string()))
    }

    /// Run an XPath search and register the hits.
    async fn search(&mut self, xpath: String) -> Result<Vec<ElementRef>, DriverError> {
        let found = match self.page()?.find_xpaths(xpath).await {
            Ok(found) => found,
            Err(e) if is_empty_search(&e.to_string()) => Vec::new(),
            Err(e) => return Err(cdp_error(e)),
        };
        Ok(found
            .into_iter()
            .map(|element| {
                let id = element.backend_node_id.inner().to_string();
                self.elements.insert(id.clone(), element);
                ElementRef::new(id)
            })
            .collect())
    }

    async fn call(
        &self,
        element: &ElementRef,
        function: &str,
    ) -> Result<Option<serde_json::Value>, DriverError> {
        let returns = self
            .element(element)?
            .call_js_fn(function, false)
            .await
            .map_err(cdp_error)?;
        if let Some(exception) = returns.exception_details {
            return Err(DriverError::Protocol(exception.text));
        }
        Ok(returns.result.value)
    }
}

#[async_trait]
impl UiDriver for ChromeSession {
    async fn find_all(&mut self, target: &Target) -> Result<Vec<ElementRef>, DriverError> {
        let xpath = self.targets.xpath(target);
        self.search(xpath).await
    }

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        target: &Target,
    ) -> Result<Vec<ElementRef>, DriverError> {
        let tag = format!(
            "function() {{ this.setAttribute('{}', '{}'); }}",
            SCOPE_ATTR,
            parent.id()
        );
        self.call(parent, &tag).await?;
        let xpath = self.targets.within(parent.id(), target);
        self.search(xpath).await
    }

    async fn text(&mut self, element: &ElementRef) -> Result<String, DriverError> {
        let text = self
            .element(element)?
            .inner_text()
            .await
            .map_err(cdp_error)?;
        Ok(text.unwrap_or_default())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<(), DriverError> {
        self.element(element)?
            .click()
            .await
            .map(|_| ())
            .map_err(cdp_error)
    }

    async fn send_text(&mut self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        let element = self.element(element)?;
        element.focus().await.map_err(cdp_error)?;
        element.type_str(text).await.map(|_| ()).map_err(cdp_error)
    }

    async fn clear(&mut self, element: &ElementRef) -> Result<(), DriverError> {
        // The search box is contenteditable; select its contents and delete
        // them with a key press so the app sees the edit.
        self.call(element, SELECT_CONTENTS).await?;
        self.element(element)?
            .press_key("Backspace")
            .await
            .map(|_| ())
            .map_err(cdp_error)
    }

    async fn is_checked(&mut self, element: &ElementRef) -> Result<bool, DriverError> {
        let value = self.call(element, ENTRY_CHECKED).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.elements.clear();

        // An attached browser belongs to the operator; only our tab goes.
        let result = if self.launched {
            let closed = self.browser.close().await.map(|_| ()).map_err(cdp_error);
            if let Err(e) = self.browser.wait().await {
                tracing::debug!(error = %e, "browser process did not exit cleanly");
            }
            closed
        } else {
            match self.page.take() {
                Some(page) => page.close().await.map_err(cdp_error),
                None => Ok(()),
            }
        };
        self.handler.abort();
        result
    }
}
