//! In-memory participant picker used by controller and session tests.
//!
//! Mirrors the rendered list: an empty search shows every contact, a query
//! shows the contacts whose number ends with its last ten digits. Entry text
//! is returned unnormalized, the way the browser reports it.

use super::{DriverError, ElementRef, Target, UiDriver};
use crate::phone::matchable_text;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeContact {
    pub text: String,
    pub already_member: bool,
    pub invite: bool,
    pub checked: bool,
    /// Listed, but never shows up in search results (e.g. saved under a
    /// name only).
    pub hidden_from_search: bool,
}

impl FakeContact {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            already_member: false,
            invite: false,
            checked: false,
            hidden_from_search: false,
        }
    }

    pub fn member(mut self) -> Self {
        self.already_member = true;
        self
    }

    pub fn invitable(mut self) -> Self {
        self.invite = true;
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden_from_search = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeDriver {
    pub contacts: Vec<FakeContact>,
    pub app_ready: bool,
    pub groups: Vec<String>,
    pub search_field_present: bool,
    /// Upcoming searches whose results never render.
    pub failing_searches: u32,
    pub query: String,
    pub searches: Vec<String>,
    pub clicked: Vec<String>,
    pub invited: Vec<String>,
    pub closed: u32,
}

impl FakeDriver {
    pub fn with_contacts(contacts: Vec<FakeContact>) -> Self {
        Self {
            contacts,
            app_ready: true,
            search_field_present: true,
            ..Self::default()
        }
    }

    fn visible(&self) -> Vec<usize> {
        let digits: String = self.query.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return (0..self.contacts.len()).collect();
        }
        let tail = &digits[digits.len().saturating_sub(10)..];
        self.contacts
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.hidden_from_search && matchable_text(&c.text).contains(tail))
            .map(|(i, _)| i)
            .collect()
    }

    fn index(element: &ElementRef, prefix: &str) -> Result<usize, DriverError> {
        element
            .id()
            .strip_prefix(prefix)
            .and_then(|rest| rest.parse().ok())
            .ok_or_else(|| DriverError::Stale(element.id().to_string()))
    }
}

#[async_trait]
impl UiDriver for FakeDriver {
    async fn find_all(&mut self, target: &Target) -> Result<Vec<ElementRef>, DriverError> {
        let found = match target {
            Target::AppReady if self.app_ready => vec![ElementRef::new("app")],
            Target::GroupTitle(name) if self.groups.contains(name) => {
                vec![ElementRef::new(format!("group:{}", name))]
            }
            Target::SearchField if self.search_field_present => vec![ElementRef::new("search")],
            Target::ContactEntry => self
                .visible()
                .into_iter()
                .map(|i| ElementRef::new(format!("entry:{}", i)))
                .collect(),
            Target::CheckedEntry => self
                .contacts
                .iter()
                .enumerate()
                .filter(|(_, c)| c.checked)
                .map(|(i, _)| ElementRef::new(format!("entry:{}", i)))
                .collect(),
            _ => Vec::new(),
        };
        Ok(found)
    }

    async fn find_within(
        &mut self,
        parent: &ElementRef,
        target: &Target,
    ) -> Result<Vec<ElementRef>, DriverError> {
        let idx = Self::index(parent, "entry:")?;
        let contact = &self.contacts[idx];
        let found = match target {
            Target::AlreadyMemberMarker if contact.already_member => {
                vec![ElementRef::new(format!("marker:{}", idx))]
            }
            Target::InviteAction if contact.invite => {
                vec![ElementRef::new(format!("invite:{}", idx))]
            }
            _ => Vec::new(),
        };
        Ok(found)
    }

    async fn text(&mut self, element: &ElementRef) -> Result<String, DriverError> {
        let idx = Self::index(element, "entry:")?;
        Ok(self.contacts[idx].text.clone())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<(), DriverError> {
        if let Ok(idx) = Self::index(element, "invite:") {
            self.invited.push(self.contacts[idx].text.clone());
            return Ok(());
        }
        if element.id().starts_with("group:") {
            return Ok(());
        }
        let idx = Self::index(element, "entry:")?;
        self.contacts[idx].checked = true;
        self.clicked.push(self.contacts[idx].text.clone());
        Ok(())
    }

    async fn send_text(&mut self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        if element.id() != "search" || !self.search_field_present {
            return Err(DriverError::Stale(element.id().to_string()));
        }
        if !text.is_empty() {
            self.query.push_str(text);
            self.searches.push(self.query.clone());
        }
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> Result<(), DriverError> {
        if element.id() != "search" || !self.search_field_present {
            return Err(DriverError::Stale(element.id().to_string()));
        }
        self.query.clear();
        Ok(())
    }

    /// State of the entry's checkbox.
    async fn is_checked(&mut self, element: &ElementRef) -> Result<bool, DriverError> {
        let idx = Self::index(element, "entry:")?;
        Ok(self.contacts[idx].checked)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.closed += 1;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        target: &Target,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        if *target == Target::ContactEntry && self.failing_searches > 0 {
            self.failing_searches -= 1;
            return Err(DriverError::Timeout {
                target: target.to_string(),
                waited: timeout,
            });
        }
        self.find_all(target)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::Timeout {
                target: target.to_string(),
                waited: timeout,
            })
    }
}
