//! Selector validator: checks a proposed selector set against the live page
//! before any extraction happens.
//!
//! Every role is checked and all failures are reported together, so a
//! re-analysis gets the full picture in one round trip.

use std::time::Duration;

use tracing::{debug, info};

use crate::agent::selectors::{FailureReason, Role, RoleFailure, SelectorRule, SelectorSet};
use crate::agent::{AgentError, CallGuard};
use crate::browser::{BrowserSession, ElementRef};

const NEXT_PAGE_TAGS: [&str; 2] = ["a", "button"];

pub struct Validator {
    settle_delay: Duration,
}

enum Probe {
    Found(Vec<ElementRef>),
    Failed(RoleFailure),
}

impl Validator {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Returns the set marked as validated, or `AgentError::Validation` with
    /// every role that failed. Capability errors propagate unchanged.
    pub async fn validate(
        &self,
        browser: &dyn BrowserSession,
        mut set: SelectorSet,
        guard: &CallGuard,
    ) -> Result<SelectorSet, AgentError> {
        let mut failures = Vec::new();

        let container = match self.require(browser, &set, Role::ListContainer, None, guard).await? {
            Probe::Found(found) => exactly_one(Role::ListContainer, &set, found, &mut failures),
            Probe::Failed(failure) => {
                failures.push(failure);
                None
            }
        };

        let first_item = match &container {
            Some(container) => {
                match self
                    .require(browser, &set, Role::JobItem, Some(container), guard)
                    .await?
                {
                    Probe::Found(items) if items.is_empty() => {
                        failures.push(failure(&set, Role::JobItem, FailureReason::ZeroMatches));
                        None
                    }
                    Probe::Found(items) => items.into_iter().next(),
                    Probe::Failed(f) => {
                        failures.push(f);
                        None
                    }
                }
            }
            None => None,
        };

        // Detail roles only exist once a card has been opened.
        if let Some(item) = first_item {
            self.open_item(browser, &set, &item, guard, &mut failures)
                .await?;
            for role in [Role::Title, Role::Company] {
                match self.require(browser, &set, role, None, guard).await? {
                    Probe::Found(found) => {
                        exactly_one(role, &set, found, &mut failures);
                    }
                    Probe::Failed(f) => failures.push(f),
                }
            }
            if let Some(rule) = set.get(Role::Description) {
                // Optional: only an ambiguous match is a failure.
                if let Probe::Found(found) =
                    probe(browser, Role::Description, rule, None, guard).await?
                {
                    if found.len() > 1 {
                        failures.push(failure(
                            &set,
                            Role::Description,
                            FailureReason::Ambiguous { count: found.len() },
                        ));
                    }
                }
            }
        }

        if let Some(rule) = set.get(Role::NextPage) {
            self.check_next_page(browser, rule, guard, &mut failures)
                .await?;
        }

        if failures.is_empty() {
            set.validated = true;
            info!("selector set validated ({} roles)", set.len());
            Ok(set)
        } else {
            debug!("selector validation produced {} failures", failures.len());
            Err(AgentError::Validation(failures))
        }
    }

    async fn require(
        &self,
        browser: &dyn BrowserSession,
        set: &SelectorSet,
        role: Role,
        within: Option<&ElementRef>,
        guard: &CallGuard,
    ) -> Result<Probe, AgentError> {
        let Some(rule) = set.get(role) else {
            return Ok(Probe::Failed(failure(set, role, FailureReason::Missing)));
        };
        probe(browser, role, rule, within, guard).await
    }

    async fn open_item(
        &self,
        browser: &dyn BrowserSession,
        set: &SelectorSet,
        item: &ElementRef,
        guard: &CallGuard,
        failures: &mut Vec<RoleFailure>,
    ) -> Result<(), AgentError> {
        match guard.browser("open first item", browser.click(item)).await {
            Ok(()) => {}
            Err(AgentError::Element(message)) => {
                failures.push(failure(set, Role::JobItem, FailureReason::NotInteractable { message }));
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        guard.pause(self.settle_delay).await?;

        let Some(title) = set.get(Role::Title) else {
            return Ok(());
        };
        // A missing title is reported by the role check that follows.
        match guard
            .browser("wait for detail view", browser.wait_for(&title.css, guard.timeout()))
            .await
        {
            Ok(()) | Err(AgentError::Element(_)) => Ok(()),
            Err(AgentError::Timeout { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn check_next_page(
        &self,
        browser: &dyn BrowserSession,
        rule: &SelectorRule,
        guard: &CallGuard,
        failures: &mut Vec<RoleFailure>,
    ) -> Result<(), AgentError> {
        let found = match probe(browser, Role::NextPage, rule, None, guard).await? {
            Probe::Found(found) => found,
            Probe::Failed(f) => {
                failures.push(f);
                return Ok(());
            }
        };
        // Absent on the last page; only a wrong element kind is an error.
        let Some(control) = found.first() else {
            return Ok(());
        };
        let tag = guard
            .browser("read next control tag", browser.tag_name(control))
            .await?;
        if !NEXT_PAGE_TAGS.contains(&tag.as_str()) {
            failures.push(RoleFailure {
                role: Role::NextPage,
                selector: rule.css.clone(),
                reason: FailureReason::WrongElementKind {
                    found: tag,
                    expected: NEXT_PAGE_TAGS.iter().map(|t| t.to_string()).collect(),
                },
            });
        }
        Ok(())
    }
}

async fn probe(
    browser: &dyn BrowserSession,
    role: Role,
    rule: &SelectorRule,
    within: Option<&ElementRef>,
    guard: &CallGuard,
) -> Result<Probe, AgentError> {
    match guard
        .browser("validate selector", browser.query(within, &rule.css))
        .await
    {
        Ok(found) => Ok(Probe::Found(found)),
        Err(AgentError::Element(message)) => Ok(Probe::Failed(RoleFailure {
            role,
            selector: rule.css.clone(),
            reason: FailureReason::InvalidSelector { message },
        })),
        Err(e) => Err(e),
    }
}

fn failure(set: &SelectorSet, role: Role, reason: FailureReason) -> RoleFailure {
    RoleFailure {
        role,
        selector: set.get(role).map(|r| r.css.clone()).unwrap_or_default(),
        reason,
    }
}

fn exactly_one(
    role: Role,
    set: &SelectorSet,
    found: Vec<ElementRef>,
    failures: &mut Vec<RoleFailure>,
) -> Option<ElementRef> {
    match found.len() {
        0 => {
            failures.push(failure(set, role, FailureReason::ZeroMatches));
            None
        }
        1 => found.into_iter().next(),
        count => {
            failures.push(failure(set, role, FailureReason::Ambiguous { count }));
            None
        }
    }
}
