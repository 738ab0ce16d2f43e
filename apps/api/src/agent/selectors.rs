use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A logical extraction target, independent of its concrete markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ListContainer,
    JobItem,
    ItemLink,
    Title,
    Company,
    Location,
    Compensation,
    PostedAt,
    Description,
    NextPage,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::ListContainer,
        Role::JobItem,
        Role::ItemLink,
        Role::Title,
        Role::Company,
        Role::Location,
        Role::Compensation,
        Role::PostedAt,
        Role::Description,
        Role::NextPage,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Role::ListContainer => "list_container",
            Role::JobItem => "job_item",
            Role::ItemLink => "item_link",
            Role::Title => "title",
            Role::Company => "company",
            Role::Location => "location",
            Role::Compensation => "compensation",
            Role::PostedAt => "posted_at",
            Role::Description => "description",
            Role::NextPage => "next_page",
        }
    }

    pub fn from_key(key: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.key() == key.trim())
    }

    /// Roles without which nothing can be extracted.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Role::ListContainer | Role::JobItem | Role::Title | Role::Company
        )
    }

    /// Description handed to the analyzer.
    pub fn describe(self) -> &'static str {
        match self {
            Role::ListContainer => "the single element that wraps the list of job results",
            Role::JobItem => "each job card inside the list container (relative to the container)",
            Role::ItemLink => "the link inside a job card pointing at the posting (read `href`)",
            Role::Title => "the job title in the detail view shown after a card is clicked",
            Role::Company => "the hiring company name in the detail view",
            Role::Location => "the job location in the detail view",
            Role::Compensation => "salary or compensation text in the detail view, if shown",
            Role::PostedAt => "the posting recency text, e.g. '3 days ago'",
            Role::Description => "the full job description body in the detail view",
            Role::NextPage => "the control that moves to the next page of results",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How to read one role: a CSS selector plus an optional attribute (text otherwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorRule {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub confidence: f32,
}

/// The current mapping from roles to rules for one page structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorSet {
    rules: BTreeMap<Role, SelectorRule>,
    pub confidence: f32,
    pub validated: bool,
}

impl SelectorSet {
    pub fn new(rules: BTreeMap<Role, SelectorRule>, confidence: f32) -> Self {
        Self {
            rules,
            confidence: confidence.clamp(0.0, 1.0),
            validated: false,
        }
    }

    pub fn get(&self, role: Role) -> Option<&SelectorRule> {
        self.rules.get(&role)
    }

    pub fn rules(&self) -> impl Iterator<Item = (Role, &SelectorRule)> {
        self.rules.iter().map(|(role, rule)| (*role, rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn missing_required(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| r.is_required() && !self.rules.contains_key(r))
            .collect()
    }
}

/// Why a role failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    ZeroMatches,
    Ambiguous { count: usize },
    WrongElementKind { found: String, expected: Vec<String> },
    InvalidSelector { message: String },
    NotInteractable { message: String },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleFailure {
    pub role: Role,
    pub selector: String,
    #[serde(flatten)]
    pub reason: FailureReason,
}

impl fmt::Display for RoleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::ZeroMatches => {
                write!(f, "{} `{}` matched no elements", self.role, self.selector)
            }
            FailureReason::Ambiguous { count } => write!(
                f,
                "{} `{}` matched {count} elements where one was expected",
                self.role, self.selector
            ),
            FailureReason::WrongElementKind { found, expected } => write!(
                f,
                "{} `{}` matched a <{found}>, expected one of {}",
                self.role,
                self.selector,
                expected.join(", ")
            ),
            FailureReason::InvalidSelector { message } => {
                write!(f, "{} `{}` is not a valid selector: {message}", self.role, self.selector)
            }
            FailureReason::NotInteractable { message } => {
                write!(f, "{} `{}` could not be clicked: {message}", self.role, self.selector)
            }
            FailureReason::Missing => write!(f, "{} has no selector", self.role),
        }
    }
}
