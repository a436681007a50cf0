//! Navigation fixtures: a UI label paired with the URL it must resolve to

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{SmokeError, SmokeResult};

/// Accessible role used to find an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Link,
    Button,
    Article,
    Navigation,
    Heading,
    Menuitem,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Link => "link",
            Role::Button => "button",
            Role::Article => "article",
            Role::Navigation => "navigation",
            Role::Heading => "heading",
            Role::Menuitem => "menuitem",
        }
    }
}

/// Points at one element by role and accessible name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(default)]
    pub role: Role,
    pub name: String,
    #[serde(default = "default_exact")]
    pub exact: bool,
    /// Zero-based index among elements sharing the same role and name
    #[serde(default)]
    pub nth: Option<usize>,
}

fn default_exact() -> bool {
    true
}

impl Locator {
    pub fn link(name: impl Into<String>) -> Self {
        Self {
            role: Role::Link,
            name: name.into(),
            exact: true,
            nth: None,
        }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self {
            role: Role::Button,
            ..Self::link(name)
        }
    }

    pub fn describe(&self) -> String {
        match self.nth {
            Some(n) => format!("{}[{}]#{}", self.role.as_str(), self.name, n),
            None => format!("{}[{}]", self.role.as_str(), self.name),
        }
    }

    /// An empty accessible name would match any element of the role
    pub fn validate(&self) -> SmokeResult<()> {
        if self.name.trim().is_empty() {
            return Err(SmokeError::ScenarioParse(format!(
                "{} locator has an empty name",
                self.role.as_str()
            )));
        }
        Ok(())
    }
}

/// A navigable element and where activating it must lead.
///
/// `open_new_page` pins the outcome: `Some(true)` requires a popup,
/// `Some(false)` requires in-place navigation and `None` accepts either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavTarget {
    pub name: String,
    pub expected_link: String,
    #[serde(default)]
    pub open_new_page: Option<bool>,
    /// Disambiguates elements that share a label
    #[serde(default)]
    pub arrangement: Option<usize>,
    #[serde(default)]
    pub role: Role,
}

impl NavTarget {
    pub fn new(name: impl Into<String>, expected_link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected_link: expected_link.into(),
            open_new_page: None,
            arrangement: None,
            role: Role::Link,
        }
    }

    pub fn in_new_page(mut self, open_new_page: bool) -> Self {
        self.open_new_page = Some(open_new_page);
        self
    }

    pub fn at(mut self, arrangement: usize) -> Self {
        self.arrangement = Some(arrangement);
        self
    }

    pub fn locator(&self) -> Locator {
        Locator {
            role: self.role,
            name: self.name.clone(),
            exact: true,
            nth: self.arrangement,
        }
    }

    /// Name must be non-empty and the link an absolute http(s) URL
    pub fn validate(&self) -> SmokeResult<()> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name is empty"));
        }

        let url = Url::parse(&self.expected_link)
            .map_err(|e| self.invalid(format!("expected_link '{}': {}", self.expected_link, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(self.invalid(format!("unsupported scheme '{}'", other))),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> SmokeError {
        SmokeError::InvalidFixture {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}
