//! Declarative YAML smoke scenarios

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{SmokeError, SmokeResult};
use crate::fixtures::{Locator, NavTarget};

/// One independent smoke test parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Desktop or emulated mobile device
    #[serde(default)]
    pub device: DeviceKind,

    /// Playwright device descriptor used when `device` is mobile
    #[serde(default = "default_mobile_descriptor")]
    pub mobile_descriptor: String,

    /// Viewport size for desktop sessions
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Page the session starts from and returns to after in-place navigation.
    /// Relative paths are joined onto the configured base URL.
    #[serde(default = "default_start_url")]
    pub start_url: String,

    /// Steps to execute in order
    pub steps: Vec<Step>,

    /// Whether screenshots are compared against baselines
    #[serde(default)]
    pub visual_regression: bool,

    /// Threshold for visual diff (0.0 - 100.0 percent)
    #[serde(default = "default_threshold")]
    pub visual_threshold: f64,
}

fn default_mobile_descriptor() -> String {
    "Pixel 5".to_string()
}

fn default_viewport() -> Viewport {
    Viewport { width: 1280, height: 720 }
}

fn default_start_url() -> String {
    "/".to_string()
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Go to a URL, optionally asserting the main document's status
    Navigate {
        url: String,
        #[serde(default)]
        expect_status: Option<u16>,
    },

    /// No console error or uncaught page error since the session started
    ExpectNoConsoleErrors {
        #[serde(default)]
        settle_ms: Option<u64>,
    },

    /// Poll the document title until it satisfies every given matcher.
    /// `matches` is limited to regex syntax that means the same in Rust and
    /// JS: plain `(...)` and `(?:...)` groups, classes, quantifiers, anchors.
    ExpectTitle {
        #[serde(default)]
        equals: Option<String>,
        #[serde(default)]
        contains: Option<String>,
        #[serde(default)]
        matches: Option<String>,
    },

    /// First element under a CSS selector has inner text containing `contains`
    ExpectText {
        within: String,
        #[serde(default)]
        has_text: Option<String>,
        contains: String,
    },

    ExpectVisible {
        target: Locator,
        #[serde(default)]
        enabled: Option<bool>,
    },

    ExpectInViewport {
        target: Locator,
    },

    /// Plain activation, e.g. a language switch
    Click {
        target: Locator,
        #[serde(default)]
        wait_for_url: Option<String>,
    },

    /// Click-and-verify every fixture in order
    VerifyLinks {
        targets: Vec<NavTarget>,
    },

    /// Hover a menu and click-and-verify each revealed sub-link
    Hover {
        target: Locator,
        #[serde(default)]
        reveals: Vec<NavTarget>,
    },

    /// Open the mobile navigation and wait until `reveals` is visible
    OpenMobileMenu {
        toggle: Locator,
        reveals: Locator,
    },

    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

impl Step {
    /// Short label used in events and results
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::ExpectNoConsoleErrors { .. } => "expect_no_console_errors".to_string(),
            Step::ExpectTitle { equals, contains, matches } => {
                let wanted = equals
                    .as_deref()
                    .or(contains.as_deref())
                    .or(matches.as_deref())
                    .unwrap_or_default();
                format!("expect_title:{}", wanted)
            }
            Step::ExpectText { within, contains, .. } => format!("expect_text:{}~{}", within, contains),
            Step::ExpectVisible { target, .. } => format!("expect_visible:{}", target.describe()),
            Step::ExpectInViewport { target } => format!("expect_in_viewport:{}", target.describe()),
            Step::Click { target, .. } => format!("click:{}", target.describe()),
            Step::VerifyLinks { targets } => format!("verify_links:{}", targets.len()),
            Step::Hover { target, .. } => format!("hover:{}", target.describe()),
            Step::OpenMobileMenu { toggle, .. } => format!("open_mobile_menu:{}", toggle.describe()),
            Step::Screenshot { name, .. } => format!("screenshot:{}", name),
            Step::Log { message } => format!("log:{}", message.chars().take(30).collect::<String>()),
        }
    }

    fn validate(&self) -> SmokeResult<()> {
        match self {
            Step::ExpectTitle { equals, contains, matches } => {
                if equals.is_none() && contains.is_none() && matches.is_none() {
                    return Err(SmokeError::ScenarioParse(
                        "expect_title needs one of equals, contains or matches".to_string(),
                    ));
                }
                if let Some(pattern) = matches {
                    check_title_pattern(pattern).map_err(|reason| {
                        SmokeError::ScenarioParse(format!("bad title pattern '{}': {}", pattern, reason))
                    })?;
                }
                Ok(())
            }
            Step::ExpectVisible { target, .. }
            | Step::ExpectInViewport { target }
            | Step::Click { target, .. } => target.validate(),
            Step::VerifyLinks { targets } => {
                if targets.is_empty() {
                    return Err(SmokeError::ScenarioParse("verify_links has no targets".to_string()));
                }
                targets.iter().try_for_each(NavTarget::validate)
            }
            Step::Hover { target, reveals } => {
                target.validate()?;
                reveals.iter().try_for_each(NavTarget::validate)
            }
            Step::OpenMobileMenu { toggle, reveals } => {
                toggle.validate()?;
                reveals.validate()
            }
            Step::Screenshot { name, .. } if name.trim().is_empty() => Err(
                SmokeError::ScenarioParse("screenshot name is empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Title patterns compile with `regex` here but run as a JS `RegExp` in the
/// browser. Only the syntax both engines read the same way is accepted.
fn check_title_pattern(pattern: &str) -> Result<(), String> {
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(e @ ('A' | 'z' | 'p' | 'P')) = chars.next() {
                    return Err(format!("escape \\{} is not supported by JS RegExp", e));
                }
            }
            '(' if chars.peek() == Some(&'?') => {
                chars.next();
                if chars.peek() != Some(&':') {
                    return Err("only (?:...) groups mean the same in Rust and JS".to_string());
                }
            }
            '[' if chars.peek() == Some(&'[') => {
                chars.next();
                if chars.peek() == Some(&':') {
                    return Err("POSIX classes like [[:alpha:]] are not supported by JS RegExp".to_string());
                }
            }
            _ => {}
        }
    }

    regex::Regex::new(pattern).map(|_| ()).map_err(|e| e.to_string())
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> SmokeResult<Self> {
        serde_yaml::from_str(yaml).map_err(SmokeError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> SmokeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| SmokeError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> SmokeResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        scenarios.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Check fixtures and matchers before any browser is launched
    pub fn validate(&self) -> SmokeResult<()> {
        if self.name.trim().is_empty() {
            return Err(SmokeError::ScenarioParse("scenario name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(SmokeError::ScenarioParse(format!("{}: no steps", self.name)));
        }

        for step in &self.steps {
            step.validate().map_err(|e| match e {
                SmokeError::ScenarioParse(msg) => {
                    SmokeError::ScenarioParse(format!("{}: {}", self.name, msg))
                }
                other => other,
            })?;
        }

        Ok(())
    }

    /// Validate each scenario and reject duplicate names
    pub fn validate_all(scenarios: &[Self]) -> SmokeResult<()> {
        let mut seen = HashSet::new();
        for scenario in scenarios {
            scenario.validate()?;
            if !seen.insert(scenario.name.as_str()) {
                return Err(SmokeError::ScenarioParse(format!(
                    "duplicate scenario name: {}",
                    scenario.name
                )));
            }
        }
        Ok(())
    }

    /// Names of every screenshot this scenario takes, in step order
    pub fn screenshot_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Screenshot { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}
