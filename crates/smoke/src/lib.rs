//! equ-smoke: browser smoke tests for www.equ.ai
//!
//! Scenarios are declared in YAML and compiled to Playwright scripts, which
//! this crate runs and checks from Rust:
//! - Preflights the site over HTTP before launching any browser
//! - Compiles each scenario into one Node script driving Playwright
//! - Reads step results back as JSON lines
//! - Compares screenshots against baselines when asked to
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Smoke Runner (Rust)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SmokeRunner                                                │
//! │    ├── preflight() -> SiteProbe (HTTP 200 on base URL)      │
//! │    ├── run_scenario(&Scenario) -> TestResult                │
//! │    │     └── PlaywrightDriver::run -> ScenarioRun           │
//! │    └── VisualTester::compare(screenshot, baseline)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, tags, device (desktop | mobile)                │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate { url, expect_status }                │
//! │          ├── expect_no_console_errors / expect_title        │
//! │          ├── verify_links { targets: [NavTarget] }          │
//! │          ├── hover { target, reveals: [NavTarget] }         │
//! │          ├── open_mobile_menu { toggle, reveals }           │
//! │          └── screenshot { name, full_page }                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fixtures;
pub mod playwright;
pub mod probe;
pub mod runner;
pub mod scenario;
pub mod script;
pub mod visual;

pub use config::SmokeConfig;
pub use error::{SmokeError, SmokeResult};
pub use fixtures::{Locator, NavTarget, Role};
pub use runner::{SmokeRunner, SuiteResult, TestResult};
pub use scenario::{Scenario, Step};
