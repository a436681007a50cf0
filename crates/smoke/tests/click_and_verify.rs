//! Runs generated scenario scripts with `node` against a stub
//! `@playwright/test`, so the click-and-verify helper is exercised without a
//! browser or network. Skipped when `node` is not installed.

use std::path::{Path, PathBuf};

use equ_smoke::playwright::{PlaywrightDriver, ScenarioRun};
use equ_smoke::{Scenario, SmokeConfig};
use serde_json::json;
use tempfile::TempDir;

const BASE_URL: &str = "https://stub.equ.test";

/// Minimal stand-in for the Playwright API surface the scripts use. Clicking
/// an element named in `links.json` either opens a popup at `popup`, moves
/// the page to `navigate`, or both. Every `goto` is appended to `gotos.log`.
const STUB: &str = r#"
const fs = require('fs');
const path = require('path');

const links = JSON.parse(fs.readFileSync(path.join(__dirname, 'links.json'), 'utf8'));
const record = (url) => fs.appendFileSync(path.join(__dirname, 'gotos.log'), url + '\n');
const sleep = (ms) => new Promise((resolve) => setTimeout(resolve, ms));

function makePage(context, initialUrl) {
  const page = {
    current: initialUrl,
    url: () => page.current,
    on: () => {},
    waitForLoadState: async () => {},
    close: async () => {},
    async goto(url) {
      record(url);
      page.current = url;
      return { status: () => 200 };
    },
    async waitForURL(expected, { timeout }) {
      const deadline = Date.now() + timeout;
      while (page.current !== expected) {
        if (Date.now() > deadline) {
          throw new Error(`waitForURL ${expected} timed out at ${page.current}`);
        }
        await sleep(10);
      }
    },
    getByRole(role, { name }) {
      const locator = {
        first: () => locator,
        nth: () => locator,
        async waitFor() {
          if (!links[name]) throw new Error(`no ${role} named ${name}`);
        },
        isEnabled: async () => true,
        hover: async () => {},
        async click() {
          const link = links[name];
          if (link.popup) setTimeout(() => context.emitPage(makePage(context, link.popup)), 10);
          if (link.navigate) page.current = link.navigate;
        },
      };
      return locator;
    },
  };
  return page;
}

function makeContext() {
  let waiters = [];
  const context = {
    emitPage(page) {
      const pending = waiters;
      waiters = [];
      pending.forEach((resolve) => resolve(page));
    },
    setDefaultNavigationTimeout: () => {},
    newPage: async () => makePage(context, 'about:blank'),
    waitForEvent(event, { timeout }) {
      return new Promise((resolve, reject) => {
        const timer = setTimeout(() => reject(new Error(`no ${event} event`)), timeout);
        waiters.push((page) => {
          clearTimeout(timer);
          resolve(page);
        });
      });
    },
  };
  return context;
}

const browserType = {
  launch: async () => ({ newContext: async () => makeContext(), close: async () => {} }),
};

module.exports = {
  chromium: browserType,
  firefox: browserType,
  webkit: browserType,
  devices: {},
  expect: () => ({}),
};
"#;

fn node_available() -> bool {
    std::process::Command::new("node")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

macro_rules! skip_without_node {
    () => {
        if !node_available() {
            println!("skipping: node not installed");
            return;
        }
    };
}

struct Stub {
    _dir: TempDir,
    config: SmokeConfig,
    module_dir: PathBuf,
}

impl Stub {
    fn new(links: serde_json::Value) -> Self {
        let dir = TempDir::new().unwrap();
        let node_modules = dir.path().join("node_modules");
        let module_dir = node_modules.join("@playwright").join("test");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join("index.js"), STUB).unwrap();
        std::fs::write(module_dir.join("links.json"), links.to_string()).unwrap();

        let config = SmokeConfig {
            base_url: BASE_URL.to_string(),
            node_modules,
            artifacts_dir: dir.path().join("artifacts"),
            element_timeout_ms: 200,
            navigation_timeout_ms: 600,
            scenario_timeout_secs: 30,
            ..Default::default()
        };

        Self {
            _dir: dir,
            config,
            module_dir,
        }
    }

    async fn verify(&self, open_new_page: Option<bool>) -> ScenarioRun {
        let flag = match open_new_page {
            Some(flag) => format!("\n        open_new_page: {}", flag),
            None => String::new(),
        };
        let yaml = format!(
            r#"
name: click-and-verify
steps:
  - action: navigate
    url: /
  - action: verify_links
    targets:
      - name: Target
        expected_link: {base}/ja/target{flag}
"#,
            base = BASE_URL,
            flag = flag,
        );
        let scenario = Scenario::from_yaml(&yaml).unwrap();
        scenario.validate().unwrap();

        PlaywrightDriver::new(self.config.clone())
            .unwrap()
            .run(&scenario)
            .await
            .unwrap()
    }

    fn gotos(&self) -> Vec<String> {
        read_lines(&self.module_dir.join("gotos.log"))
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}

fn start_url() -> String {
    format!("{}/", BASE_URL)
}

fn target_url() -> String {
    format!("{}/ja/target", BASE_URL)
}

fn link_error(run: &ScenarioRun) -> String {
    let step = run.first_failure().expect("a failing step");
    assert_eq!(step.label, "link:Target");
    assert_eq!((step.index, step.sub), (1, Some(0)));
    step.error.clone().unwrap_or_default()
}

#[tokio::test]
async fn test_new_page_required_and_opened() {
    skip_without_node!();
    let stub = Stub::new(json!({ "Target": { "popup": target_url() } }));

    let run = stub.verify(Some(true)).await;
    assert!(run.ok, "{:?}", run.steps);
    assert_eq!(run.steps.len(), 2);
    // the original page never left, so there is nothing to reset
    assert_eq!(stub.gotos(), vec![start_url()]);
}

#[tokio::test]
async fn test_new_page_required_but_navigated_in_place() {
    skip_without_node!();
    let stub = Stub::new(json!({ "Target": { "navigate": target_url() } }));

    let run = stub.verify(Some(true)).await;
    assert!(!run.ok);
    assert!(link_error(&run).contains("no new page opened"));
}

#[tokio::test]
async fn test_new_page_with_wrong_url() {
    skip_without_node!();
    let stub = Stub::new(json!({ "Target": { "popup": format!("{}/ja/elsewhere", BASE_URL) } }));

    let run = stub.verify(Some(true)).await;
    assert!(!run.ok);
    assert!(link_error(&run).contains("/ja/elsewhere"));
}

#[tokio::test]
async fn test_in_place_navigation_resets_to_start() {
    skip_without_node!();
    let stub = Stub::new(json!({ "Target": { "navigate": target_url() } }));

    let run = stub.verify(Some(false)).await;
    assert!(run.ok, "{:?}", run.steps);
    assert_eq!(stub.gotos(), vec![start_url(), start_url()]);
}

#[tokio::test]
async fn test_in_place_required_but_popup_opened() {
    skip_without_node!();
    let stub = Stub::new(json!({ "Target": { "popup": target_url() } }));

    let run = stub.verify(Some(false)).await;
    assert!(!run.ok);
    assert!(link_error(&run).contains("waitForURL"));
    assert_eq!(stub.gotos(), vec![start_url()]);
}

#[tokio::test]
async fn test_either_outcome_accepts_popup_first() {
    skip_without_node!();
    let stub = Stub::new(json!({
        "Target": { "popup": target_url(), "navigate": format!("{}/ja/elsewhere", BASE_URL) }
    }));

    let run = stub.verify(None).await;
    assert!(run.ok, "{:?}", run.steps);
    assert_eq!(stub.gotos(), vec![start_url()]);
}

#[tokio::test]
async fn test_either_outcome_accepts_in_place() {
    skip_without_node!();
    let stub = Stub::new(json!({ "Target": { "navigate": target_url() } }));

    let run = stub.verify(None).await;
    assert!(run.ok, "{:?}", run.steps);
    assert_eq!(stub.gotos(), vec![start_url(), start_url()]);
}

#[tokio::test]
async fn test_either_outcome_with_wrong_in_place_url() {
    skip_without_node!();
    let stub = Stub::new(json!({ "Target": { "navigate": format!("{}/ja/elsewhere", BASE_URL) } }));

    let run = stub.verify(None).await;
    assert!(!run.ok);
    assert!(link_error(&run).contains("waitForURL"));
}
