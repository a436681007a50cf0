//! Compiles a scenario into a self-contained Playwright Node script
//!
//! The script prints one JSON object per line on stdout:
//!
//! ```text
//! {"event":"step","index":0,"label":"navigate:/","ok":true,"duration_ms":812}
//! {"event":"step","index":1,"sub":0,"label":"link:About Us","ok":true,"duration_ms":1204}
//! {"event":"log","message":"..."}
//! {"event":"done","ok":true,"console_errors":[]}
//! ```
//!
//! `index` is the scenario step. Steps that fan out into one block per
//! fixture (`verify_links`, `hover` with `reveals`) add `sub`, the fixture's
//! position in that step.
//!
//! The first failing step stops the scenario; `done` is always emitted once
//! the browser was launched.

use std::path::PathBuf;

use crate::config::SmokeConfig;
use crate::fixtures::{Locator, NavTarget};
use crate::scenario::{DeviceKind, Scenario, Step};

const PRELUDE_HELPERS: &str = r#"
const emit = (event) => console.log(JSON.stringify(event));
const consoleErrors = [];

async function runStep(index, label, body, sub) {
  const started = Date.now();
  const id = sub === undefined ? { index } : { index, sub };
  try {
    await body();
    emit({ event: 'step', ...id, label, ok: true, duration_ms: Date.now() - started });
  } catch (error) {
    const message = String((error && error.message) || error);
    emit({ event: 'step', ...id, label, ok: false, duration_ms: Date.now() - started, error: message });
    throw error;
  }
}

// openNewPage: true requires a popup, false requires in-place navigation,
// null accepts either.
async function clickAndVerify(page, context, locator, expectedLink, openNewPage) {
  await locator.waitFor({ state: 'visible', timeout: elementTimeout });
  if (!(await locator.isEnabled())) {
    throw new Error(`element leading to ${expectedLink} is not enabled`);
  }

  const popupWait = openNewPage === false
    ? Promise.resolve(null)
    : context
        .waitForEvent('page', { timeout: openNewPage ? navigationTimeout : elementTimeout })
        .catch(() => null);

  await locator.click();
  const popup = await popupWait;

  if (popup) {
    await popup.waitForLoadState('domcontentloaded');
    const actual = popup.url();
    await popup.close();
    if (actual !== expectedLink) {
      throw new Error(`new page opened ${actual}, expected ${expectedLink}`);
    }
    return;
  }

  if (openNewPage === true) {
    throw new Error(`no new page opened for ${expectedLink} (now at ${page.url()})`);
  }

  await page.waitForURL(expectedLink, { timeout: navigationTimeout });
  await page.goto(startUrl, { timeout: navigationTimeout });
}

async function openMobileMenu(toggle, reveals) {
  await toggle.waitFor({ state: 'visible', timeout: elementTimeout });
  await toggle.click();
  await reveals.waitFor({ state: 'visible', timeout: elementTimeout });
}
"#;

const FOOTER: &str = r#"
  } catch (error) {
    ok = false;
  } finally {
    emit({ event: 'done', ok, console_errors: consoleErrors });
    await browser.close();
  }
})().catch((error) => {
  console.error((error && error.stack) || String(error));
  process.exit(1);
});
"#;

/// Quote `value` as a JS string literal
pub fn js_str(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

pub struct ScriptBuilder<'a> {
    config: &'a SmokeConfig,
}

impl<'a> ScriptBuilder<'a> {
    pub fn new(config: &'a SmokeConfig) -> Self {
        Self { config }
    }

    /// Path a screenshot step writes to
    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        self.config.artifacts_dir.join(format!("{}.png", name))
    }

    pub fn build(&self, scenario: &Scenario) -> String {
        let mut script = String::new();

        script.push_str(&format!(
            r#"const {{ chromium, firefox, webkit, devices, expect }} = require('@playwright/test');

const startUrl = {start_url};
const elementTimeout = {element_timeout};
const navigationTimeout = {navigation_timeout};
"#,
            start_url = js_str(&self.config.resolve_url(&scenario.start_url)),
            element_timeout = self.config.element_timeout_ms,
            navigation_timeout = self.config.navigation_timeout_ms,
        ));
        script.push_str(PRELUDE_HELPERS);

        script.push_str(&format!(
            r#"
(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({context_options});
  context.setDefaultNavigationTimeout(navigationTimeout);
  const page = await context.newPage();
  page.on('console', (msg) => {{
    if (msg.type() === 'error') consoleErrors.push(msg.text());
  }});
  page.on('pageerror', (error) => consoleErrors.push(String(error)));

  let ok = true;
  try {{
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            context_options = self.context_options(scenario),
        ));

        for (index, step) in scenario.steps.iter().enumerate() {
            script.push_str(&self.step_to_js(step, index));
        }

        script.push_str(FOOTER);
        script
    }

    fn context_options(&self, scenario: &Scenario) -> String {
        match scenario.device {
            DeviceKind::Mobile => format!("{{ ...devices[{}] }}", js_str(&scenario.mobile_descriptor)),
            DeviceKind::Desktop => format!(
                "{{ viewport: {{ width: {}, height: {} }} }}",
                scenario.viewport.width, scenario.viewport.height
            ),
        }
    }

    fn locator_js(&self, locator: &Locator) -> String {
        let base = format!(
            "page.getByRole({}, {{ name: {}, exact: {} }})",
            js_str(locator.role.as_str()),
            js_str(&locator.name),
            locator.exact
        );
        match locator.nth {
            Some(n) => format!("{}.nth({})", base, n),
            None => format!("{}.first()", base),
        }
    }

    fn wrap(&self, index: usize, label: &str, body: &str) -> String {
        format!(
            "\n    await runStep({}, {}, async () => {{\n{}\n    }});\n",
            index,
            js_str(label),
            body
        )
    }

    /// One block of a step that fans out per fixture
    fn wrap_sub(&self, index: usize, sub: usize, label: &str, body: &str) -> String {
        format!(
            "\n    await runStep({}, {}, async () => {{\n{}\n    }}, {});\n",
            index,
            js_str(label),
            body,
            sub
        )
    }

    fn verify_target_js(&self, target: &NavTarget) -> String {
        let open_new_page = match target.open_new_page {
            Some(flag) => flag.to_string(),
            None => "null".to_string(),
        };
        format!(
            "      await clickAndVerify(page, context, {}, {}, {});",
            self.locator_js(&target.locator()),
            js_str(&target.expected_link),
            open_new_page
        )
    }

    /// Convert a step to one or more `runStep` blocks
    fn step_to_js(&self, step: &Step, index: usize) -> String {
        let label = step.label();

        match step {
            Step::Navigate { url, expect_status } => {
                let url = js_str(&self.config.resolve_url(url));
                let mut body = format!(
                    "      const response = await page.goto({}, {{ timeout: navigationTimeout }});",
                    url
                );
                if let Some(status) = expect_status {
                    body.push_str(&format!(
                        r#"
      const status = response ? response.status() : null;
      if (status !== {status}) {{
        throw new Error(`HTTP status ${{status}} for ${{{url}}}, expected {status}`);
      }}"#,
                        status = status,
                        url = url,
                    ));
                }
                self.wrap(index, &label, &body)
            }
            Step::ExpectNoConsoleErrors { settle_ms } => {
                let mut body = "      await page.waitForLoadState('networkidle');".to_string();
                if let Some(ms) = settle_ms {
                    body.push_str(&format!("\n      await page.waitForTimeout({});", ms));
                }
                body.push_str(
                    r#"
      if (consoleErrors.length > 0) {
        throw new Error(`${consoleErrors.length} console error(s): ${consoleErrors.join(' | ')}`);
      }"#,
                );
                self.wrap(index, &label, &body)
            }
            Step::ExpectTitle { equals, contains, matches } => {
                let mut checks = Vec::new();
                if let Some(title) = equals {
                    checks.push(format!(
                        "      await expect(page).toHaveTitle({}, {{ timeout: navigationTimeout }});",
                        js_str(title)
                    ));
                }
                if let Some(fragment) = contains {
                    checks.push(format!(
                        "      await expect(page).toHaveTitle(new RegExp({}), {{ timeout: navigationTimeout }});",
                        js_str(&regex::escape(fragment))
                    ));
                }
                if let Some(pattern) = matches {
                    checks.push(format!(
                        "      await expect(page).toHaveTitle(new RegExp({}), {{ timeout: navigationTimeout }});",
                        js_str(pattern)
                    ));
                }
                self.wrap(index, &label, &checks.join("\n"))
            }
            Step::ExpectText { within, has_text, contains } => {
                let filter = has_text
                    .as_ref()
                    .map(|t| format!(".filter({{ hasText: {} }})", js_str(t)))
                    .unwrap_or_default();
                let body = format!(
                    r#"      const element = page.locator({within}){filter}.first();
      await element.waitFor({{ state: 'visible', timeout: elementTimeout }});
      const text = await element.innerText();
      if (!text.includes({contains})) {{
        throw new Error('text of ' + {within} + ' does not contain ' + {contains});
      }}"#,
                    within = js_str(within),
                    filter = filter,
                    contains = js_str(contains),
                );
                self.wrap(index, &label, &body)
            }
            Step::ExpectVisible { target, enabled } => {
                let locator = self.locator_js(target);
                let mut body = format!(
                    "      await expect({}).toBeVisible({{ timeout: elementTimeout }});",
                    locator
                );
                match enabled {
                    Some(true) => body.push_str(&format!("\n      await expect({}).toBeEnabled();", locator)),
                    Some(false) => body.push_str(&format!("\n      await expect({}).toBeDisabled();", locator)),
                    None => {}
                }
                self.wrap(index, &label, &body)
            }
            Step::ExpectInViewport { target } => {
                let body = format!(
                    "      await expect({}).toBeInViewport({{ timeout: elementTimeout }});",
                    self.locator_js(target)
                );
                self.wrap(index, &label, &body)
            }
            Step::Click { target, wait_for_url } => {
                let mut body = format!(
                    r#"      const target = {};
      await target.waitFor({{ state: 'visible', timeout: elementTimeout }});
      await target.click();"#,
                    self.locator_js(target)
                );
                if let Some(url) = wait_for_url {
                    body.push_str(&format!(
                        "\n      await page.waitForURL({}, {{ timeout: navigationTimeout }});",
                        js_str(&self.config.resolve_url(url))
                    ));
                }
                self.wrap(index, &label, &body)
            }
            Step::VerifyLinks { targets } => targets
                .iter()
                .enumerate()
                .map(|(sub, t)| {
                    self.wrap_sub(index, sub, &format!("link:{}", t.name), &self.verify_target_js(t))
                })
                .collect(),
            Step::Hover { target, reveals } => {
                let hover = format!(
                    "      await {}.hover({{ timeout: elementTimeout }});",
                    self.locator_js(target)
                );
                if reveals.is_empty() {
                    return self.wrap(index, &label, &hover);
                }
                // Re-hover before each sub-link; the previous check may have navigated away.
                reveals
                    .iter()
                    .enumerate()
                    .map(|(sub, t)| {
                        let body = format!("{}\n{}", hover, self.verify_target_js(t));
                        self.wrap_sub(index, sub, &format!("{} > {}", label, t.name), &body)
                    })
                    .collect()
            }
            Step::OpenMobileMenu { toggle, reveals } => {
                let body = format!(
                    "      await openMobileMenu({}, {});",
                    self.locator_js(toggle),
                    self.locator_js(reveals)
                );
                self.wrap(index, &label, &body)
            }
            Step::Screenshot { name, full_page } => {
                let path = self.screenshot_path(name);
                let body = format!(
                    "      await page.screenshot({{ path: {}, fullPage: {} }});",
                    js_str(&path.to_string_lossy()),
                    full_page
                );
                self.wrap(index, &label, &body)
            }
            Step::Log { message } => {
                let body = format!("      emit({{ event: 'log', message: {} }});", js_str(message));
                self.wrap(index, &label, &body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> String {
        let config = SmokeConfig::default();
        let scenario = Scenario::from_yaml(yaml).unwrap();
        ScriptBuilder::new(&config).build(&scenario)
    }

    #[test]
    fn test_js_str_escapes() {
        assert_eq!(js_str("About Us"), r#""About Us""#);
        assert_eq!(js_str(r#"it's "quoted""#), r#""it's \"quoted\"""#);
        assert_eq!(js_str("株式会社エキュメノポリス"), "\"株式会社エキュメノポリス\"");
    }

    #[test]
    fn test_prelude_and_footer() {
        let script = build("name: a\nsteps: [{action: log, message: hi}]");
        assert!(script.contains("require('@playwright/test')"));
        assert!(script.contains(r#"const startUrl = "https://www.equ.ai/";"#));
        assert!(script.contains("const elementTimeout = 3000;"));
        assert!(script.contains("chromium.launch({ headless: true })"));
        assert!(script.contains("viewport: { width: 1280, height: 720 }"));
        assert!(script.contains("emit({ event: 'done', ok, console_errors: consoleErrors })"));
        // listeners are attached before any step runs
        let listener = script.find("page.on('console'").unwrap();
        let first_step = script.find("await runStep(0").unwrap();
        assert!(listener < first_step);
    }

    #[test]
    fn test_navigate_with_status() {
        let script = build(
            r#"
name: status
steps:
  - action: navigate
    url: /
    expect_status: 200
"#,
        );
        assert!(script.contains(r#"await page.goto("https://www.equ.ai/", { timeout: navigationTimeout })"#));
        assert!(script.contains("if (status !== 200)"));
    }

    #[test]
    fn test_verify_links_one_step_per_target() {
        let script = build(
            r#"
name: cta
steps:
  - action: verify_links
    targets:
      - name: About Us
        expected_link: https://www.equ.ai/ja/company
        open_new_page: true
      - name: Contact
        expected_link: https://www.equ.ai/ja/contact
        open_new_page: false
        arrangement: 1
      - name: Learn More
        expected_link: https://www.equ.ai/ja/langx
"#,
        );
        assert!(script.contains(r#"await runStep(0, "link:About Us""#));
        assert!(script.contains(
            r#"clickAndVerify(page, context, page.getByRole("link", { name: "About Us", exact: true }).first(), "https://www.equ.ai/ja/company", true)"#
        ));
        assert!(script.contains(r#"{ name: "Contact", exact: true }).nth(1), "https://www.equ.ai/ja/contact", false)"#));
        assert!(script.contains(r#""https://www.equ.ai/ja/langx", null);
    }, 2);"#));
    }

    #[test]
    fn test_fanned_out_blocks_carry_sub_index() {
        let script = build(
            r#"
name: fan-out
steps:
  - action: navigate
    url: /
  - action: verify_links
    targets:
      - name: About Us
        expected_link: https://www.equ.ai/ja/company
      - name: Contact
        expected_link: https://www.equ.ai/ja/contact
"#,
        );
        // the navigate block closes without a sub index
        assert!(script.contains("    });\n\n    await runStep(1, \"link:About Us\""));
        assert_eq!(script.matches("await runStep(1, ").count(), 2);
        assert!(script.contains("null);\n    }, 0);"));
        assert!(script.contains("null);\n    }, 1);"));
        assert!(script.contains("const id = sub === undefined ? { index } : { index, sub };"));
    }

    #[test]
    fn test_hover_rehovers_before_each_reveal() {
        let script = build(
            r#"
name: research
steps:
  - action: hover
    target:
      role: button
      name: Research
    reveals:
      - name: Papers
        expected_link: https://www.equ.ai/ja/research/papers
      - name: Projects
        expected_link: https://www.equ.ai/ja/research/projects
"#,
        );
        let hover = r#"await page.getByRole("button", { name: "Research", exact: true }).first().hover("#;
        assert_eq!(script.matches(hover).count(), 2);
        assert!(script.contains(r#""hover:button[Research] > Projects""#));
        assert!(script.contains(r#""https://www.equ.ai/ja/research/projects", null);
    }, 1);"#));
    }

    #[test]
    fn test_mobile_context_and_menu() {
        let script = build(
            r#"
name: mobile
device: mobile
steps:
  - action: open_mobile_menu
    toggle:
      role: button
      name: Menu
    reveals:
      name: Contact
  - action: screenshot
    name: HomePage_mobile
    full_page: true
"#,
        );
        assert!(script.contains(r#"browser.newContext({ ...devices["Pixel 5"] })"#));
        assert!(script.contains("await openMobileMenu(page.getByRole(\"button\""));
        assert!(!script.contains("waitForTimeout"));
        assert!(script.contains(r#"page.screenshot({ path: "artifacts/HomePage_mobile.png", fullPage: true })"#));
    }

    #[test]
    fn test_title_matchers() {
        let script = build(
            r#"
name: title
steps:
  - action: expect_title
    equals: 株式会社エキュメノポリス
  - action: expect_title
    contains: "Equmenopolis, Inc."
"#,
        );
        assert!(script.contains(r#"toHaveTitle("株式会社エキュメノポリス""#));
        assert!(script.contains(r#"toHaveTitle(new RegExp("Equmenopolis, Inc\\.")"#));
    }

    #[test]
    fn test_hero_text_filter() {
        let script = build(
            r#"
name: hero
steps:
  - action: expect_text
    within: article div
    has_text: peopleCareers
    contains: Contact
"#,
        );
        assert!(script.contains(r#"page.locator("article div").filter({ hasText: "peopleCareers" }).first()"#));
        assert!(script.contains(r#"text.includes("Contact")"#));
    }
}
