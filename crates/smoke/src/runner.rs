//! Main runner that orchestrates the preflight, Playwright, and visual regression

use std::path::PathBuf;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::SmokeConfig;
use crate::error::{SmokeError, SmokeResult};
use crate::playwright::{PlaywrightDriver, StepResult};
use crate::probe::SiteProbe;
use crate::scenario::Scenario;
use crate::visual::VisualTester;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub console_errors: Vec<String>,
    pub screenshots: Vec<String>,
    pub visual_diffs: Vec<VisualDiffResult>,
    pub error: Option<String>,
}

impl TestResult {
    fn failed(name: &str, error: &SmokeError) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            steps: vec![],
            console_errors: vec![],
            screenshots: vec![],
            visual_diffs: vec![],
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualDiffResult {
    pub name: String,
    pub matches: bool,
    pub diff_percent: f64,
    pub diff_image_path: Option<String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub started_at: DateTime<Utc>,
    pub base_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Loaded scenarios left out by a tag or name selection
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

pub struct SmokeRunner {
    config: SmokeConfig,
    preflight_done: bool,
}

impl SmokeRunner {
    pub fn new(config: SmokeConfig) -> Self {
        Self {
            config,
            preflight_done: false,
        }
    }

    pub fn config(&self) -> &SmokeConfig {
        &self.config
    }

    /// Load and validate every scenario in the configured directory
    pub fn load_scenarios(&self) -> SmokeResult<Vec<Scenario>> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        Scenario::validate_all(&scenarios)?;
        Ok(scenarios)
    }

    /// Check that the site answers before any browser is started
    pub async fn preflight(&mut self) -> SmokeResult<()> {
        if self.preflight_done {
            return Ok(());
        }

        PlaywrightDriver::check_installed().await?;
        SiteProbe::new(self.config.base_url.clone())?
            .wait_until_reachable(self.config.startup_timeout())
            .await?;

        self.preflight_done = true;
        Ok(())
    }

    pub async fn run_all(&mut self) -> SmokeResult<SuiteResult> {
        let scenarios = self.load_scenarios()?;
        self.run_scenarios(&scenarios).await
    }

    pub async fn run_tagged(&mut self, tag: &str) -> SmokeResult<SuiteResult> {
        let (tagged, skipped) = select(self.load_scenarios()?, |s| s.tags.iter().any(|t| t == tag));
        if skipped > 0 {
            info!("Skipping {} scenario(s) not tagged '{}'", skipped, tag);
        }
        self.run_selected(&tagged, skipped).await
    }

    pub async fn run_named(&mut self, name: &str) -> SmokeResult<SuiteResult> {
        let (named, skipped) = select(self.load_scenarios()?, |s| s.name == name);
        if named.is_empty() {
            return Err(SmokeError::ScenarioParse(format!("Scenario not found: {}", name)));
        }
        self.run_selected(&named, skipped).await
    }

    /// Run scenarios one after another; a failing scenario never stops the suite
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> SmokeResult<SuiteResult> {
        self.run_selected(scenarios, 0).await
    }

    async fn run_selected(&mut self, scenarios: &[Scenario], skipped: usize) -> SmokeResult<SuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        self.preflight().await?;

        info!("Running {} scenario(s) against {}", scenarios.len(), self.config.base_url);

        for scenario in scenarios {
            let result = match self.run_scenario(scenario).await {
                Ok(result) => result,
                Err(e) => TestResult::failed(&scenario.name, &e),
            };

            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(SuiteResult {
            started_at,
            base_url: self.config.base_url.clone(),
            total: scenarios.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario in its own browser session
    pub async fn run_scenario(&self, scenario: &Scenario) -> SmokeResult<TestResult> {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        scenario.validate()?;

        let driver = PlaywrightDriver::new(self.config.clone())?;
        let run = driver.run(scenario).await?;

        let mut test_error = run.first_failure().map(|step| {
            SmokeError::StepFailed {
                step: step.label.clone(),
                reason: step.error.clone().unwrap_or_else(|| "failed".to_string()),
            }
            .to_string()
        });
        if test_error.is_none() && !run.ok {
            test_error = Some("scenario reported failure without a failing step".to_string());
        }

        // Only screenshots whose step actually ran are on disk
        let screenshots: Vec<String> = scenario
            .screenshot_names()
            .into_iter()
            .filter(|name| {
                run.steps
                    .iter()
                    .any(|s| s.ok && s.label == format!("screenshot:{}", name))
            })
            .map(String::from)
            .collect();

        let mut visual_diffs = Vec::new();
        if scenario.visual_regression && test_error.is_none() {
            let tester = VisualTester::new(&self.config)?;

            for name in &screenshots {
                match tester.compare(name, Some(scenario.visual_threshold)) {
                    Ok(diff) => {
                        if !diff.matches {
                            test_error = Some(
                                SmokeError::ScreenshotMismatch {
                                    name: name.clone(),
                                    diff_percent: diff.diff_percent,
                                    threshold: scenario.visual_threshold,
                                }
                                .to_string(),
                            );
                        }
                        visual_diffs.push(VisualDiffResult {
                            name: name.clone(),
                            matches: diff.matches,
                            diff_percent: diff.diff_percent,
                            diff_image_path: diff
                                .diff_image_path
                                .map(|p| p.to_string_lossy().to_string()),
                        });
                    }
                    Err(SmokeError::BaselineNotFound(path)) => {
                        info!("No baseline at {} - run with --update-baselines to create it", path);
                    }
                    Err(e) => {
                        test_error = Some(format!("Visual comparison error: {}", e));
                    }
                }
            }
        }

        Ok(TestResult {
            name: scenario.name.clone(),
            success: test_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps: run.steps,
            console_errors: run.console_errors,
            screenshots,
            visual_diffs,
            error: test_error,
        })
    }

    /// Copy every current screenshot over its baseline
    pub fn update_baselines(&self) -> SmokeResult<usize> {
        let tester = VisualTester::new(&self.config)?;
        tester.clean_diffs()?;

        let names = tester.list_screenshots()?;
        for name in &names {
            tester.update_baseline(name)?;
        }
        Ok(names.len())
    }

    /// Write suite results to `smoke-results.json` in the output directory
    pub fn write_results(&self, results: &SuiteResult) -> SmokeResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("smoke-results.json");
        std::fs::write(&path, serde_json::to_string_pretty(results)?)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Split loaded scenarios into those to run and a count of the rest
fn select<F>(scenarios: Vec<Scenario>, keep: F) -> (Vec<Scenario>, usize)
where
    F: Fn(&Scenario) -> bool,
{
    let total = scenarios.len();
    let selected: Vec<Scenario> = scenarios.into_iter().filter(|s| keep(s)).collect();
    let skipped = total - selected.len();
    (selected, skipped)
}
