//! Playwright browser automation
//!
//! Each scenario runs as one `node` process executing the script built by
//! [`ScriptBuilder`]. Progress comes back as JSON lines on stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::SmokeConfig;
use crate::error::{SmokeError, SmokeResult};
use crate::scenario::Scenario;
use crate::script::ScriptBuilder;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = SmokeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(SmokeError::Config(format!("unknown browser '{}'", other))),
        }
    }
}

/// Result of one `runStep` block in the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the scenario step
    pub index: usize,
    /// Fixture position within a `verify_links` or `hover` step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<usize>,
    pub label: String,
    pub ok: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A line of the script's event stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Step(StepResult),
    Log { message: String },
    Done {
        ok: bool,
        #[serde(default)]
        console_errors: Vec<String>,
    },
}

impl ScriptEvent {
    /// Parse one stdout line; anything that isn't an event is `None`
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

/// Everything a finished scenario process reported
#[derive(Debug, Clone, Default)]
pub struct ScenarioRun {
    pub steps: Vec<StepResult>,
    pub console_errors: Vec<String>,
    pub ok: bool,
}

impl ScenarioRun {
    /// Fold a complete event stream. A stream without `done` means the
    /// script died before reporting.
    pub fn from_events(events: Vec<ScriptEvent>, stderr: &str) -> SmokeResult<Self> {
        let mut run = ScenarioRun::default();
        let mut finished = false;

        for event in events {
            match event {
                ScriptEvent::Step(step) => run.steps.push(step),
                ScriptEvent::Log { message } => info!("[SCENARIO LOG] {}", message),
                ScriptEvent::Done { ok, console_errors } => {
                    run.ok = ok && run.steps.iter().all(|s| s.ok);
                    run.console_errors = console_errors;
                    finished = true;
                }
            }
        }

        if !finished {
            return Err(SmokeError::Playwright(format!(
                "script exited without a result:\n{}",
                stderr.trim()
            )));
        }

        Ok(run)
    }

    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.ok)
    }
}

/// Drives Playwright through generated Node scripts
pub struct PlaywrightDriver {
    config: SmokeConfig,
}

impl PlaywrightDriver {
    pub fn new(config: SmokeConfig) -> SmokeResult<Self> {
        std::fs::create_dir_all(&config.artifacts_dir)?;
        Ok(Self { config })
    }

    /// Check if Playwright is installed
    pub async fn check_installed() -> SmokeResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(SmokeError::PlaywrightNotFound),
        }
    }

    /// Where a screenshot step of this driver writes
    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        ScriptBuilder::new(&self.config).screenshot_path(name)
    }

    /// Run one scenario in a fresh browser session
    pub async fn run(&self, scenario: &Scenario) -> SmokeResult<ScenarioRun> {
        let script = ScriptBuilder::new(&self.config).build(scenario);

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join(format!("{}.js", file_stem(&scenario.name)));
        std::fs::write(&script_path, &script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let mut child = Command::new("node")
            .arg(&script_path)
            .env("NODE_PATH", &self.config.node_modules)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SmokeError::Playwright(format!("failed to spawn node: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SmokeError::Playwright("node stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SmokeError::Playwright("node stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let collect = async {
            let mut events = Vec::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                match ScriptEvent::parse_line(&line) {
                    Some(event) => {
                        if let ScriptEvent::Step(step) = &event {
                            debug!(
                                "step {} {} ({} ms)",
                                step.label,
                                if step.ok { "ok" } else { "failed" },
                                step.duration_ms
                            );
                        }
                        events.push(event);
                    }
                    None => debug!("node: {}", line),
                }
            }
            child.wait().await?;
            Ok::<_, SmokeError>(events)
        };

        let timeout = self.config.scenario_timeout();
        let outcome = tokio::time::timeout(timeout, collect).await;
        let events = match outcome {
            Ok(events) => events?,
            Err(_) => {
                terminate(&mut child).await;
                return Err(SmokeError::Timeout(format!(
                    "scenario '{}' after {}s",
                    scenario.name,
                    timeout.as_secs()
                )));
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();
        ScenarioRun::from_events(events, &stderr)
    }
}

/// SIGTERM first so the browser can close, then kill
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(Duration::from_secs(2), child.wait()).await.is_ok()
            {
                return;
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill node process: {}", e);
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert!("netscape".parse::<Browser>().is_err());
    }

    #[test]
    fn test_parse_event_lines() {
        let step = ScriptEvent::parse_line(
            r#"{"event":"step","index":2,"label":"link:About Us","ok":false,"duration_ms":3004,"error":"Timeout 3000ms exceeded"}"#,
        )
        .unwrap();
        match step {
            ScriptEvent::Step(s) => {
                assert_eq!(s.index, 2);
                assert_eq!(s.sub, None);
                assert!(!s.ok);
                assert_eq!(s.error.as_deref(), Some("Timeout 3000ms exceeded"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(
            ScriptEvent::parse_line(r#"{"event":"done","ok":true,"console_errors":[]}"#),
            Some(ScriptEvent::Done { ok: true, console_errors: vec![] })
        );
        assert_eq!(ScriptEvent::parse_line("Downloading Chromium..."), None);
        assert_eq!(ScriptEvent::parse_line(r#"{"event":"unknown"}"#), None);
    }

    #[test]
    fn test_fanned_out_steps_keep_distinct_ids() {
        let lines = [
            r#"{"event":"step","index":1,"sub":0,"label":"link:About Us","ok":true,"duration_ms":900}"#,
            r#"{"event":"step","index":1,"sub":1,"label":"link:See Open Positions","ok":false,"duration_ms":3001,"error":"no new page opened"}"#,
        ];
        let steps: Vec<StepResult> = lines
            .iter()
            .map(|line| match ScriptEvent::parse_line(line) {
                Some(ScriptEvent::Step(step)) => step,
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!((steps[0].index, steps[0].sub), (1, Some(0)));
        assert_eq!((steps[1].index, steps[1].sub), (1, Some(1)));

        let json = serde_json::to_string(&steps[1]).unwrap();
        assert!(json.contains(r#""sub":1"#));
    }

    #[test]
    fn test_run_from_events() {
        let events = vec![
            ScriptEvent::Step(StepResult {
                index: 0,
                sub: None,
                label: "navigate:/".to_string(),
                ok: true,
                duration_ms: 900,
                error: None,
            }),
            ScriptEvent::Log { message: "hello".to_string() },
            ScriptEvent::Step(StepResult {
                index: 1,
                sub: None,
                label: "expect_no_console_errors".to_string(),
                ok: false,
                duration_ms: 10,
                error: Some("1 console error(s): boom".to_string()),
            }),
            ScriptEvent::Done {
                ok: false,
                console_errors: vec!["boom".to_string()],
            },
        ];

        let run = ScenarioRun::from_events(events, "").unwrap();
        assert!(!run.ok);
        assert_eq!(run.steps.len(), 2);
        assert_eq!(run.console_errors, vec!["boom"]);
        assert_eq!(run.first_failure().unwrap().index, 1);
    }

    #[test]
    fn test_missing_done_is_an_error() {
        let err = ScenarioRun::from_events(vec![], "Error: Cannot find module '@playwright/test'")
            .unwrap_err();
        assert!(err.to_string().contains("Cannot find module"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("cta-buttons"), "cta-buttons");
        assert_eq!(file_stem("hero section/ja"), "hero_section_ja");
    }
}
