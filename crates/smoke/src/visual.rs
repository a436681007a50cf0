//! Screenshot baselines and pixel comparison

use std::path::{Path, PathBuf};
use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::SmokeConfig;
use crate::error::{SmokeError, SmokeResult};

/// Per-channel difference tolerated before a pixel counts as changed
const CHANNEL_TOLERANCE: i32 = 5;

/// Result of comparing one screenshot with its baseline
#[derive(Debug, Clone)]
pub struct VisualDiff {
    /// Whether the images match (within threshold)
    pub matches: bool,
    pub diff_percent: f64,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    /// Red-highlight image, written only when pixels differ
    pub diff_image_path: Option<PathBuf>,
    pub actual_hash: String,
    pub baseline_hash: String,
}

/// Compares screenshots in the artifacts directory against stored baselines
pub struct VisualTester {
    artifacts_dir: PathBuf,
    baseline_dir: PathBuf,
    diff_dir: PathBuf,
    threshold: f64,
    /// Create missing baselines from the current screenshot
    auto_update: bool,
}

impl VisualTester {
    pub fn new(config: &SmokeConfig) -> SmokeResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;

        Ok(Self {
            artifacts_dir: config.artifacts_dir.clone(),
            baseline_dir: config.baseline_dir.clone(),
            diff_dir: config.diff_dir.clone(),
            threshold: config.visual_threshold,
            auto_update: config.update_baselines,
        })
    }

    fn actual_path(&self, name: &str) -> PathBuf {
        self.artifacts_dir.join(format!("{}.png", name))
    }

    fn baseline_path(&self, name: &str) -> PathBuf {
        self.baseline_dir.join(format!("{}.png", name))
    }

    /// Compare a screenshot against its baseline
    pub fn compare(&self, name: &str, threshold: Option<f64>) -> SmokeResult<VisualDiff> {
        let threshold = threshold.unwrap_or(self.threshold);
        let actual_path = self.actual_path(name);
        let baseline_path = self.baseline_path(name);

        if !actual_path.exists() {
            return Err(SmokeError::VisualRegression(format!(
                "screenshot not found: {}",
                actual_path.display()
            )));
        }

        let actual_hash = hash_file(&actual_path)?;

        if !baseline_path.exists() {
            if !self.auto_update {
                return Err(SmokeError::BaselineNotFound(baseline_path.display().to_string()));
            }
            info!("Creating baseline for '{}'", name);
            std::fs::copy(&actual_path, &baseline_path)?;
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: 0,
                diff_image_path: None,
                baseline_hash: actual_hash.clone(),
                actual_hash,
            });
        }

        let baseline_hash = hash_file(&baseline_path)?;
        let actual = image::open(&actual_path)?.to_rgba8();

        if actual_hash == baseline_hash {
            debug!("'{}' is byte-identical to its baseline", name);
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: actual.width() as u64 * actual.height() as u64,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        let baseline = image::open(&baseline_path)?.to_rgba8();
        if actual.dimensions() != baseline.dimensions() {
            warn!(
                "'{}' dimensions differ: actual {:?} vs baseline {:?}",
                name,
                actual.dimensions(),
                baseline.dimensions()
            );
        }

        let (diff_pixels, total_pixels, diff_img) = diff_images(&actual, &baseline);
        let diff_percent = if total_pixels == 0 {
            0.0
        } else {
            diff_pixels as f64 / total_pixels as f64 * 100.0
        };
        let matches = diff_percent <= threshold;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.diff_dir.join(format!("{}-diff.png", name));
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "Visual regression in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
                name, diff_percent, threshold
            );
        }

        Ok(VisualDiff {
            matches,
            diff_percent,
            diff_pixels,
            total_pixels,
            diff_image_path,
            actual_hash,
            baseline_hash,
        })
    }

    /// Replace the baseline with the current screenshot
    pub fn update_baseline(&self, name: &str) -> SmokeResult<()> {
        let actual_path = self.actual_path(name);
        if !actual_path.exists() {
            return Err(SmokeError::VisualRegression(format!(
                "cannot update baseline, screenshot not found: {}",
                actual_path.display()
            )));
        }

        std::fs::copy(&actual_path, self.baseline_path(name))?;
        info!("Updated baseline for '{}'", name);
        Ok(())
    }

    /// Names of all stored baselines, sorted
    pub fn list_baselines(&self) -> SmokeResult<Vec<String>> {
        let mut names = png_stems(&self.baseline_dir)?;
        names.sort();
        Ok(names)
    }

    /// Names of all screenshots currently in the artifacts directory
    pub fn list_screenshots(&self) -> SmokeResult<Vec<String>> {
        if !self.artifacts_dir.exists() {
            return Ok(Vec::new());
        }
        png_stems(&self.artifacts_dir)
    }

    /// Remove diff images from earlier runs
    pub fn clean_diffs(&self) -> SmokeResult<()> {
        for entry in std::fs::read_dir(&self.diff_dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Count differing pixels over the union of both images. Pixels outside the
/// overlap always count as different.
fn diff_images(actual: &RgbaImage, baseline: &RgbaImage) -> (u64, u64, RgbaImage) {
    let width = actual.width().max(baseline.width());
    let height = actual.height().max(baseline.height());
    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let a = (x < actual.width() && y < actual.height()).then(|| actual.get_pixel(x, y));
            let b = (x < baseline.width() && y < baseline.height()).then(|| baseline.get_pixel(x, y));

            match (a, b) {
                (Some(a), Some(b)) if !pixels_differ(a, b) => {
                    let [r, g, bl, _] = a.0;
                    diff_img.put_pixel(x, y, Rgba([r / 2, g / 2, bl / 2, 128]));
                }
                _ => {
                    diff_pixels += 1;
                    diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
                }
            }
        }
    }

    (diff_pixels, width as u64 * height as u64, diff_img)
}

fn pixels_differ(a: &Rgba<u8>, b: &Rgba<u8>) -> bool {
    a.0.iter()
        .zip(b.0.iter())
        .any(|(x, y)| (*x as i32 - *y as i32).abs() > CHANNEL_TOLERANCE)
}

fn hash_file(path: &Path) -> SmokeResult<String> {
    let data = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&data)))
}

fn png_stems(dir: &Path) -> SmokeResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "png").unwrap_or(false) {
            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().to_string());
            }
        }
    }
    Ok(names)
}
