//! TOML configuration deserialisation for spectrum and optimisation jobs.
//!
//! ```toml
//! [database]
//! path = "coatings.db"        # omit to use the built-in catalogue
//!
//! [simulation]
//! structure = "MgF2-AR"
//! wavelengths = { start = 400.0, end = 800.0, step = 5.0 }
//!
//! [optimizer]
//! max_iterations = 200
//! learning_rate = 1e5
//!
//! [target]
//! wavelengths = [500.0, 550.0, 600.0]
//! reflection = [0.0, 0.0, 0.0]
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use filmstack_core::{AnalyzerConfig, EngineConfig, OptimizerConfig};
use filmstack_materials::CacheConfig;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub optimizer: OptimizeConfig,
    /// Required by `optimize`, ignored by `spectrum`.
    pub target: Option<TargetConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where structures and optical constants come from.
#[derive(Debug, Default, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database. The built-in catalogue is used when absent.
    pub path: Option<PathBuf>,
    /// Maximum number of cached sample tables (default: unbounded).
    pub cache_capacity: Option<usize>,
}

/// Simulation parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// Name of the stored structure.
    pub structure: String,
    pub wavelengths: WavelengthSpec,
    /// Refractive index of the incidence medium.
    #[serde(default = "default_ambient_index")]
    pub ambient_index: f64,
    /// Angle of incidence (degrees); overrides the stored normal incidence.
    pub angle_degrees: Option<f64>,
    /// Include the substrate back face (default: true).
    #[serde(default = "default_true")]
    pub consider_backside: bool,
    /// Dedicated worker threads (default: Rayon's global pool).
    pub threads: Option<usize>,
}

fn default_ambient_index() -> f64 {
    1.0
}

/// Wavelength specification: either a range or explicit list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WavelengthSpec {
    Range { start: f64, end: f64, step: f64 },
    List { values: Vec<f64> },
}

/// Optimizer settings plus the iteration cap.
#[derive(Debug, Deserialize)]
pub struct OptimizeConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(flatten)]
    pub settings: OptimizerConfig,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            settings: OptimizerConfig::default(),
        }
    }
}

fn default_max_iterations() -> usize {
    100
}

/// Target reflection spectrum for `optimize`.
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub wavelengths: Vec<f64>,
    pub reflection: Vec<f64>,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save spectra as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also save spectra and reports as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Library-side configuration assembled from the job sections.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            cache: CacheConfig {
                capacity: self.database.cache_capacity,
            },
            engine: EngineConfig {
                threads: self.simulation.threads,
            },
            optimizer: self.optimizer.settings.clone(),
            ambient_index: self.simulation.ambient_index,
        }
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config: JobConfig =
        toml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_job_uses_defaults() {
        let job: JobConfig = toml::from_str(
            r#"
            [simulation]
            structure = "MgF2-AR"
            wavelengths = { start = 400.0, end = 700.0, step = 10.0 }
            "#,
        )
        .unwrap();
        assert!(job.database.path.is_none());
        assert!(job.target.is_none());
        assert!(matches!(
            job.simulation.wavelengths,
            WavelengthSpec::Range { step, .. } if step == 10.0
        ));
        assert!(job.simulation.consider_backside);
        assert_eq!(job.optimizer.max_iterations, 100);
        assert_eq!(job.optimizer.settings, OptimizerConfig::default());
        assert!(job.output.save_csv);
        assert!(!job.output.save_json);
        assert_eq!(job.output.directory, "./output");
    }

    #[test]
    fn test_full_job() {
        let job: JobConfig = toml::from_str(
            r#"
            [database]
            path = "coatings.db"
            cache_capacity = 16

            [simulation]
            structure = "V-coat"
            wavelengths = { values = [450.0, 550.0, 650.0] }
            angle_degrees = 30.0
            threads = 2

            [optimizer]
            max_iterations = 25
            learning_rate = 50.0
            parallel_probes = false

            [target]
            wavelengths = [550.0]
            reflection = [0.0]

            [output]
            directory = "out"
            save_json = true
            "#,
        )
        .unwrap();
        assert_eq!(job.database.path.as_deref(), Some(Path::new("coatings.db")));
        match &job.simulation.wavelengths {
            WavelengthSpec::List { values } => assert_eq!(values.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(job.optimizer.max_iterations, 25);
        assert_eq!(job.optimizer.settings.learning_rate, 50.0);
        assert!(!job.optimizer.settings.parallel_probes);
        assert_eq!(job.optimizer.settings.tolerance, 1e-4);

        let config = job.analyzer_config();
        assert_eq!(config.cache.capacity, Some(16));
        assert_eq!(config.engine.threads, Some(2));
        assert_eq!(config.optimizer.learning_rate, 50.0);
    }

    #[test]
    fn test_missing_structure_is_rejected() {
        let parsed: Result<JobConfig, _> = toml::from_str(
            r#"
            [simulation]
            wavelengths = { values = [500.0] }
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        std::fs::write(
            &path,
            "[simulation]\nstructure = \"HR-7\"\nwavelengths = { values = [550.0] }\n",
        )
        .unwrap();
        let job = load_config(&path).unwrap();
        assert_eq!(job.simulation.structure, "HR-7");
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
