//! Job runner: ties together the record backend, the analyzer and the
//! result writers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use filmstack_core::{
    AnalyzerConfig, CoatingAnalyzer, OptimizationReport, SpectrumPoint, StructureDescription,
};
use filmstack_materials::{catalogue, EntityKind, SqliteRecords};

use crate::config::{DatabaseConfig, JobConfig, WavelengthSpec};

/// Slack on the inclusive end of a wavelength range.
const RANGE_END_SLACK: f64 = 1e-9;

/// Largest grid a range may expand to.
const MAX_RANGE_POINTS: usize = 1_000_000;

/// Results from a spectrum run.
pub struct SpectrumOutput {
    pub structure: StructureDescription,
    pub wavelengths: Vec<f64>,
    pub spectrum: Vec<SpectrumPoint>,
}

/// Results from an optimisation run.
pub struct OptimizationOutput {
    pub initial: StructureDescription,
    pub report: OptimizationReport,
    pub wavelengths: Vec<f64>,
    /// Spectrum of the optimised structure over the simulation wavelengths.
    pub spectrum: Vec<SpectrumPoint>,
}

/// Evenly spaced wavelengths from `start` to `end` inclusive.
///
/// `end` is included when it lies on the grid to within 1e-9 nm. Points are
/// computed as `start + i·step` so rounding does not accumulate.
pub fn wavelength_range(start: f64, end: f64, step: f64) -> Result<Vec<f64>> {
    if !(start.is_finite() && end.is_finite() && step.is_finite()) || start >= end || step <= 0.0 {
        bail!(
            "invalid wavelength range: start={}, end={}, step={} (need start < end and step > 0)",
            start,
            end,
            step
        );
    }
    let intervals = ((end - start) / step + RANGE_END_SLACK / step).floor();
    if !(intervals < MAX_RANGE_POINTS as f64) {
        bail!(
            "wavelength range {}..{} with step {} exceeds {} points",
            start,
            end,
            step,
            MAX_RANGE_POINTS
        );
    }
    let count = intervals as usize + 1;
    Ok((0..count)
        .map(|i| start + step * i as f64)
        .filter(|wl| *wl <= end + RANGE_END_SLACK)
        .collect())
}

/// Resolve a configured wavelength specification into an explicit list.
pub fn resolve_wavelengths(spec: &WavelengthSpec) -> Result<Vec<f64>> {
    let wavelengths = match spec {
        WavelengthSpec::Range { start, end, step } => wavelength_range(*start, *end, *step)?,
        WavelengthSpec::List { values } => values.clone(),
    };
    if wavelengths.is_empty() {
        bail!("no wavelengths to evaluate");
    }
    if let Some(bad) = wavelengths.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
        bail!("wavelength {} nm is not positive", bad);
    }
    Ok(wavelengths)
}

/// Build an analyzer over the configured database, or over the built-in
/// catalogue when no database path is given.
pub fn open_analyzer(
    database: &DatabaseConfig,
    config: &AnalyzerConfig,
) -> Result<CoatingAnalyzer> {
    let analyzer = match &database.path {
        Some(path) => {
            if !path.exists() {
                bail!(
                    "database {} does not exist (create one with `filmstack init-db`)",
                    path.display()
                );
            }
            log::info!("Using database {}", path.display());
            CoatingAnalyzer::open_sqlite(path, config)
                .with_context(|| format!("cannot open database {}", path.display()))?
        }
        None => {
            log::info!("Using built-in catalogue");
            CoatingAnalyzer::from_config(Arc::new(catalogue::builtin()), config)?
        }
    };
    Ok(analyzer)
}

/// Load the job's structure and apply the simulation overrides.
fn job_structure(analyzer: &CoatingAnalyzer, job: &JobConfig) -> Result<StructureDescription> {
    let mut structure = analyzer.load_structure(&job.simulation.structure)?;
    structure.consider_backside = job.simulation.consider_backside;
    if let Some(angle) = job.simulation.angle_degrees {
        structure.angle_degrees = angle;
    }
    structure.validate()?;
    Ok(structure)
}

/// Evaluate the configured structure's spectrum.
pub fn run_spectrum(job: &JobConfig) -> Result<SpectrumOutput> {
    let wavelengths = resolve_wavelengths(&job.simulation.wavelengths)?;
    let analyzer = open_analyzer(&job.database, &job.analyzer_config())?;
    let structure = job_structure(&analyzer, job)?;

    println!(
        "Structure '{}': {} layer(s) on {}, {} wavelengths ({} threads)",
        structure.name,
        structure.layers.len(),
        structure.substrate,
        wavelengths.len(),
        analyzer.engine().num_threads()
    );

    let spectrum = analyzer.evaluate_structure(&structure, &wavelengths)?;
    print_summary(&spectrum);
    Ok(SpectrumOutput {
        structure,
        wavelengths,
        spectrum,
    })
}

/// Optimise the configured structure towards the `[target]` reflection.
pub fn run_optimize(job: &JobConfig) -> Result<OptimizationOutput> {
    let target = job
        .target
        .as_ref()
        .context("optimisation requires a [target] section")?;
    let wavelengths = resolve_wavelengths(&job.simulation.wavelengths)?;
    let analyzer = open_analyzer(&job.database, &job.analyzer_config())?;
    let initial = job_structure(&analyzer, job)?;

    println!(
        "Optimising '{}' ({} layers) against {} target points, at most {} iterations",
        initial.name,
        initial.layers.len(),
        target.wavelengths.len(),
        job.optimizer.max_iterations
    );

    // Surface unknown materials before the first iteration.
    analyzer.evaluate_structure(&initial, &target.wavelengths)?;
    let report = analyzer.optimizer().run(
        &initial,
        &target.wavelengths,
        &target.reflection,
        job.optimizer.max_iterations,
    )?;

    println!(
        "{} after {} iteration(s), residual {}",
        if report.converged { "Converged" } else { "Stopped" },
        report.iterations,
        report
            .residual()
            .map(|r| format!("{:.4e}", r))
            .unwrap_or_else(|| "n/a".into())
    );
    for (before, after) in initial.layers.iter().zip(&report.structure.layers) {
        println!(
            "  {:<12} {:>10.3} nm -> {:>10.3} nm",
            before.material, before.thickness_nm, after.thickness_nm
        );
    }

    let spectrum = analyzer.evaluate_structure(&report.structure, &wavelengths)?;
    Ok(OptimizationOutput {
        initial,
        report,
        wavelengths,
        spectrum,
    })
}

/// Check a job file without evaluating anything.
pub fn validate_job(job: &JobConfig) -> Result<()> {
    let wavelengths = resolve_wavelengths(&job.simulation.wavelengths)?;
    job.optimizer.settings.validate()?;
    if let Some(target) = &job.target {
        if target.wavelengths.len() != target.reflection.len() {
            bail!(
                "[target] has {} wavelengths but {} reflection values",
                target.wavelengths.len(),
                target.reflection.len()
            );
        }
        if let Some(r) = target.reflection.iter().find(|r| !(0.0..=1.0).contains(*r)) {
            bail!("target reflection {} outside [0, 1]", r);
        }
    }
    let analyzer = open_analyzer(&job.database, &job.analyzer_config())?;
    let structure = job_structure(&analyzer, job)?;
    // Resolves every referenced table through the cache.
    analyzer.evaluate_structure(&structure, &wavelengths[..1])?;
    Ok(())
}

fn print_summary(spectrum: &[SpectrumPoint]) {
    let by_reflection =
        |a: &&SpectrumPoint, b: &&SpectrumPoint| a.reflection.total_cmp(&b.reflection);
    if let (Some(lo), Some(hi)) = (
        spectrum.iter().min_by(by_reflection),
        spectrum.iter().max_by(by_reflection),
    ) {
        println!(
            "  R min {:.4} at {:.1} nm, R max {:.4} at {:.1} nm",
            lo.reflection, lo.wavelength_nm, hi.reflection, hi.wavelength_nm
        );
    }
}

/// Write a spectrum to a CSV file with a metadata header.
pub fn write_spectrum_csv(
    path: &Path,
    structure: &StructureDescription,
    wavelengths: &[f64],
    spectrum: &[SpectrumPoint],
) -> Result<()> {
    use std::io::Write;

    if wavelengths.len() != spectrum.len() {
        bail!(
            "{} wavelengths but {} spectrum points",
            wavelengths.len(),
            spectrum.len()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::io::BufWriter::new(
        std::fs::File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
    );

    writeln!(file, "# Filmstack coating spectrum")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# structure: {}", structure.name)?;
    writeln!(file, "# substrate: {}", structure.substrate)?;
    writeln!(
        file,
        "# angle_degrees: {}, consider_backside: {}",
        structure.angle_degrees, structure.consider_backside
    )?;
    for (i, layer) in structure.layers.iter().enumerate() {
        writeln!(
            file,
            "# layer {}: {} {:.4} nm",
            i + 1,
            layer.material,
            layer.thickness_nm
        )?;
    }
    writeln!(file, "#")?;
    writeln!(file, "wavelength_nm,transmission,reflection")?;

    for (wl, point) in wavelengths.iter().zip(spectrum) {
        writeln!(file, "{:.4},{:.8},{:.8}", wl, point.transmission, point.reflection)?;
    }
    file.flush()?;

    println!("Spectrum written to: {}", path.display());
    Ok(())
}

/// Write any serialisable result to a pretty-printed JSON file.
pub fn write_json<T: serde::Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("JSON written to: {}", path.display());
    Ok(())
}

/// Create (or extend) an SQLite database seeded with the built-in catalogue.
///
/// Refuses to touch an existing file unless `force` is set.
pub fn init_database(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (pass --force to import the catalogue into it)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = SqliteRecords::open(path)
        .with_context(|| format!("cannot open database {}", path.display()))?;
    db.create_schema()?;
    let source = catalogue::builtin();
    db.import(&source)?;

    println!(
        "Database initialised: {} ({} materials, {} substrates, {} structures)",
        path.display(),
        source.tables(EntityKind::Material).len(),
        source.tables(EntityKind::Substrate).len(),
        source.structures().count()
    );
    Ok(())
}

/// Print stored structures with their layer stacks.
pub fn list_structures(database: &DatabaseConfig) -> Result<()> {
    let analyzer = open_analyzer(database, &AnalyzerConfig::default())?;
    for name in analyzer.list_structures()? {
        let s = analyzer.load_structure(&name)?;
        let stack = s
            .layers
            .iter()
            .map(|l| format!("{} {:.1}", l.material, l.thickness_nm))
            .collect::<Vec<_>>()
            .join(" / ");
        println!(
            "  {:<16} on {:<12} {}",
            s.name,
            s.substrate,
            if stack.is_empty() { "(uncoated)".to_string() } else { stack }
        );
    }
    Ok(())
}

/// Print stored materials and substrates with their tabulated ranges.
pub fn list_materials(database: &DatabaseConfig) -> Result<()> {
    let analyzer = open_analyzer(database, &AnalyzerConfig::default())?;
    for kind in [EntityKind::Material, EntityKind::Substrate] {
        println!("{}s:", kind);
        for name in analyzer.list_entities(kind)? {
            let samples = analyzer.store().samples(kind, &name)?;
            if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
                println!(
                    "  {:<14} {:>6.0}–{:<6.0} nm  ({} samples)",
                    name,
                    first.wavelength_nm,
                    last.wavelength_nm,
                    samples.len()
                );
            }
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OptimizeConfig, OutputConfig, SimulationConfig, TargetConfig};

    fn job(structure: &str, database: DatabaseConfig) -> JobConfig {
        JobConfig {
            database,
            simulation: SimulationConfig {
                structure: structure.into(),
                wavelengths: WavelengthSpec::Range {
                    start: 450.0,
                    end: 650.0,
                    step: 50.0,
                },
                ambient_index: 1.0,
                angle_degrees: None,
                consider_backside: true,
                threads: None,
            },
            optimizer: OptimizeConfig::default(),
            target: None,
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_range_includes_end() {
        assert_eq!(
            wavelength_range(400.0, 420.0, 5.0).unwrap(),
            vec![400.0, 405.0, 410.0, 415.0, 420.0]
        );
        let fine = wavelength_range(400.0, 401.0, 0.1).unwrap();
        assert_eq!(fine.len(), 11);
        assert!((fine[10] - 401.0).abs() < 1e-9);
    }

    #[test]
    fn test_range_stops_before_overshoot() {
        assert_eq!(wavelength_range(400.0, 412.0, 5.0).unwrap(), vec![400.0, 405.0, 410.0]);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(wavelength_range(500.0, 500.0, 1.0).is_err());
        assert!(wavelength_range(600.0, 500.0, 1.0).is_err());
        assert!(wavelength_range(400.0, 500.0, 0.0).is_err());
        assert!(wavelength_range(400.0, 500.0, -1.0).is_err());
    }

    #[test]
    fn test_range_point_limit() {
        let err = wavelength_range(400.0, 700.0, 1e-300).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        assert!(wavelength_range(400.0, 700.0, f64::MIN_POSITIVE).is_err());
        assert!(wavelength_range(1.0, 1e300, 1.0).is_err());

        let dense = wavelength_range(1.0, 1000.0, 0.001).unwrap();
        assert_eq!(dense.len(), 999_001);
    }

    #[test]
    fn test_resolve_rejects_empty_list() {
        assert!(resolve_wavelengths(&WavelengthSpec::List { values: vec![] }).is_err());
        assert!(resolve_wavelengths(&WavelengthSpec::List { values: vec![500.0, -1.0] }).is_err());
    }

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("spectrum.csv");
        let structure = StructureDescription::new("AR", "BK7").with_layer("MgF2", 99.7);
        let spectrum = vec![
            SpectrumPoint {
                wavelength_nm: 500.0,
                transmission: 0.95,
                reflection: 0.05,
            },
            SpectrumPoint {
                wavelength_nm: 600.0,
                transmission: 0.94,
                reflection: 0.06,
            },
        ];
        write_spectrum_csv(&path, &structure, &[500.0, 600.0], &spectrum).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(data[0], "wavelength_nm,transmission,reflection");
        assert_eq!(data.len(), 3);
        let fields: Vec<f64> = data[1].split(',').map(|f| f.parse().unwrap()).collect();
        assert_eq!(fields, vec![500.0, 0.95, 0.05]);
        assert!(text.contains("# layer 1: MgF2"));
    }

    #[test]
    fn test_csv_length_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        let structure = StructureDescription::new("bare", "BK7");
        assert!(write_spectrum_csv(&path, &structure, &[500.0, 600.0], &[]).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_json_spectrum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrum.json");
        let spectrum = vec![SpectrumPoint {
            wavelength_nm: 550.0,
            transmission: 0.9,
            reflection: 0.1,
        }];
        write_json(&spectrum, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["wavelength_nm"], 550.0);
        assert_eq!(parsed[0]["reflection"], 0.1);
    }

    #[test]
    fn test_spectrum_from_builtin_catalogue() {
        let output = run_spectrum(&job("MgF2-AR", DatabaseConfig::default())).unwrap();
        assert_eq!(output.wavelengths, vec![450.0, 500.0, 550.0, 600.0, 650.0]);
        assert_eq!(output.spectrum.len(), 5);
        assert_eq!(output.structure.layers.len(), 1);
    }

    #[test]
    fn test_init_db_then_run_against_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coatings.db");
        init_database(&path, false).unwrap();
        assert!(init_database(&path, false).is_err());
        init_database(&path, true).unwrap();

        let database = DatabaseConfig {
            path: Some(path),
            cache_capacity: Some(2),
        };
        let from_db = run_spectrum(&job("HR-7", database)).unwrap();
        let builtin = run_spectrum(&job("HR-7", DatabaseConfig::default())).unwrap();
        for (a, b) in from_db.spectrum.iter().zip(&builtin.spectrum) {
            assert!((a.reflection - b.reflection).abs() < 1e-12);
        }
    }

    #[test]
    fn test_missing_database_reported() {
        let dir = tempfile::tempdir().unwrap();
        let database = DatabaseConfig {
            path: Some(dir.path().join("absent.db")),
            cache_capacity: None,
        };
        assert!(open_analyzer(&database, &AnalyzerConfig::default()).is_err());
    }

    #[test]
    fn test_optimize_requires_target() {
        assert!(run_optimize(&job("MgF2-AR", DatabaseConfig::default())).is_err());
    }

    #[test]
    fn test_optimize_zero_iterations() {
        let mut j = job("V-coat", DatabaseConfig::default());
        j.optimizer.max_iterations = 0;
        j.target = Some(TargetConfig {
            wavelengths: vec![550.0],
            reflection: vec![0.0],
        });
        let output = run_optimize(&j).unwrap();
        assert_eq!(output.report.iterations, 0);
        assert_eq!(output.report.structure, output.initial);
        assert_eq!(output.spectrum.len(), output.wavelengths.len());
    }

    #[test]
    fn test_validate_job() {
        let mut j = job("HR-7", DatabaseConfig::default());
        validate_job(&j).unwrap();
        j.target = Some(TargetConfig {
            wavelengths: vec![550.0, 600.0],
            reflection: vec![0.9],
        });
        assert!(validate_job(&j).is_err());
        assert!(validate_job(&job("missing", DatabaseConfig::default())).is_err());
    }
}
