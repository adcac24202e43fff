//! Plain-text data tables.
//!
//! Every table is a tab-delimited file whose first line names the columns
//! (parameter columns carry their unit in brackets). Rows append atomically;
//! a header that does not match the expected schema is reported as store
//! corruption. Missing values are written as `--`.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::GenerationMethod;
use crate::error::{Error, Result};
use crate::parallel::runtime::TimingRecord;
use crate::params::{ParameterVector, Range, Scale};
use crate::units::{Quantity, Unit};

const MISSING: &str = "--";

// ---------------------------------------------------------------------------
// Shared file plumbing
// ---------------------------------------------------------------------------

fn write_header(path: &Path, columns: &[String]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", columns.join("\t"))?;
    Ok(())
}

fn append_line(path: &Path, fields: &[String]) -> Result<()> {
    for field in fields {
        if field.contains('\t') || field.contains('\n') {
            return Err(Error::StoreCorruption {
                path: path.to_path_buf(),
                message: format!("field '{field}' contains a delimiter"),
            });
        }
    }
    let mut file = OpenOptions::new().append(true).open(path)?;
    writeln!(file, "{}", fields.join("\t"))?;
    file.flush()?;
    Ok(())
}

fn read_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines();
    let header = lines.next().ok_or_else(|| Error::StoreCorruption {
        path: path.to_path_buf(),
        message: "missing header line".to_string(),
    })?;
    let columns: Vec<String> = header.split('\t').map(str::to_string).collect();
    let mut rows = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<String> = line.split('\t').map(str::to_string).collect();
        if fields.len() != columns.len() {
            return Err(Error::StoreCorruption {
                path: path.to_path_buf(),
                message: format!(
                    "row {} has {} fields, expected {}",
                    i + 1,
                    fields.len(),
                    columns.len()
                ),
            });
        }
        rows.push(fields);
    }
    Ok((columns, rows))
}

fn check_schema(path: &Path, found: &[String], expected: &[String]) -> Result<()> {
    if found != expected {
        return Err(Error::StoreCorruption {
            path: path.to_path_buf(),
            message: format!(
                "schema drift: found columns [{}], expected [{}]",
                found.join(", "),
                expected.join(", ")
            ),
        });
    }
    Ok(())
}

fn parse_field<T: std::str::FromStr>(path: &Path, field: &str, what: &str) -> Result<T> {
    field.parse().map_err(|_| Error::StoreCorruption {
        path: path.to_path_buf(),
        message: format!("malformed {what} value '{field}'"),
    })
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_time(path: &Path, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(field)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::StoreCorruption {
            path: path.to_path_buf(),
            message: format!("malformed timestamp '{field}'"),
        })
}

/// Atomic whole-file rewrite: write a temp sibling, then rename over.
fn rewrite(path: &Path, columns: &[String], rows: &[Vec<String>]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        writeln!(file, "{}", columns.join("\t"))?;
        for row in rows {
            writeln!(file, "{}", row.join("\t"))?;
        }
        file.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individuals
// ---------------------------------------------------------------------------

/// `(simulation_name, individual_name)` pairs of one generation.
#[derive(Debug, Clone)]
pub struct IndividualsTable {
    path: PathBuf,
}

impl IndividualsTable {
    fn columns() -> Vec<String> {
        vec!["simulation_name".into(), "individual_name".into()]
    }

    pub fn create(path: PathBuf) -> Result<Self> {
        write_header(&path, &Self::columns())?;
        Ok(IndividualsTable { path })
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let (columns, _) = read_table(&path)?;
        check_schema(&path, &columns, &Self::columns())?;
        Ok(IndividualsTable { path })
    }

    pub fn append(&self, simulation_name: &str, individual_name: &str) -> Result<()> {
        append_line(
            &self.path,
            &[simulation_name.to_string(), individual_name.to_string()],
        )
    }

    pub fn rows(&self) -> Result<Vec<(String, String)>> {
        let (columns, rows) = read_table(&self.path)?;
        check_schema(&self.path, &columns, &Self::columns())?;
        Ok(rows
            .into_iter()
            .map(|mut r| (std::mem::take(&mut r[0]), std::mem::take(&mut r[1])))
            .collect())
    }

    pub fn simulation_names(&self) -> Result<Vec<String>> {
        Ok(self.rows()?.into_iter().map(|(sim, _)| sim).collect())
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Parameter values per simulation; one column per free label, with units in
/// the header.
#[derive(Debug, Clone)]
pub struct ParametersTable {
    path: PathBuf,
    labels: Vec<(String, Unit)>,
}

impl ParametersTable {
    fn columns(labels: &[(String, Unit)]) -> Vec<String> {
        let mut columns = vec!["simulation_name".to_string()];
        for (label, unit) in labels {
            if *unit == Unit::None {
                columns.push(label.clone());
            } else {
                columns.push(format!("{label} [{}]", unit.symbol()));
            }
        }
        columns
    }

    fn labels_from_columns(path: &Path, columns: &[String]) -> Result<Vec<(String, Unit)>> {
        if columns.first().map(String::as_str) != Some("simulation_name") {
            return Err(Error::StoreCorruption {
                path: path.to_path_buf(),
                message: "first column must be simulation_name".to_string(),
            });
        }
        let mut labels = Vec::new();
        for column in &columns[1..] {
            if let Some((label, rest)) = column.split_once(" [") {
                let symbol = rest.strip_suffix(']').ok_or_else(|| Error::StoreCorruption {
                    path: path.to_path_buf(),
                    message: format!("malformed column header '{column}'"),
                })?;
                let unit: Unit = symbol.parse().map_err(|_| Error::StoreCorruption {
                    path: path.to_path_buf(),
                    message: format!("unknown unit in column header '{column}'"),
                })?;
                labels.push((label.to_string(), unit));
            } else {
                labels.push((column.clone(), Unit::None));
            }
        }
        Ok(labels)
    }

    pub fn create(path: PathBuf, labels: Vec<(String, Unit)>) -> Result<Self> {
        write_header(&path, &Self::columns(&labels))?;
        Ok(ParametersTable { path, labels })
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let (columns, _) = read_table(&path)?;
        let labels = Self::labels_from_columns(&path, &columns)?;
        Ok(ParametersTable { path, labels })
    }

    pub fn labels(&self) -> &[(String, Unit)] {
        &self.labels
    }

    pub fn append(&self, simulation_name: &str, values: &ParameterVector) -> Result<()> {
        let mut fields = vec![simulation_name.to_string()];
        for (label, unit) in &self.labels {
            let value = values.get(label).ok_or_else(|| {
                Error::Configuration(format!("missing value for free parameter '{label}'"))
            })?;
            let converted = value.to(*unit)?;
            fields.push(converted.value.to_string());
        }
        append_line(&self.path, &fields)
    }

    /// All rows as (simulation name, parameter vector in column units).
    pub fn rows(&self) -> Result<Vec<(String, ParameterVector)>> {
        let (columns, rows) = read_table(&self.path)?;
        let labels = Self::labels_from_columns(&self.path, &columns)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut vector = ParameterVector::new();
            for (i, (label, unit)) in labels.iter().enumerate() {
                let value: f64 = parse_field(&self.path, &row[i + 1], "parameter")?;
                vector.push(label.clone(), Quantity::new(value, *unit));
            }
            out.push((row[0].clone(), vector));
        }
        Ok(out)
    }

    pub fn values_for(&self, simulation_name: &str) -> Result<Option<ParameterVector>> {
        Ok(self
            .rows()?
            .into_iter()
            .find(|(sim, _)| sim == simulation_name)
            .map(|(_, v)| v))
    }

    pub fn simulation_names(&self) -> Result<Vec<String>> {
        Ok(self.rows()?.into_iter().map(|(sim, _)| sim).collect())
    }

    /// Drop the rows of the given simulations (used when submissions failed).
    pub fn remove_simulations(&self, names: &[String]) -> Result<()> {
        let (columns, rows) = read_table(&self.path)?;
        let kept: Vec<Vec<String>> = rows
            .into_iter()
            .filter(|r| !names.contains(&r[0]))
            .collect();
        rewrite(&self.path, &columns, &kept)
    }
}

// ---------------------------------------------------------------------------
// Chi squared
// ---------------------------------------------------------------------------

/// χ² score per simulation.
#[derive(Debug, Clone)]
pub struct ChiSquaredTable {
    path: PathBuf,
}

impl ChiSquaredTable {
    fn columns() -> Vec<String> {
        vec!["simulation_name".into(), "chi_squared".into()]
    }

    pub fn create(path: PathBuf) -> Result<Self> {
        write_header(&path, &Self::columns())?;
        Ok(ChiSquaredTable { path })
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let (columns, _) = read_table(&path)?;
        check_schema(&path, &columns, &Self::columns())?;
        Ok(ChiSquaredTable { path })
    }

    pub fn append(&self, simulation_name: &str, chi_squared: f64) -> Result<()> {
        append_line(
            &self.path,
            &[simulation_name.to_string(), chi_squared.to_string()],
        )
    }

    pub fn rows(&self) -> Result<Vec<(String, f64)>> {
        let (columns, rows) = read_table(&self.path)?;
        check_schema(&self.path, &columns, &Self::columns())?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let chi2: f64 = parse_field(&self.path, &row[1], "chi_squared")?;
            out.push((row[0].clone(), chi2));
        }
        Ok(out)
    }

    /// The (simulation name, χ²) pair with the lowest score.
    pub fn best(&self) -> Result<Option<(String, f64)>> {
        Ok(self
            .rows()?
            .into_iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)))
    }
}

// ---------------------------------------------------------------------------
// Generations
// ---------------------------------------------------------------------------

/// One row of the generations table.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRecord {
    pub name: String,
    pub index: Option<u32>,
    pub method: GenerationMethod,
    pub wavelength_grid_level: u32,
    pub representation: String,
    pub nsimulations: usize,
    pub npackages: u64,
    pub self_absorption: bool,
    pub transient_heating: bool,
    pub creation_time: DateTime<Utc>,
    pub finishing_time: Option<DateTime<Utc>>,
    pub ranges: BTreeMap<String, Range>,
    pub scales: BTreeMap<String, Scale>,
}

/// The run-level table with one row per generation, in creation order.
#[derive(Debug, Clone)]
pub struct GenerationsTable {
    path: PathBuf,
}

impl GenerationsTable {
    fn columns() -> Vec<String> {
        [
            "name",
            "index",
            "method",
            "wavelength_grid_level",
            "representation",
            "nsimulations",
            "npackages",
            "self_absorption",
            "transient_heating",
            "creation_time",
            "finishing_time",
            "ranges",
            "scales",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn create(path: PathBuf) -> Result<Self> {
        write_header(&path, &Self::columns())?;
        Ok(GenerationsTable { path })
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let (columns, _) = read_table(&path)?;
        check_schema(&path, &columns, &Self::columns())?;
        Ok(GenerationsTable { path })
    }

    pub fn open_or_create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn to_fields(record: &GenerationRecord) -> Result<Vec<String>> {
        Ok(vec![
            record.name.clone(),
            record
                .index
                .map(|i| i.to_string())
                .unwrap_or_else(|| MISSING.to_string()),
            record.method.as_str().to_string(),
            record.wavelength_grid_level.to_string(),
            record.representation.clone(),
            record.nsimulations.to_string(),
            record.npackages.to_string(),
            record.self_absorption.to_string(),
            record.transient_heating.to_string(),
            format_time(&record.creation_time),
            record
                .finishing_time
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| MISSING.to_string()),
            serde_json::to_string(&record.ranges)?,
            serde_json::to_string(&record.scales)?,
        ])
    }

    fn from_fields(path: &Path, row: &[String]) -> Result<GenerationRecord> {
        Ok(GenerationRecord {
            name: row[0].clone(),
            index: if row[1] == MISSING {
                None
            } else {
                Some(parse_field(path, &row[1], "index")?)
            },
            method: row[2].parse().map_err(|e: String| Error::StoreCorruption {
                path: path.to_path_buf(),
                message: e,
            })?,
            wavelength_grid_level: parse_field(path, &row[3], "wavelength_grid_level")?,
            representation: row[4].clone(),
            nsimulations: parse_field(path, &row[5], "nsimulations")?,
            npackages: parse_field(path, &row[6], "npackages")?,
            self_absorption: parse_field(path, &row[7], "self_absorption")?,
            transient_heating: parse_field(path, &row[8], "transient_heating")?,
            creation_time: parse_time(path, &row[9])?,
            finishing_time: if row[10] == MISSING {
                None
            } else {
                Some(parse_time(path, &row[10])?)
            },
            ranges: serde_json::from_str(&row[11])?,
            scales: serde_json::from_str(&row[12])?,
        })
    }

    pub fn append(&self, record: &GenerationRecord) -> Result<()> {
        append_line(&self.path, &Self::to_fields(record)?)
    }

    pub fn records(&self) -> Result<Vec<GenerationRecord>> {
        let (columns, rows) = read_table(&self.path)?;
        check_schema(&self.path, &columns, &Self::columns())?;
        rows.iter()
            .map(|row| Self::from_fields(&self.path, row))
            .collect()
    }

    pub fn record(&self, name: &str) -> Result<Option<GenerationRecord>> {
        Ok(self.records()?.into_iter().find(|r| r.name == name))
    }

    pub fn generation_names(&self) -> Result<Vec<String>> {
        Ok(self.records()?.into_iter().map(|r| r.name).collect())
    }

    pub fn set_finishing_time(&self, name: &str, time: DateTime<Utc>) -> Result<()> {
        let mut records = self.records()?;
        let record = records
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::Configuration(format!("unknown generation '{name}'")))?;
        record.finishing_time = Some(time);
        let rows: Result<Vec<Vec<String>>> = records.iter().map(Self::to_fields).collect();
        rewrite(&self.path, &Self::columns(), &rows?)
    }

    pub fn remove_entries(&self, names: &[String]) -> Result<()> {
        let records = self.records()?;
        let rows: Result<Vec<Vec<String>>> = records
            .iter()
            .filter(|r| !names.contains(&r.name))
            .map(Self::to_fields)
            .collect();
        rewrite(&self.path, &Self::columns(), &rows?)
    }
}

// ---------------------------------------------------------------------------
// Timing and memory
// ---------------------------------------------------------------------------

/// Cross-generation wall-time history feeding the runtime estimator.
#[derive(Debug, Clone)]
pub struct TimingTable {
    path: PathBuf,
}

impl TimingTable {
    fn columns() -> Vec<String> {
        [
            "simulation_name",
            "host",
            "cluster",
            "processes",
            "threads_per_process",
            "threads_per_core",
            "data_parallel",
            "packages",
            "nwavelengths",
            "wall_seconds",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn open_or_create(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            write_header(&path, &Self::columns())?;
        } else {
            let (columns, _) = read_table(&path)?;
            check_schema(&path, &columns, &Self::columns())?;
        }
        Ok(TimingTable { path })
    }

    pub fn append(&self, record: &TimingRecord) -> Result<()> {
        append_line(
            &self.path,
            &[
                record.simulation_name.clone(),
                record.host.clone(),
                record.cluster.clone(),
                record.processes.to_string(),
                record.threads_per_process.to_string(),
                record.threads_per_core.to_string(),
                record.data_parallel.to_string(),
                record.packages.to_string(),
                record.nwavelengths.to_string(),
                record.wall_seconds.to_string(),
            ],
        )
    }

    pub fn records(&self) -> Result<Vec<TimingRecord>> {
        let (columns, rows) = read_table(&self.path)?;
        check_schema(&self.path, &columns, &Self::columns())?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TimingRecord {
                simulation_name: row[0].clone(),
                host: row[1].clone(),
                cluster: row[2].clone(),
                processes: parse_field(&self.path, &row[3], "processes")?,
                threads_per_process: parse_field(&self.path, &row[4], "threads_per_process")?,
                threads_per_core: parse_field(&self.path, &row[5], "threads_per_core")?,
                data_parallel: parse_field(&self.path, &row[6], "data_parallel")?,
                packages: parse_field(&self.path, &row[7], "packages")?,
                nwavelengths: parse_field(&self.path, &row[8], "nwavelengths")?,
                wall_seconds: parse_field(&self.path, &row[9], "wall_seconds")?,
            });
        }
        Ok(out)
    }
}

/// One row of the memory table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub simulation_name: String,
    pub host: String,
    pub peak_bytes: f64,
}

/// Cross-generation peak-memory history.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    path: PathBuf,
}

impl MemoryTable {
    fn columns() -> Vec<String> {
        vec!["simulation_name".into(), "host".into(), "peak_bytes".into()]
    }

    pub fn open_or_create(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            write_header(&path, &Self::columns())?;
        } else {
            let (columns, _) = read_table(&path)?;
            check_schema(&path, &columns, &Self::columns())?;
        }
        Ok(MemoryTable { path })
    }

    pub fn append(&self, record: &MemoryRecord) -> Result<()> {
        append_line(
            &self.path,
            &[
                record.simulation_name.clone(),
                record.host.clone(),
                record.peak_bytes.to_string(),
            ],
        )
    }

    pub fn records(&self) -> Result<Vec<MemoryRecord>> {
        let (columns, rows) = read_table(&self.path)?;
        check_schema(&self.path, &columns, &Self::columns())?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let peak: f64 = row[2].parse().unwrap_or(0.0);
                MemoryRecord {
                    simulation_name: row[0].clone(),
                    host: row[1].clone(),
                    peak_bytes: peak,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;
    use chrono::TimeZone;

    #[test]
    fn test_individuals_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let table = IndividualsTable::create(dir.path().join("individuals.dat")).unwrap();
        table.append("sim_a", "individual_0000").unwrap();
        table.append("sim_b", "individual_0001").unwrap();
        let rows = table.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("sim_a".to_string(), "individual_0000".to_string()));
    }

    #[test]
    fn test_parameters_roundtrip_preserves_units() {
        let dir = tempfile::tempdir().unwrap();
        let table = ParametersTable::create(
            dir.path().join("parameters.dat"),
            vec![
                ("dust_mass".to_string(), Unit::SolarMass),
                ("ionizing".to_string(), Unit::None),
            ],
        )
        .unwrap();
        let mut values = ParameterVector::new();
        values.push("dust_mass", Quantity::new(3e7, Unit::SolarMass));
        values.push("ionizing", Quantity::dimensionless(0.4));
        table.append("sim_a", &values).unwrap();

        let reopened = ParametersTable::open(dir.path().join("parameters.dat")).unwrap();
        assert_eq!(reopened.labels()[0], ("dust_mass".to_string(), Unit::SolarMass));
        let rows = reopened.rows().unwrap();
        assert_eq!(rows[0].1.get("dust_mass").unwrap().value, 3e7);
        assert_eq!(rows[0].1.get("ionizing").unwrap().value, 0.4);
    }

    #[test]
    fn test_parameters_missing_label_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let table = ParametersTable::create(
            dir.path().join("parameters.dat"),
            vec![("dust_mass".to_string(), Unit::SolarMass)],
        )
        .unwrap();
        let values = ParameterVector::new();
        assert!(table.append("sim_a", &values).is_err());
    }

    #[test]
    fn test_schema_drift_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chi_squared.dat");
        std::fs::write(&path, "simulation_name\tsomething_else\n").unwrap();
        assert!(matches!(
            ChiSquaredTable::open(path),
            Err(Error::StoreCorruption { .. })
        ));
    }

    #[test]
    fn test_chi_squared_best() {
        let dir = tempfile::tempdir().unwrap();
        let table = ChiSquaredTable::create(dir.path().join("chi_squared.dat")).unwrap();
        table.append("sim_a", 12.5).unwrap();
        table.append("sim_b", 3.25).unwrap();
        table.append("sim_c", 8.0).unwrap();
        let (best, chi2) = table.best().unwrap().unwrap();
        assert_eq!(best, "sim_b");
        assert_eq!(chi2, 3.25);
    }

    fn generation_record(name: &str) -> GenerationRecord {
        let mut ranges = BTreeMap::new();
        ranges.insert(
            "dust_mass".to_string(),
            Range::new(
                Quantity::new(1e7, Unit::SolarMass),
                Quantity::new(4e7, Unit::SolarMass),
            )
            .unwrap(),
        );
        let mut scales = BTreeMap::new();
        scales.insert("dust_mass".to_string(), Scale::Log);
        GenerationRecord {
            name: name.to_string(),
            index: Some(2),
            method: GenerationMethod::Genetic,
            wavelength_grid_level: 3,
            representation: "highres".to_string(),
            nsimulations: 100,
            npackages: 500_000,
            self_absorption: false,
            transient_heating: true,
            creation_time: Utc.with_ymd_and_hms(2017, 6, 4, 12, 30, 0).unwrap(),
            finishing_time: None,
            ranges,
            scales,
        }
    }

    #[test]
    fn test_generations_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let table = GenerationsTable::create(dir.path().join("generations.dat")).unwrap();
        let record = generation_record("Generation2");
        table.append(&record).unwrap();

        let reopened = GenerationsTable::open(dir.path().join("generations.dat")).unwrap();
        let records = reopened.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], record);
    }

    #[test]
    fn test_generations_finishing_time_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let table = GenerationsTable::create(dir.path().join("generations.dat")).unwrap();
        table.append(&generation_record("initial")).unwrap();
        table.append(&generation_record("Generation1")).unwrap();
        table.append(&generation_record("Generation2")).unwrap();

        let finish = Utc.with_ymd_and_hms(2017, 6, 5, 8, 0, 0).unwrap();
        table.set_finishing_time("initial", finish).unwrap();
        assert_eq!(
            table.record("initial").unwrap().unwrap().finishing_time,
            Some(finish)
        );

        table
            .remove_entries(&["Generation1".to_string(), "Generation2".to_string()])
            .unwrap();
        assert_eq!(table.generation_names().unwrap(), vec!["initial"]);
    }

    #[test]
    fn test_timing_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let table = TimingTable::open_or_create(dir.path().join("timing.dat")).unwrap();
        let record = TimingRecord {
            simulation_name: "sim_a".into(),
            host: "batch1".into(),
            cluster: "delcatty".into(),
            processes: 4,
            threads_per_process: 6,
            threads_per_core: 1,
            data_parallel: true,
            packages: 500_000,
            nwavelengths: 200,
            wall_seconds: 1234.5,
        };
        table.append(&record).unwrap();
        assert_eq!(table.records().unwrap(), vec![record]);
    }
}
