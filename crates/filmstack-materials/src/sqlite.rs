//! SQLite record backend.
//!
//! Schema:
//!
//! | Table | Columns |
//! |-------|---------|
//! | `Materials` | `id`, `name` |
//! | `Substrates` | `id`, `name` |
//! | `MaterialOpticalData` | `material_id → Materials.id`, `wavelength`, `n_value`, `k_value` |
//! | `SubstrateOpticalData` | `material_id → Substrates.id`, `wavelength`, `n_value`, `k_value` |
//! | `Structures` | `id`, `name`, `substrate_id → Substrates.id` |
//! | `StructureLayers` | `structure_id`, `layer_number`, `material_id`, `physical_thickness` |
//!
//! A single connection is shared behind a mutex, so statements from
//! concurrent callers never interleave.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::MemoryRecords;
use crate::provider::{LayerRecord, MaterialError, OpticalRecords, StructureRecord};
use crate::sample::{EntityKind, OpticalSample};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Materials (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS Substrates (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS MaterialOpticalData (
    material_id INTEGER NOT NULL REFERENCES Materials(id),
    wavelength  REAL NOT NULL,
    n_value     REAL NOT NULL,
    k_value     REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS SubstrateOpticalData (
    material_id INTEGER NOT NULL REFERENCES Substrates(id),
    wavelength  REAL NOT NULL,
    n_value     REAL NOT NULL,
    k_value     REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS Structures (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    substrate_id INTEGER NOT NULL REFERENCES Substrates(id)
);
CREATE TABLE IF NOT EXISTS StructureLayers (
    structure_id       INTEGER NOT NULL REFERENCES Structures(id),
    layer_number       INTEGER NOT NULL,
    material_id        INTEGER NOT NULL REFERENCES Materials(id),
    physical_thickness REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_material_data ON MaterialOpticalData(material_id, wavelength);
CREATE INDEX IF NOT EXISTS idx_substrate_data ON SubstrateOpticalData(material_id, wavelength);
CREATE INDEX IF NOT EXISTS idx_structure_layers ON StructureLayers(structure_id, layer_number);
";

/// `(entity table, optical data table)` for a kind.
fn tables(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Material => ("Materials", "MaterialOpticalData"),
        EntityKind::Substrate => ("Substrates", "SubstrateOpticalData"),
    }
}

pub struct SqliteRecords {
    conn: Mutex<Connection>,
}

impl SqliteRecords {
    /// Open an existing database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MaterialError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            MaterialError::Storage(format!("cannot open database {}: {}", path.display(), e))
        })?;
        log::debug!("opened optical database {}", path.display());
        Self::from_connection(conn)
    }

    /// Fresh in-memory database with the schema already created.
    pub fn open_in_memory() -> Result<Self, MaterialError> {
        let records = Self::from_connection(Connection::open_in_memory()?)?;
        records.create_schema()?;
        Ok(records)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, MaterialError> {
        conn.pragma_update(None, "cache_size", -10000)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create any missing tables and indices.
    pub fn create_schema(&self) -> Result<(), MaterialError> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Copy every table and structure from `source` in one transaction.
    ///
    /// Existing entries with the same name are replaced.
    pub fn import(&self, source: &MemoryRecords) -> Result<(), MaterialError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for kind in [EntityKind::Material, EntityKind::Substrate] {
            let (entity_table, data_table) = tables(kind);
            for (name, samples) in source.tables(kind) {
                let id = upsert_name(&tx, entity_table, name)?;
                tx.execute(
                    &format!("DELETE FROM {} WHERE material_id = ?1", data_table),
                    params![id],
                )?;
                let mut insert = tx.prepare_cached(&format!(
                    "INSERT INTO {} (material_id, wavelength, n_value, k_value)
                     VALUES (?1, ?2, ?3, ?4)",
                    data_table
                ))?;
                for s in samples {
                    insert.execute(params![id, s.wavelength_nm, s.n, s.k])?;
                }
            }
        }

        for record in source.structures() {
            let substrate_id = lookup_id(&tx, "Substrates", &record.substrate)?.ok_or_else(|| {
                MaterialError::entity_not_found(EntityKind::Substrate, record.substrate.clone())
            })?;
            tx.execute(
                "INSERT INTO Structures (name, substrate_id) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET substrate_id = excluded.substrate_id",
                params![record.name, substrate_id],
            )?;
            let structure_id = lookup_id(&tx, "Structures", &record.name)?
                .ok_or_else(|| MaterialError::structure_not_found(record.name.clone()))?;
            tx.execute(
                "DELETE FROM StructureLayers WHERE structure_id = ?1",
                params![structure_id],
            )?;
            for layer in &record.layers {
                let material_id = lookup_id(&tx, "Materials", &layer.material)?.ok_or_else(|| {
                    MaterialError::entity_not_found(EntityKind::Material, layer.material.clone())
                })?;
                tx.execute(
                    "INSERT INTO StructureLayers
                        (structure_id, layer_number, material_id, physical_thickness)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![structure_id, layer.layer_number, material_id, layer.thickness_nm],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

fn upsert_name(conn: &Connection, table: &str, name: &str) -> Result<i64, MaterialError> {
    conn.execute(
        &format!("INSERT OR IGNORE INTO {} (name) VALUES (?1)", table),
        params![name],
    )?;
    lookup_id(conn, table, name)?.ok_or_else(|| {
        MaterialError::Storage(format!("failed to insert '{}' into {}", name, table))
    })
}

fn lookup_id(conn: &Connection, table: &str, name: &str) -> Result<Option<i64>, MaterialError> {
    Ok(conn
        .query_row(
            &format!("SELECT id FROM {} WHERE name = ?1", table),
            params![name],
            |row| row.get(0),
        )
        .optional()?)
}

impl OpticalRecords for SqliteRecords {
    fn optical_samples(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Vec<OpticalSample>, MaterialError> {
        let (entity_table, data_table) = tables(kind);
        let sql = format!(
            "SELECT wavelength, n_value, k_value FROM {data} \
             JOIN {entity} ON {entity}.id = {data}.material_id \
             WHERE {entity}.name = ?1 ORDER BY wavelength",
            data = data_table,
            entity = entity_table,
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let samples = stmt
            .query_map(params![name], |row| {
                Ok(OpticalSample {
                    wavelength_nm: row.get(0)?,
                    n: row.get(1)?,
                    k: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if samples.is_empty() {
            return Err(MaterialError::entity_not_found(kind, name));
        }
        Ok(samples)
    }

    fn structure(&self, name: &str) -> Result<StructureRecord, MaterialError> {
        let conn = self.conn.lock();
        let substrate: Option<String> = conn
            .query_row(
                "SELECT sub.name FROM Structures s \
                 JOIN Substrates sub ON sub.id = s.substrate_id \
                 WHERE s.name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let substrate = substrate.ok_or_else(|| MaterialError::structure_not_found(name))?;

        let mut stmt = conn.prepare_cached(
            "SELECT sl.layer_number, m.name, sl.physical_thickness \
             FROM StructureLayers sl \
             JOIN Materials m ON m.id = sl.material_id \
             WHERE sl.structure_id = (SELECT id FROM Structures WHERE name = ?1) \
             ORDER BY sl.layer_number",
        )?;
        let layers = stmt
            .query_map(params![name], |row| {
                Ok(LayerRecord {
                    layer_number: row.get(0)?,
                    material: row.get(1)?,
                    thickness_nm: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StructureRecord {
            name: name.to_string(),
            substrate,
            layers,
        })
    }

    fn structure_names(&self) -> Result<Vec<String>, MaterialError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT name FROM Structures ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn entity_names(&self, kind: EntityKind) -> Result<Vec<String>, MaterialError> {
        let (entity_table, _) = tables(kind);
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT name FROM {} ORDER BY name", entity_table))?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteRecords {
        let source = MemoryRecords::new()
            .with_material(
                "SiO2",
                vec![
                    OpticalSample::new(600.0, 1.458, 0.0),
                    OpticalSample::new(400.0, 1.470, 0.0),
                ],
            )
            .with_material("TiO2", vec![OpticalSample::new(500.0, 2.57, 0.0)])
            .with_substrate("BK7", vec![OpticalSample::new(500.0, 1.5214, 0.0)])
            .with_structure("HL", "BK7", &[("TiO2", 53.7), ("SiO2", 94.2)]);
        let db = SqliteRecords::open_in_memory().unwrap();
        db.import(&source).unwrap();
        db
    }

    #[test]
    fn test_samples_come_back_wavelength_ordered() {
        let db = seeded();
        let samples = db.optical_samples(EntityKind::Material, "SiO2").unwrap();
        let wavelengths: Vec<f64> = samples.iter().map(|s| s.wavelength_nm).collect();
        assert_eq!(wavelengths, vec![400.0, 600.0]);
    }

    #[test]
    fn test_unknown_material_is_not_found() {
        let db = seeded();
        assert!(matches!(
            db.optical_samples(EntityKind::Material, "BK7"),
            Err(MaterialError::NotFound { kind: "Material", .. })
        ));
    }

    #[test]
    fn test_structure_layers_follow_layer_number() {
        let db = seeded();
        {
            // Insert an extra layer out of row order: number 0 goes first.
            let conn = db.conn.lock();
            conn.execute(
                "INSERT INTO StructureLayers
                        (structure_id, layer_number, material_id, physical_thickness)
                 VALUES ((SELECT id FROM Structures WHERE name = 'HL'), 0,
                         (SELECT id FROM Materials WHERE name = 'SiO2'), 10.0)",
                [],
            )
            .unwrap();
        }
        let record = db.structure("HL").unwrap();
        assert_eq!(record.substrate, "BK7");
        let materials: Vec<&str> = record.layers.iter().map(|l| l.material.as_str()).collect();
        assert_eq!(materials, vec!["SiO2", "TiO2", "SiO2"]);
        assert_eq!(record.layers[0].thickness_nm, 10.0);
    }

    #[test]
    fn test_missing_structure_and_listing() {
        let db = seeded();
        assert!(matches!(
            db.structure("nope"),
            Err(MaterialError::NotFound { kind: "Structure", .. })
        ));
        assert_eq!(db.structure_names().unwrap(), vec!["HL"]);
        assert_eq!(db.entity_names(EntityKind::Material).unwrap(), vec!["SiO2", "TiO2"]);
    }

    #[test]
    fn test_reimport_replaces_tables() {
        let db = seeded();
        let update =
            MemoryRecords::new().with_material("SiO2", vec![OpticalSample::new(550.0, 1.46, 0.0)]);
        db.import(&update).unwrap();
        let samples = db.optical_samples(EntityKind::Material, "SiO2").unwrap();
        assert_eq!(samples.len(), 1);
    }
}
