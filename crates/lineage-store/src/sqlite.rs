//! SQLite-based row store implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use lineage_core::content::{derived_schema, merge_fields, normalize_for_schema, select_for_schema};
use lineage_core::{
    now_millis, CreateHumanTransform, DatabaseConfig, DerivationPath, Document, HumanTransform,
    HumanTransformCreated, LineageError, MutationSink, OriginType, PathSegment, ProjectRows,
    Result, RowSource, RowTable, SchemaType, TableRows, Transform, TransformInput,
    TransformOutput, TransformStatus, TransformType, UpdateDocument,
};

use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// Bound on the human-edit chain followed to find a free-form document's schema.
const MAX_SCHEMA_HOPS: usize = 64;

/// Row counts of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub documents: usize,
    pub transforms: usize,
    pub human_transforms: usize,
    pub transform_inputs: usize,
    pub transform_outputs: usize,
}

/// Store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub projects: u64,
    pub documents: u64,
    pub transforms: u64,
    pub human_transforms: u64,
    pub storage_bytes: u64,
    /// Project the counts are restricted to, if any.
    pub filter: Option<String>,
}

/// SQLite-based store implementation.
///
/// A single connection behind a blocking Mutex; every operation holds the lock
/// for the duration of one statement or transaction.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn db(e: rusqlite::Error) -> LineageError {
    LineageError::database(e.to_string())
}

impl SqliteStore {
    /// Open or create a database at the given path with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let config = DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            ..DatabaseConfig::default()
        };
        Self::open_with_config(&config)
    }

    /// Open or create the database described by `config`.
    pub fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        let path = config.path.as_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| LineageError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, config, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LineageError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, &DatabaseConfig::default(), Path::new(":memory:"))
    }

    fn init(conn: Connection, config: &DatabaseConfig, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn, config)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| LineageError::database(format!("Failed to initialize schema: {}", e)))?;
        conn.execute(
            "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(db)?;

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
        let journal = if config.wal_mode { "WAL" } else { "DELETE" };
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = {};
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA busy_timeout = {};
            PRAGMA temp_store = MEMORY;
            "#,
            journal, config.busy_timeout_ms
        ))
        .map_err(|e| LineageError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| LineageError::database(e.to_string()))?;
        f(&conn)
    }

    fn with_conn_mut<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self.conn.lock().map_err(|e| LineageError::database(e.to_string()))?;
        f(&mut conn)
    }

    /// Schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<u32> {
        self.with_conn(|conn| {
            let value: String = conn
                .query_row(
                    "SELECT value FROM store_meta WHERE key = 'schema_version'",
                    [],
                    |row| row.get(0),
                )
                .map_err(db)?;
            value
                .parse()
                .map_err(|_| LineageError::database(format!("Bad schema version: {}", value)))
        })
    }

    /// Insert or replace all rows in one transaction.
    pub async fn import_rows(&self, rows: &ProjectRows) -> Result<ImportSummary> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(db)?;

            for doc in &rows.documents {
                Self::insert_document(&tx, doc)?;
            }
            for transform in &rows.transforms {
                Self::insert_transform(&tx, transform)?;
            }
            for human in &rows.human_transforms {
                Self::insert_human_transform(&tx, human)?;
            }
            for input in &rows.transform_inputs {
                Self::insert_input(&tx, input)?;
            }
            for output in &rows.transform_outputs {
                Self::insert_output(&tx, output)?;
            }

            tx.commit().map_err(db)?;

            let summary = ImportSummary {
                documents: rows.documents.len(),
                transforms: rows.transforms.len(),
                human_transforms: rows.human_transforms.len(),
                transform_inputs: rows.transform_inputs.len(),
                transform_outputs: rows.transform_outputs.len(),
            };
            info!("Imported rows: {:?}", summary);
            Ok(summary)
        })
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.with_conn(|conn| Self::load_document(conn, id))
    }

    /// Project ids with at least one document or transform.
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT project_id FROM jsondocs
                    UNION
                    SELECT project_id FROM transforms
                    ORDER BY 1
                    "#,
                )
                .map_err(db)?;

            let projects = stmt
                .query_map([], |row| row.get(0))
                .map_err(db)?
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(db)?;

            Ok(projects)
        })
    }

    pub async fn stats(&self, project_id: Option<&str>) -> Result<StoreStats> {
        let filter = project_id.map(String::from);

        self.with_conn(move |conn| {
            let count = |table: &str| -> Result<u64> {
                let counted: rusqlite::Result<u64> = match &filter {
                    Some(project) => conn.query_row(
                        &format!("SELECT COUNT(*) FROM {} WHERE project_id = ?1", table),
                        params![project],
                        |row| row.get(0),
                    ),
                    None => conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    }),
                };
                counted.map_err(db)
            };

            let documents = count("jsondocs")?;
            let transforms = count("transforms")?;
            let human_transforms = count("human_transforms")?;

            let projects: u64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM (SELECT project_id FROM jsondocs UNION SELECT project_id FROM transforms)",
                    [],
                    |row| row.get(0),
                )
                .map_err(db)?;

            let page_count: u64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get(0))
                .unwrap_or(0);
            let page_size: u64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get(0))
                .unwrap_or(4096);

            Ok(StoreStats {
                projects,
                documents,
                transforms,
                human_transforms,
                storage_bytes: page_count * page_size,
                filter,
            })
        })
    }
}

// Row helpers
impl SqliteStore {
    fn load_document(conn: &Connection, id: &str) -> Result<Option<Document>> {
        conn.query_row(
            r#"
            SELECT id, project_id, schema_type, origin_type, data, created_at, updated_at
            FROM jsondocs WHERE id = ?1
            "#,
            params![id],
            Self::row_to_document,
        )
        .optional()
        .map_err(db)
    }

    /// Schema a document's paths are read with.
    ///
    /// A free-form document takes its shape from the source of its latest
    /// human edit: a whole copy keeps the source's schema and an edited
    /// collection item reads as an idea.
    fn effective_schema(conn: &Connection, doc: &Document, hops: usize) -> Result<SchemaType> {
        if doc.schema_type != SchemaType::UserInput || hops >= MAX_SCHEMA_HOPS {
            return Ok(doc.schema_type.clone());
        }
        let parent: Option<(String, String)> = conn
            .query_row(
                r#"
                SELECT h.source_document_id, h.derivation_path
                FROM human_transforms h JOIN transforms t ON t.id = h.transform_id
                WHERE h.derived_document_id = ?1
                ORDER BY t.created_at DESC, t.rowid DESC LIMIT 1
                "#,
                params![doc.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db)?;

        let Some((source_id, raw_path)) = parent else {
            return Ok(SchemaType::UserInput);
        };
        let (Some(source), Ok(path)) = (
            Self::load_document(conn, &source_id)?,
            raw_path.parse::<DerivationPath>(),
        ) else {
            return Ok(SchemaType::UserInput);
        };
        let source_schema = Self::effective_schema(conn, &source, hops + 1)?;
        Ok(derived_schema(&source_schema, &path))
    }

    fn insert_document(conn: &Connection, doc: &Document) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO jsondocs
                (id, project_id, schema_type, origin_type, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                doc.id,
                doc.project_id,
                doc.schema_type.as_str(),
                doc.origin_type.as_str(),
                serde_json::to_string(&doc.data)?,
                doc.created_at as i64,
                doc.updated_at as i64,
            ],
        )
        .map_err(|e| LineageError::database(format!("Failed to insert document: {}", e)))?;
        Ok(())
    }

    fn insert_transform(conn: &Connection, transform: &Transform) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO transforms (id, project_id, type, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                transform.id,
                transform.project_id,
                transform.transform_type.as_str(),
                transform.status.as_str(),
                transform.created_at as i64,
                transform.updated_at as i64,
            ],
        )
        .map_err(|e| LineageError::database(format!("Failed to insert transform: {}", e)))?;
        Ok(())
    }

    fn insert_human_transform(conn: &Connection, human: &HumanTransform) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO human_transforms
                (transform_id, project_id, source_document_id, derivation_path,
                 derived_document_id, transform_name)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                human.transform_id,
                human.project_id,
                human.source_document_id,
                human.derivation_path,
                human.derived_document_id,
                human.transform_name,
            ],
        )
        .map_err(|e| LineageError::database(format!("Failed to insert human transform: {}", e)))?;
        Ok(())
    }

    fn insert_input(conn: &Connection, input: &TransformInput) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO transform_inputs (project_id, transform_id, document_id, input_role)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![input.project_id, input.transform_id, input.document_id, input.input_role],
        )
        .map_err(|e| LineageError::database(format!("Failed to insert transform input: {}", e)))?;
        Ok(())
    }

    fn insert_output(conn: &Connection, output: &TransformOutput) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO transform_outputs (project_id, transform_id, document_id, output_role)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![output.project_id, output.transform_id, output.document_id, output.output_role],
        )
        .map_err(|e| LineageError::database(format!("Failed to insert transform output: {}", e)))?;
        Ok(())
    }

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        let schema_str: String = row.get(2)?;
        let origin_str: String = row.get(3)?;
        let data_str: String = row.get(4)?;

        let schema_type = match schema_str.parse::<SchemaType>() {
            Ok(schema) => schema,
            Err(never) => match never {},
        };

        Ok(Document {
            id: row.get(0)?,
            project_id: row.get(1)?,
            schema_type,
            // Unknown origins are treated as read-only.
            origin_type: OriginType::parse(&origin_str).unwrap_or(OriginType::AiGenerated),
            data: serde_json::from_str(&data_str).unwrap_or(Value::String(data_str)),
            created_at: row.get::<_, i64>(5)? as u64,
            updated_at: row.get::<_, i64>(6)? as u64,
        })
    }

    fn row_to_transform(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transform> {
        let type_str: String = row.get(2)?;
        let status_str: String = row.get(3)?;

        Ok(Transform {
            id: row.get(0)?,
            project_id: row.get(1)?,
            transform_type: TransformType::parse(&type_str).unwrap_or(TransformType::Ai),
            status: TransformStatus::parse(&status_str).unwrap_or(TransformStatus::Completed),
            created_at: row.get::<_, i64>(4)? as u64,
            updated_at: row.get::<_, i64>(5)? as u64,
        })
    }

    fn row_to_human_transform(row: &rusqlite::Row<'_>) -> rusqlite::Result<HumanTransform> {
        Ok(HumanTransform {
            transform_id: row.get(0)?,
            project_id: row.get(1)?,
            source_document_id: row.get(2)?,
            derivation_path: row.get(3)?,
            derived_document_id: row.get(4)?,
            transform_name: row.get(5)?,
        })
    }

    fn query_project<T>(
        conn: &Connection,
        sql: &str,
        project_id: &str,
        map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = conn.prepare(sql).map_err(db)?;
        let rows = stmt
            .query_map(params![project_id], map)
            .map_err(db)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(rows)
    }

    fn fetch_rows(conn: &Connection, project_id: &str, table: RowTable) -> Result<TableRows> {
        // Rowid order keeps rows in the order they were written.
        Ok(match table {
            RowTable::Documents => TableRows::Documents(Self::query_project(
                conn,
                r#"
                SELECT id, project_id, schema_type, origin_type, data, created_at, updated_at
                FROM jsondocs WHERE project_id = ?1 ORDER BY rowid
                "#,
                project_id,
                Self::row_to_document,
            )?),
            RowTable::Transforms => TableRows::Transforms(Self::query_project(
                conn,
                r#"
                SELECT id, project_id, type, status, created_at, updated_at
                FROM transforms WHERE project_id = ?1 ORDER BY rowid
                "#,
                project_id,
                Self::row_to_transform,
            )?),
            RowTable::HumanTransforms => TableRows::HumanTransforms(Self::query_project(
                conn,
                r#"
                SELECT transform_id, project_id, source_document_id, derivation_path,
                       derived_document_id, transform_name
                FROM human_transforms WHERE project_id = ?1 ORDER BY rowid
                "#,
                project_id,
                Self::row_to_human_transform,
            )?),
            RowTable::TransformInputs => TableRows::TransformInputs(Self::query_project(
                conn,
                r#"
                SELECT project_id, transform_id, document_id, input_role
                FROM transform_inputs WHERE project_id = ?1 ORDER BY rowid
                "#,
                project_id,
                |row| {
                    Ok(TransformInput {
                        project_id: row.get(0)?,
                        transform_id: row.get(1)?,
                        document_id: row.get(2)?,
                        input_role: row.get(3)?,
                    })
                },
            )?),
            RowTable::TransformOutputs => TableRows::TransformOutputs(Self::query_project(
                conn,
                r#"
                SELECT project_id, transform_id, document_id, output_role
                FROM transform_outputs WHERE project_id = ?1 ORDER BY rowid
                "#,
                project_id,
                |row| {
                    Ok(TransformOutput {
                        project_id: row.get(0)?,
                        transform_id: row.get(1)?,
                        document_id: row.get(2)?,
                        output_role: row.get(3)?,
                    })
                },
            )?),
        })
    }
}

/// Initial data of a document derived from `path` of `source`.
///
/// Scalars are wrapped in an object keyed by the field they came from so the
/// derived document is always a JSON object.
fn derived_data(source: &Document, schema: &SchemaType, path: &DerivationPath) -> Result<Value> {
    let base = select_for_schema(schema, &source.parsed_data(), path).ok_or_else(|| {
        LineageError::InvalidPath {
            path: path.to_string(),
            reason: format!("not present in document {}", source.id),
        }
    })?;
    Ok(match base {
        Value::Object(_) | Value::Array(_) => base,
        scalar => match path.segments().last() {
            Some(PathSegment::Field(name)) => {
                let mut map = Map::new();
                map.insert(name.clone(), scalar);
                Value::Object(map)
            }
            _ => json!({ "value": scalar }),
        },
    })
}

#[async_trait]
impl RowSource for SqliteStore {
    async fn fetch_table(&self, project_id: &str, table: RowTable) -> Result<TableRows> {
        self.with_conn(|conn| {
            let rows = Self::fetch_rows(conn, project_id, table)?;
            debug!("Fetched {} {} rows for {}", rows.len(), table, project_id);
            Ok(rows)
        })
    }
}

#[async_trait]
impl MutationSink for SqliteStore {
    async fn create_human_transform(&self, intent: CreateHumanTransform) -> Result<HumanTransformCreated> {
        intent.validate()?;
        let path: DerivationPath = intent.derivation_path.parse()?;

        self.with_conn_mut(move |conn| {
            let tx = conn.transaction().map_err(db)?;

            let source = Self::load_document(&tx, &intent.source_document_id)?
                .filter(|doc| doc.project_id == intent.project_id)
                .ok_or_else(|| LineageError::DocumentNotFound {
                    id: intent.source_document_id.clone(),
                })?;

            let source_schema = Self::effective_schema(&tx, &source, 0)?;
            let path = normalize_for_schema(&source_schema, &path);
            let data = merge_fields(derived_data(&source, &source_schema, &path)?, &intent.field_updates);
            let schema = derived_schema(&source_schema, &path);

            let transform = Transform::new(&intent.project_id, TransformType::Human, TransformStatus::Completed);
            let derived = Document::new(&intent.project_id, schema, OriginType::UserInput, data);
            let human = HumanTransform {
                transform_id: transform.id.clone(),
                project_id: intent.project_id.clone(),
                source_document_id: source.id.clone(),
                derivation_path: path.to_string(),
                derived_document_id: Some(derived.id.clone()),
                transform_name: intent.transform_name.clone(),
            };

            Self::insert_transform(&tx, &transform)?;
            Self::insert_document(&tx, &derived)?;
            Self::insert_human_transform(&tx, &human)?;
            Self::insert_input(
                &tx,
                &TransformInput {
                    project_id: intent.project_id.clone(),
                    transform_id: transform.id.clone(),
                    document_id: source.id.clone(),
                    input_role: Some("source".to_string()),
                },
            )?;
            Self::insert_output(
                &tx,
                &TransformOutput {
                    project_id: intent.project_id.clone(),
                    transform_id: transform.id.clone(),
                    document_id: derived.id.clone(),
                    output_role: Some("derived".to_string()),
                },
            )?;

            tx.commit().map_err(db)?;

            info!(
                "Created human transform {} ({}) on {} at {} -> {}",
                transform.id, intent.transform_name, source.id, path, derived.id
            );

            Ok(HumanTransformCreated {
                transform,
                human_transform: human,
                derived_document: derived,
            })
        })
    }

    async fn update_document(&self, intent: UpdateDocument) -> Result<Document> {
        self.with_conn(move |conn| {
            let mut doc = Self::load_document(conn, &intent.document_id)?.ok_or_else(|| {
                LineageError::DocumentNotFound {
                    id: intent.document_id.clone(),
                }
            })?;
            if !doc.is_user_input() {
                return Err(LineageError::NotEditable { id: doc.id });
            }

            doc.data = intent.data;
            doc.updated_at = now_millis().max(doc.updated_at);
            conn.execute(
                "UPDATE jsondocs SET data = ?1, updated_at = ?2 WHERE id = ?3",
                params![serde_json::to_string(&doc.data)?, doc.updated_at as i64, doc.id],
            )
            .map_err(|e| LineageError::database(format!("Failed to update document: {}", e)))?;

            debug!("Updated document {}", doc.id);
            Ok(doc)
        })
    }
}
