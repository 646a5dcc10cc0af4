//! Database schema definitions.

/// Main schema SQL for initializing the database.
///
/// Rows mirror the server's tables and may reference rows that have not been
/// delivered yet, so there are no foreign keys between them.
pub const SCHEMA: &str = r#"
-- Documents ("jsondocs")
CREATE TABLE IF NOT EXISTS jsondocs (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    schema_type TEXT NOT NULL,
    origin_type TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jsondocs_project ON jsondocs(project_id);

-- Derivation events
CREATE TABLE IF NOT EXISTS transforms (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transforms_project ON transforms(project_id);

-- Edit metadata of human transforms
CREATE TABLE IF NOT EXISTS human_transforms (
    transform_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    source_document_id TEXT NOT NULL,
    derivation_path TEXT NOT NULL DEFAULT '$',
    derived_document_id TEXT,
    transform_name TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_human_transforms_project ON human_transforms(project_id);
CREATE INDEX IF NOT EXISTS idx_human_transforms_source ON human_transforms(source_document_id);

-- Transform edges
CREATE TABLE IF NOT EXISTS transform_inputs (
    project_id TEXT NOT NULL,
    transform_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    input_role TEXT,
    PRIMARY KEY (transform_id, document_id)
);

CREATE INDEX IF NOT EXISTS idx_transform_inputs_project ON transform_inputs(project_id);

CREATE TABLE IF NOT EXISTS transform_outputs (
    project_id TEXT NOT NULL,
    transform_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    output_role TEXT,
    PRIMARY KEY (transform_id, document_id)
);

CREATE INDEX IF NOT EXISTS idx_transform_outputs_project ON transform_outputs(project_id);

-- Store metadata
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
