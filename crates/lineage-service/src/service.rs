//! Lineage service implementation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use lineage_core::{
    CreateHumanTransform, DerivationPath, DocumentContent, LineageConfig, LineageError,
    MutationSink, ProjectRows, UpdateDocument,
};
use lineage_query::{CanonicalSlot, Derived, Editability, LineageEngine, LineageView, ResolveOptions};
use lineage_store::SqliteStore;
use lineage_sync::{reconcile_snapshot, PendingOverlay, SnapshotFeed, UpdateDebouncer};

/// Per-project sync and derivation state.
struct ProjectState {
    feed: SnapshotFeed,
    engine: LineageEngine,
    overlay: PendingOverlay,
}

impl ProjectState {
    fn new(project_id: &str, options: ResolveOptions) -> Self {
        Self {
            feed: SnapshotFeed::new(project_id),
            engine: LineageEngine::new(options),
            overlay: PendingOverlay::new(),
        }
    }
}

/// Lineage service state.
pub struct LineageService {
    /// Row store.
    store: Arc<SqliteStore>,

    /// Coalesces in-place updates before they reach the store.
    debouncer: UpdateDebouncer<SqliteStore>,

    projects: Mutex<HashMap<String, ProjectState>>,

    config: LineageConfig,
}

/// Parameters naming a path within a document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathParams {
    /// Project (optional, defaults to the configured project).
    pub project_id: Option<String>,

    pub document_id: String,

    /// Derivation path (default: `$`, the whole document).
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "$".to_string()
}

/// Canonical context parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CanonicalParams {
    pub project_id: Option<String>,
}

/// Human edit parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditParams {
    pub project_id: Option<String>,

    /// Document to edit.
    pub document_id: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// Name recorded on the transform (default: `edit`).
    #[serde(default = "default_transform_name")]
    pub transform_name: String,

    /// Fields to set on the derived document.
    #[serde(default)]
    pub field_updates: Map<String, Value>,
}

fn default_transform_name() -> String {
    "edit".to_string()
}

/// In-place update parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateParams {
    pub project_id: Option<String>,

    pub document_id: String,

    /// New document data.
    pub data: Value,
}

/// Tool result.
#[derive(Debug, Serialize)]
pub struct ToolResult {
    /// Whether the operation was successful.
    pub success: bool,

    /// Result message or content.
    pub message: String,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<LineageError> for ToolResult {
    fn from(err: LineageError) -> Self {
        Self::error(format!("[{}] {}", err.error_code(), err))
    }
}

impl LineageService {
    /// Create a service over the database named in `config`.
    pub fn new(config: LineageConfig) -> lineage_core::Result<Self> {
        info!(
            "Initializing lineage service with database at {:?}",
            config.database.path
        );
        let store = Arc::new(SqliteStore::open_with_config(&config.database)?);
        Ok(Self::with_store(store, config))
    }

    /// Create a service with an in-memory database.
    pub fn new_memory() -> lineage_core::Result<Self> {
        info!("Initializing lineage service with in-memory database");
        let store = Arc::new(SqliteStore::open_memory()?);
        Ok(Self::with_store(store, LineageConfig::default()))
    }

    pub fn with_store(store: Arc<SqliteStore>, config: LineageConfig) -> Self {
        let debouncer = UpdateDebouncer::from_config(Arc::clone(&store), &config.sync);
        Self {
            store,
            debouncer,
            projects: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Get the service info.
    pub fn info() -> ServiceInfo {
        ServiceInfo {
            name: "script-lineage".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Lineage resolution for AI-assisted script projects".to_string(),
        }
    }

    /// List available tools.
    pub fn tools() -> Vec<ToolInfo> {
        [
            ("lineage_resolve", "Find the latest version of a document path"),
            ("lineage_canonical", "Show the canonical document of each category"),
            ("lineage_override", "Check whether a path of a document has a human edit"),
            ("lineage_editable", "Decide what editing a document path should do"),
            ("lineage_edit", "Create a human edit of a document path"),
            ("lineage_update", "Update a user-input document in place"),
            ("lineage_history", "List the lineage chain of a document path"),
        ]
        .into_iter()
        .map(|(name, description)| ToolInfo {
            name: name.to_string(),
            description: description.to_string(),
        })
        .collect()
    }

    fn project_id(&self, requested: Option<String>) -> Result<String, ToolResult> {
        requested
            .or_else(|| self.config.sync.default_project.clone())
            .ok_or_else(|| ToolResult::error("No project given and no default project configured."))
    }

    fn parse_path(path: &str) -> Result<DerivationPath, ToolResult> {
        path.parse::<DerivationPath>()
            .map_err(|e| ToolResult::from(LineageError::from(e)))
    }

    /// Reload a project's rows and run `f` against its engine.
    async fn query<T>(
        &self,
        project_id: &str,
        f: impl FnOnce(&LineageEngine) -> Derived<T>,
    ) -> Result<T, ToolResult> {
        let mut projects = self.projects.lock().await;
        let options = ResolveOptions::from(&self.config.resolver);
        let state = projects
            .entry(project_id.to_string())
            .or_insert_with(|| ProjectState::new(project_id, options));

        let snapshot = state.feed.load(self.store.as_ref()).await;
        let (effective, settled) = reconcile_snapshot(&snapshot, &state.overlay);
        state.overlay.settle(&settled);
        state.engine.refresh(&effective);

        match f(&state.engine) {
            Derived::Ready(value) => Ok(value),
            Derived::Pending => Err(ToolResult::error(format!(
                "Project '{}' is still loading.",
                project_id
            ))),
            Derived::Error(message) => Err(ToolResult::error(format!(
                "Project '{}' could not be loaded: {}",
                project_id, message
            ))),
        }
    }

    async fn view(&self, project_id: &str) -> Result<Arc<LineageView>, ToolResult> {
        self.query(project_id, |engine| engine.view()).await
    }

    /// Import a row dump.
    pub async fn import(&self, rows: ProjectRows) -> ToolResult {
        match self.store.import_rows(&rows).await {
            Ok(summary) => ToolResult::success(format!(
                "Imported {} documents, {} transforms, {} human transforms, {} inputs, {} outputs.",
                summary.documents,
                summary.transforms,
                summary.human_transforms,
                summary.transform_inputs,
                summary.transform_outputs
            )),
            Err(e) => e.into(),
        }
    }

    /// Store statistics, optionally for one project.
    pub async fn stats(&self, project_id: Option<&str>) -> ToolResult {
        match self.store.stats(project_id).await {
            Ok(stats) => {
                let mut output = String::from("Lineage store statistics:\n\n");
                if let Some(filter) = &stats.filter {
                    output.push_str(&format!("Project: {}\n", filter));
                }
                output.push_str(&format!(
                    "Projects: {}\nDocuments: {}\nTransforms: {}\nHuman transforms: {}\nStorage: {:.1} KB\n",
                    stats.projects,
                    stats.documents,
                    stats.transforms,
                    stats.human_transforms,
                    stats.storage_bytes as f64 / 1024.0
                ));
                ToolResult::success(output)
            }
            Err(e) => e.into(),
        }
    }

    /// Find the latest version of a document path.
    pub async fn resolve(&self, params: PathParams) -> ToolResult {
        let result = async {
            let project_id = self.project_id(params.project_id)?;
            let path = Self::parse_path(&params.path)?;
            let resolved = self
                .query(&project_id, |engine| {
                    engine.resolve(Some(params.document_id.as_str()), &path)
                })
                .await?;

            match resolved.document_id {
                Some(id) => Ok(ToolResult::success(format!(
                    "Latest version of {} at {}: {} (path {}, depth {})",
                    params.document_id, path, id, resolved.path, resolved.depth
                ))),
                None => Err(ToolResult::error(format!(
                    "Document '{}' not found in project '{}'.",
                    params.document_id, project_id
                ))),
            }
        };
        result.await.unwrap_or_else(|e| e)
    }

    /// Show the canonical document of each category.
    pub async fn canonical(&self, params: CanonicalParams) -> ToolResult {
        let result = async {
            let project_id = self.project_id(params.project_id)?;
            let view = self.view(&project_id).await?;

            let mut output = format!("Canonical documents for project '{}':\n\n", project_id);
            for (category, slot) in view.canonical.iter() {
                let line = match slot {
                    CanonicalSlot::Absent => "(none)".to_string(),
                    CanonicalSlot::Resolved(doc) => format!(
                        "{} [{}] depth {} \"{}\"",
                        doc.document.id,
                        doc.document.origin_type.as_str(),
                        doc.depth,
                        doc.content.label()
                    ),
                    CanonicalSlot::Ambiguous { candidates } => format!(
                        "AMBIGUOUS: multiple {} found ({})",
                        category.plural_label(),
                        candidates.join(", ")
                    ),
                };
                output.push_str(&format!("- {}: {}\n", category, line));
            }

            let errors = view.canonical.errors();
            if errors.is_empty() {
                Ok(ToolResult::success(output))
            } else {
                warn!("Canonical context of {} is ambiguous: {:?}", project_id, errors);
                Err(ToolResult::error(output))
            }
        };
        result.await.unwrap_or_else(|e| e)
    }

    /// Check whether a path of a document has a human edit.
    pub async fn check_override(&self, params: PathParams) -> ToolResult {
        let result = async {
            let project_id = self.project_id(params.project_id)?;
            let path = Self::parse_path(&params.path)?;
            let query = self
                .query(&project_id, |engine| {
                    engine.check_override(&params.document_id, &path)
                })
                .await?;

            Ok::<_, ToolResult>(match (query.override_document_id, query.transform_id) {
                (Some(doc), Some(transform)) => ToolResult::success(format!(
                    "{} at {} is overridden by {} (transform {})",
                    params.document_id, path, doc, transform
                )),
                _ => ToolResult::success(format!(
                    "{} at {} has no override",
                    params.document_id, path
                )),
            })
        };
        result.await.unwrap_or_else(|e| e)
    }

    /// Decide what editing a document path should do.
    pub async fn editable(&self, params: PathParams) -> ToolResult {
        let result = async {
            let project_id = self.project_id(params.project_id)?;
            let path = Self::parse_path(&params.path)?;
            let decision = self
                .query(&project_id, |engine| {
                    engine.editability(&params.document_id, &path)
                })
                .await?;
            Ok::<_, ToolResult>(ToolResult::success(describe_editability(
                &params.document_id,
                &path,
                &decision,
            )))
        };
        result.await.unwrap_or_else(|e| e)
    }

    /// Create a human edit of a document path.
    pub async fn edit(&self, params: EditParams) -> ToolResult {
        let result = async {
            let project_id = self.project_id(params.project_id)?;
            let path = Self::parse_path(&params.path)?;
            let decision = self
                .query(&project_id, |engine| {
                    engine.editability(&params.document_id, &path)
                })
                .await?;

            match decision {
                Editability::Promotable | Editability::ReadOnly { latest: None } => {}
                other => {
                    return Err(ToolResult::error(describe_editability(
                        &params.document_id,
                        &path,
                        &other,
                    )))
                }
            }

            let created = self
                .store
                .create_human_transform(CreateHumanTransform {
                    project_id: project_id.clone(),
                    transform_name: params.transform_name,
                    source_document_id: params.document_id.clone(),
                    derivation_path: path.to_string(),
                    field_updates: params.field_updates,
                })
                .await
                .map_err(ToolResult::from)?;

            Ok(ToolResult::success(format!(
                "Created {} from {} at {} via transform {}",
                created.derived_document.id,
                params.document_id,
                path,
                created.transform.id
            )))
        };
        result.await.unwrap_or_else(|e| e)
    }

    /// Update a user-input document in place.
    ///
    /// Updates pass through the debounce window; an update superseded by a
    /// newer one for the same document within the window is not written.
    pub async fn update(&self, params: UpdateParams) -> ToolResult {
        let project_id = match self.project_id(params.project_id) {
            Ok(id) => id,
            Err(e) => return e,
        };

        match self.store.get_document(&params.document_id).await {
            Ok(Some(doc)) if doc.is_user_input() => {}
            Ok(Some(doc)) => return LineageError::NotEditable { id: doc.id }.into(),
            Ok(None) => {
                return LineageError::DocumentNotFound {
                    id: params.document_id,
                }
                .into()
            }
            Err(e) => return e.into(),
        }

        {
            let mut projects = self.projects.lock().await;
            let options = ResolveOptions::from(&self.config.resolver);
            projects
                .entry(project_id.clone())
                .or_insert_with(|| ProjectState::new(&project_id, options))
                .overlay
                .insert(params.document_id.clone(), params.data.clone());
        }

        let handle = self
            .debouncer
            .submit(UpdateDocument {
                document_id: params.document_id.clone(),
                data: params.data,
            })
            .await;

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Some(Err(LineageError::internal(e.to_string()))),
        };

        match outcome {
            Some(Ok(doc)) => {
                ToolResult::success(format!("Updated {} at {}", doc.id, doc.updated_at))
            }
            Some(Err(e)) => {
                if let Some(state) = self.projects.lock().await.get_mut(&project_id) {
                    state.overlay.remove(&params.document_id);
                }
                e.into()
            }
            None => ToolResult::success(format!(
                "Update of {} superseded by a newer update",
                params.document_id
            )),
        }
    }

    /// List the lineage chain of a document path.
    pub async fn history(&self, params: PathParams) -> ToolResult {
        let result = async {
            let project_id = self.project_id(params.project_id)?;
            let path = Self::parse_path(&params.path)?;
            let view = self.view(&project_id).await?;
            let options = ResolveOptions::from(&self.config.resolver);
            let resolved = lineage_query::find_latest_document_with(
                &view.graph,
                Some(params.document_id.as_str()),
                &path,
                options,
            );
            if resolved.lineage_path.is_empty() {
                return Err(ToolResult::error(format!(
                    "Document '{}' not found in project '{}'.",
                    params.document_id, project_id
                )));
            }

            let mut output = format!("Lineage of {} at {}:\n\n", params.document_id, path);
            for step in &resolved.lineage_path {
                let Some(doc) = view.graph.document(&step.document_id) else {
                    continue;
                };
                let via = step
                    .via_transform
                    .as_deref()
                    .map(|t| format!(" via {}", t))
                    .unwrap_or_default();
                output.push_str(&format!(
                    "{}. {} [{}, {}] at {}{} \"{}\"\n",
                    step.depth,
                    doc.id,
                    doc.schema_type,
                    doc.origin_type.as_str(),
                    step.path,
                    via,
                    DocumentContent::of(doc).label()
                ));
            }
            Ok(ToolResult::success(output))
        };
        result.await.unwrap_or_else(|e| e)
    }
}

fn describe_editability(document_id: &str, path: &DerivationPath, decision: &Editability) -> String {
    match decision {
        Editability::EditableInPlace => format!("{} is user content; update it in place", document_id),
        Editability::NavigateTo { document_id: target } => {
            format!("{} at {} was already edited; edit {} instead", document_id, path, target)
        }
        Editability::Promotable => {
            format!("{} at {} can be edited as a new human transform", document_id, path)
        }
        Editability::ReadOnly { latest: Some(latest) } => {
            format!("{} at {} has newer versions; latest is {}", document_id, path, latest)
        }
        Editability::ReadOnly { latest: None } => format!(
            "{} is already derived from, but {} has no newer version; a human transform may be created",
            document_id, path
        ),
        Editability::Missing => format!("Document '{}' not found", document_id),
    }
}

/// Service info.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Tool info.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}
