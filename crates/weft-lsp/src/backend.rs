//! The language server backend.
//!
//! Grounds the editor protocol in the provider and the store: document
//! events re-parse through the shared cache and publish merged
//! (file-level + project-level) diagnostics, monotone in document
//! version; requests read the cached artifacts and never recompute
//! analysis.

use crate::completion::{detect_context, items_for};
use crate::definition::definition_at;
use crate::diagnostics::{file_diagnostics, to_lsp_diagnostic, PublishGuard};
use crate::document::DocumentStore;
use crate::hover::hover_markdown;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{info, warn};
use weft_core::macros::MacroNamespace;
use weft_core::types::Fix;
use weft_engine::config::{ProjectConfig, CONFIG_FILE};
use weft_engine::discovery;
use weft_engine::health::run_project_rules;
use weft_engine::provider::Provider;
use weft_store::Store;

pub struct Backend {
    client: Client,
    documents: RwLock<DocumentStore>,
    provider: RwLock<Option<Arc<Provider>>>,
    config: RwLock<Option<ProjectConfig>>,
    root: RwLock<Option<PathBuf>>,
    publish_guard: Mutex<PublishGuard>,
    /// `(uri, rule_id)` → fixes from the last lint of that URI.
    fix_cache: RwLock<HashMap<(String, String), Vec<Fix>>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: RwLock::new(DocumentStore::default()),
            provider: RwLock::new(None),
            config: RwLock::new(None),
            root: RwLock::new(None),
            publish_guard: Mutex::new(PublishGuard::default()),
            fix_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn provider(&self) -> Option<Arc<Provider>> {
        self.provider.read().await.clone()
    }

    async fn namespaces(&self) -> Vec<MacroNamespace> {
        match self.provider().await {
            Some(provider) => provider.store().list_macro_namespaces().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Recomputes and publishes diagnostics for one URI: file-level
    /// and project-level merged into a single publication.
    async fn publish(&self, uri: Url) {
        let Some(provider) = self.provider().await else {
            return;
        };
        let (content, version) = {
            let documents = self.documents.read().await;
            let Some(document) = documents.get(uri.as_str()) else {
                return;
            };
            (document.content.clone(), document.version)
        };

        let parsed = provider.get_or_parse(uri.as_str(), &content, version);
        let namespaces = self.namespaces().await;
        let mut diagnostics = file_diagnostics(&parsed, &namespaces);

        // Project-level diagnostics for this file, merged into the
        // same publication.
        if let Ok(context) = provider.project_context() {
            if let Ok(file_path) = uri.to_file_path() {
                let file_key = file_path.to_string_lossy().into_owned();
                if let Ok(project_diagnostics) = run_project_rules(&context) {
                    diagnostics.extend(
                        project_diagnostics
                            .into_iter()
                            .filter(|d| d.file_path == file_key)
                            .map(|d| d.diagnostic),
                    );
                }
            }
        }

        // Refresh the fix cache for this URI.
        {
            let mut cache = self.fix_cache.write().await;
            cache.retain(|(cached_uri, _), _| cached_uri != uri.as_str());
            for diagnostic in &diagnostics {
                if diagnostic.fixes.is_empty() {
                    continue;
                }
                cache
                    .entry((uri.to_string(), diagnostic.rule_id.clone()))
                    .or_default()
                    .extend(diagnostic.fixes.iter().cloned());
            }
        }

        let lsp_diagnostics: Vec<Diagnostic> =
            diagnostics.iter().map(to_lsp_diagnostic).collect();

        // The guard is held across the send so publications reach the
        // wire in admitted order; a stale version never goes out after
        // a newer one.
        let mut guard = self.publish_guard.lock().await;
        if guard.admit(uri.as_str(), version) {
            self.client
                .publish_diagnostics(uri, lsp_diagnostics, Some(version))
                .await;
        }
    }

    /// Save-time reindexing: models refresh the catalog row, macro
    /// scripts refresh their namespace.
    async fn reindex_saved(&self, uri: &Url, content: &str) {
        let Some(provider) = self.provider().await else {
            return;
        };
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        let store = provider.store();
        let extension = path.extension().and_then(|e| e.to_str());
        match extension {
            Some("sql") => {
                let models_dir = {
                    let root = self.root.read().await;
                    let config = self.config.read().await;
                    match (root.as_ref(), config.as_ref()) {
                        (Some(root), Some(config)) => root.join(&config.models_dir),
                        _ => return,
                    }
                };
                if let Err(err) = discovery::index_model(
                    &store,
                    &models_dir,
                    &path,
                    content,
                    provider.dialect(),
                ) {
                    warn!(uri = %uri, error = %err, "failed to reindex model on save");
                    return;
                }
                if let Err(err) = discovery::resolve_dependencies(&store) {
                    warn!(error = %err, "failed to refresh dependencies");
                }
                provider.invalidate_project_context();
            }
            Some("py") => {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let namespace = weft_core::macros::index_script(
                    &name,
                    &path.to_string_lossy(),
                    content,
                );
                if let Err(err) = store.save_macro_namespace(&namespace) {
                    warn!(uri = %uri, error = %err, "failed to reindex macro namespace");
                }
                provider.invalidate_project_context();
            }
            _ => {}
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let fallback_root = params
            .root_uri
            .as_ref()
            .and_then(|uri| uri.to_file_path().ok());
        let root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|folder| folder.uri.to_file_path().ok())
            .or(fallback_root);
        *self.root.write().await = root;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string(), " ".to_string()]),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "weft-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let root = self.root.read().await.clone();
        let Some(root) = root else {
            self.client
                .show_message(MessageType::WARNING, "weft: no workspace root; project features disabled")
                .await;
            return;
        };

        let (config, dialect) = match ProjectConfig::load(root.join(CONFIG_FILE)) {
            Ok(config) => {
                let dialect = config.dialect().unwrap_or_default();
                (Some(config), dialect)
            }
            Err(err) => {
                self.client
                    .show_message(
                        MessageType::WARNING,
                        format!("weft: {err}; using the generic dialect"),
                    )
                    .await;
                (None, weft_core::dialect::Dialect::Generic)
            }
        };

        let db_path = ProjectConfig::state_db_path(&root);
        let store = if db_path.exists() {
            match Store::open(&db_path) {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    self.client
                        .show_message(
                            MessageType::WARNING,
                            format!("weft: cannot open state store: {err}"),
                        )
                        .await;
                    Arc::new(Store::open_in_memory().unwrap_or_else(|_| {
                        unreachable!("in-memory store always opens")
                    }))
                }
            }
        } else {
            self.client
                .show_message(
                    MessageType::WARNING,
                    "weft: no state store found; run `weft parse` to index the project",
                )
                .await;
            match Store::open_in_memory() {
                Ok(store) => Arc::new(store),
                Err(_) => return,
            }
        };

        *self.config.write().await = config;
        *self.provider.write().await = Some(Arc::new(Provider::new(store, dialect)));
        info!(root = %root.display(), dialect = %dialect, "weft language server ready");
        self.client
            .log_message(MessageType::INFO, "weft language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(provider) = self.provider().await {
            provider.store().close();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        {
            let mut documents = self.documents.write().await;
            documents.open(
                uri.as_str(),
                params.text_document.text,
                params.text_document.version,
            );
        }
        self.publish(uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        // Full sync: the last change carries the whole document.
        let Some(change) = params.content_changes.into_iter().next_back() else {
            return;
        };
        {
            let mut documents = self.documents.write().await;
            documents.update(uri.as_str(), change.text, params.text_document.version);
        }
        self.publish(uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let content = match params.text {
            Some(text) => text,
            None => {
                let documents = self.documents.read().await;
                match documents.get(uri.as_str()) {
                    Some(document) => document.content.clone(),
                    None => return,
                }
            }
        };
        self.reindex_saved(&uri, &content).await;
        self.publish(uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        let mut documents = self.documents.write().await;
        documents.close(uri.as_str());
        let mut guard = self.publish_guard.lock().await;
        guard.forget(uri.as_str());
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let context = {
            let documents = self.documents.read().await;
            let Some(document) = documents.get(uri.as_str()) else {
                return Ok(None);
            };
            detect_context(document.text_before(position.line, position.character))
        };

        let namespaces = self.namespaces().await;
        let model_paths = match self.provider().await {
            Some(provider) => provider
                .project_context()
                .map(|context| context.models.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
            None => Vec::new(),
        };
        let items = items_for(&context, &namespaces, &model_paths);
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let namespaces = self.namespaces().await;

        let documents = self.documents.read().await;
        let Some(document) = documents.get(uri.as_str()) else {
            return Ok(None);
        };
        let offset = document.position_to_offset(position.line, position.character);
        Ok(hover_markdown(document, offset, &namespaces).map(|value| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            }),
            range: None,
        }))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let namespaces = self.namespaces().await;

        let target = {
            let documents = self.documents.read().await;
            let Some(document) = documents.get(uri.as_str()) else {
                return Ok(None);
            };
            let offset = document.position_to_offset(position.line, position.character);
            definition_at(document, offset, &namespaces)
        };
        let Some(target) = target else {
            return Ok(None);
        };

        let mut path = PathBuf::from(&target.file_path);
        if path.is_relative() {
            if let Some(root) = self.root.read().await.as_ref() {
                path = root.join(path);
            }
        }
        let Ok(target_uri) = Url::from_file_path(&path) else {
            return Ok(None);
        };
        let position = Position::new(target.line, 0);
        Ok(Some(GotoDefinitionResponse::Scalar(Location {
            uri: target_uri,
            range: Range {
                start: position,
                end: position,
            },
        })))
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let documents = self.documents.read().await;
        let Some(document) = documents.get(uri.as_str()) else {
            return Ok(None);
        };
        let cache = self.fix_cache.read().await;

        let mut actions = Vec::new();
        let mut total_fixes = 0usize;
        for diagnostic in &params.context.diagnostics {
            let Some(NumberOrString::String(rule_id)) = &diagnostic.code else {
                continue;
            };
            let Some(fixes) = cache.get(&(uri.to_string(), rule_id.clone())) else {
                continue;
            };
            total_fixes += fixes.len();
            for fix in fixes {
                let edits: Vec<TextEdit> = fix
                    .edits
                    .iter()
                    .map(|edit| {
                        let (start_line, start_character) =
                            document.offset_to_position(edit.start);
                        let (end_line, end_character) = document.offset_to_position(edit.end);
                        TextEdit {
                            range: Range {
                                start: Position::new(start_line, start_character),
                                end: Position::new(end_line, end_character),
                            },
                            new_text: edit.new_text.clone(),
                        }
                    })
                    .collect();
                let mut changes = HashMap::new();
                changes.insert(uri.clone(), edits);
                actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                    title: fix.title.clone(),
                    kind: Some(CodeActionKind::QUICKFIX),
                    diagnostics: Some(vec![diagnostic.clone()]),
                    edit: Some(WorkspaceEdit {
                        changes: Some(changes),
                        ..Default::default()
                    }),
                    ..Default::default()
                }));
            }
        }
        if actions.is_empty() {
            return Ok(None);
        }
        // Exactly one available fix marks itself preferred.
        if total_fixes == 1 {
            if let Some(CodeActionOrCommand::CodeAction(action)) = actions.first_mut() {
                action.is_preferred = Some(true);
            }
        }
        Ok(Some(actions))
    }
}

/// Serves the language server over stdio.
pub async fn run_stdio() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
