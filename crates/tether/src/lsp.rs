//! Language server for tether.
//!
//! Anchors are rendered as hint diagnostics on the lines they currently
//! cover. A code action offers "Add annotation" for the current selection;
//! the client asks the user for a message and sends it back through the
//! `tether.addAnnotation` command.
//!
//! The protocol-independent part lives in [`AnchorService`] so it can be
//! exercised without a client; [`Backend`] only forwards to it and pushes
//! the results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::Result;
use serde_json::Value;
use tether_core::{
    Anchor, AnchorError, GitCli, LineRange, Orchestrator, VisibleAnchor, split_lines,
};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{self, ErrorCode, Result as LspResult};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, error, info};

use crate::config::{default_config_path, load_config_or_default};

/// Command executed by the client to create an annotation.
///
/// Arguments: `[uri, range, message]`.
pub const ADD_ANNOTATION_COMMAND: &str = "tether.addAnnotation";

/// Diagnostic source shown by editors.
pub const DIAGNOSTIC_SOURCE: &str = "tether";

/// Run the language server over stdio.
pub async fn run(root: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let project_root = match root {
        Some(r) => r,
        None => crate::find_project_root()?,
    };
    let config_path = config_path.unwrap_or_else(|| default_config_path(&project_root));
    let config = load_config_or_default(&config_path);

    info!(root = %project_root.display(), "starting language server");
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(GitCli::default()),
        config.settings(),
    ));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(|client| {
        Backend::new(client, AnchorService::new(Arc::clone(&orchestrator)))
    });
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

/// Document cache plus the anchor operations behind each LSP request.
pub struct AnchorService {
    orchestrator: Arc<Orchestrator>,
    /// Document content cache: uri -> content
    documents: RwLock<HashMap<String, String>>,
}

impl AnchorService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn document_opened(&self, uri: &Url, content: String) {
        self.documents.write().await.insert(uri.to_string(), content);
    }

    pub async fn document_changed(&self, uri: &Url, content: String) {
        self.documents.write().await.insert(uri.to_string(), content);
    }

    pub async fn document_closed(&self, uri: &Url) {
        self.documents.write().await.remove(uri.as_str());
    }

    /// Buffer text if the document is open, disk content otherwise.
    async fn document_text(&self, uri: &Url, path: &Path) -> Option<String> {
        if let Some(text) = self.documents.read().await.get(uri.as_str()) {
            return Some(text.clone());
        }

        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || std::fs::read_to_string(path)).await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                debug!(%uri, error = %e, "document not readable");
                None
            }
            Err(e) => {
                error!(%uri, error = %e, "blocking read failed");
                None
            }
        }
    }

    /// Hints for every visible anchor of `uri`.
    ///
    /// `None` means nothing should be published (not a file, unreadable, or
    /// the anchor file could not be accessed).
    pub async fn diagnostics(&self, uri: &Url) -> Option<Vec<Diagnostic>> {
        let path = uri.to_file_path().ok()?;
        let text = self.document_text(uri, &path).await?;

        let context = self.orchestrator.repo_context(&path).await;
        match self
            .orchestrator
            .recover_visible(&path, &text, &context)
            .await
        {
            Ok(visible) => Some(
                visible
                    .iter()
                    .map(|v| anchor_diagnostic(v, &text))
                    .collect(),
            ),
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not recover anchors");
                None
            }
        }
    }

    /// The "Add annotation" action for a selection in `uri`.
    pub fn code_actions(&self, uri: &Url, range: Range) -> Vec<CodeActionOrCommand> {
        if uri.to_file_path().is_err() {
            return Vec::new();
        }

        vec![CodeActionOrCommand::CodeAction(CodeAction {
            title: "Add annotation".to_string(),
            kind: Some(CodeActionKind::QUICKFIX),
            command: Some(Command {
                title: "Add annotation".to_string(),
                command: ADD_ANNOTATION_COMMAND.to_string(),
                arguments: Some(vec![
                    Value::String(uri.to_string()),
                    serde_json::json!(range),
                ]),
            }),
            ..Default::default()
        })]
    }

    /// Execute `tether.addAnnotation [uri, range, message]`.
    ///
    /// Returns the uri whose diagnostics changed along with the new anchor.
    pub async fn add_annotation(&self, arguments: &[Value]) -> LspResult<(Url, Anchor)> {
        let (uri, range, message) = parse_add_arguments(arguments)?;
        let path = uri
            .to_file_path()
            .map_err(|()| jsonrpc::Error::invalid_params(format!("not a file uri: {uri}")))?;
        let text = self.document_text(&uri, &path).await.ok_or_else(|| {
            jsonrpc::Error::invalid_params(format!("cannot read {}", path.display()))
        })?;

        let anchor = self
            .orchestrator
            .create_anchor_in_text(&path, &text, line_range_from_lsp(&range), &message)
            .await
            .map_err(|e| {
                error!(path = %path.display(), error = %e, "could not create anchor");
                anchor_error_to_rpc(e)
            })?;

        Ok((uri, anchor))
    }
}

fn anchor_error_to_rpc(e: AnchorError) -> jsonrpc::Error {
    match e {
        AnchorError::EmptyMessage | AnchorError::InvalidRange { .. } => {
            jsonrpc::Error::invalid_params(e.to_string())
        }
        other => jsonrpc::Error {
            code: ErrorCode::InternalError,
            message: other.to_string().into(),
            data: None,
        },
    }
}

/// Validate `[uri, range, message]`.
pub fn parse_add_arguments(arguments: &[Value]) -> LspResult<(Url, Range, String)> {
    let [uri, range, message] = arguments else {
        return Err(jsonrpc::Error::invalid_params(format!(
            "{ADD_ANNOTATION_COMMAND} expects 3 arguments (uri, range, message), got {}",
            arguments.len()
        )));
    };

    let uri = uri
        .as_str()
        .ok_or_else(|| jsonrpc::Error::invalid_params("argument 1 (uri) must be a string"))?;
    let uri = Url::parse(uri)
        .map_err(|e| jsonrpc::Error::invalid_params(format!("argument 1 (uri) is invalid: {e}")))?;

    let range: Range = serde_json::from_value(range.clone()).map_err(|e| {
        jsonrpc::Error::invalid_params(format!("argument 2 (range) is invalid: {e}"))
    })?;

    let message = message
        .as_str()
        .ok_or_else(|| jsonrpc::Error::invalid_params("argument 3 (message) must be a string"))?;

    Ok((uri, range, message.to_string()))
}

/// Lines covered by an editor selection.
///
/// A selection that ends at column 0 of a later line (a full-line
/// selection) does not include that line.
pub fn line_range_from_lsp(range: &Range) -> LineRange {
    let start = range.start.line as usize;
    let mut end = range.end.line as usize;
    if range.end.character == 0 && end > start {
        end -= 1;
    }
    LineRange::new(start, end)
}

/// Hint spanning the anchor's lines, from column 0 to the end of the last line.
pub fn anchor_diagnostic(visible: &VisibleAnchor, text: &str) -> Diagnostic {
    let lines = split_lines(text);
    let end_character = lines
        .get(visible.range.end)
        .map(|line| line.trim_end_matches('\r').encode_utf16().count() as u32)
        .unwrap_or(0);

    Diagnostic {
        range: Range {
            start: Position {
                line: visible.range.start as u32,
                character: 0,
            },
            end: Position {
                line: visible.range.end as u32,
                character: end_character,
            },
        },
        severity: Some(DiagnosticSeverity::HINT),
        source: Some(DIAGNOSTIC_SOURCE.into()),
        message: visible.anchor.message.clone(),
        data: Some(serde_json::json!({ "anchorId": visible.anchor.id })),
        ..Default::default()
    }
}

pub struct Backend {
    client: Client,
    service: AnchorService,
}

impl Backend {
    pub fn new(client: Client, service: AnchorService) -> Self {
        Self { client, service }
    }

    async fn publish_diagnostics(&self, uri: Url) {
        let Some(diagnostics) = self.service.diagnostics(&uri).await else {
            return;
        };
        self.client
            .publish_diagnostics(uri, diagnostics, None)
            .await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _: InitializeParams) -> LspResult<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![ADD_ANNOTATION_COMMAND.to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "tether".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "tether language server initialized")
            .await;
    }

    async fn shutdown(&self) -> LspResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.service
            .document_opened(&uri, params.text_document.text)
            .await;
        self.publish_diagnostics(uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // Full sync: the last change carries the whole document.
        if let Some(change) = params.content_changes.into_iter().last() {
            self.service.document_changed(&uri, change.text).await;
            self.publish_diagnostics(uri).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(text) = params.text {
            self.service.document_changed(&uri, text).await;
        }
        self.publish_diagnostics(uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.service.document_closed(&params.text_document.uri).await;
    }

    async fn code_action(&self, params: CodeActionParams) -> LspResult<Option<CodeActionResponse>> {
        let actions = self
            .service
            .code_actions(&params.text_document.uri, params.range);
        Ok((!actions.is_empty()).then_some(actions))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> LspResult<Option<Value>> {
        if params.command != ADD_ANNOTATION_COMMAND {
            return Err(jsonrpc::Error::invalid_params(format!(
                "unknown command: {}",
                params.command
            )));
        }

        let (uri, anchor) = match self.service.add_annotation(&params.arguments).await {
            Ok(created) => created,
            Err(e) => {
                if e.code == ErrorCode::InternalError {
                    self.client
                        .show_message(MessageType::ERROR, format!("tether: {}", e.message))
                        .await;
                }
                return Err(e);
            }
        };

        self.publish_diagnostics(uri).await;
        Ok(Some(serde_json::json!({ "id": anchor.id })))
    }
}
