// THEORY:
// The hosting layer around the audit engine. It owns everything the engine
// deliberately knows nothing about: where uploads land, how big they may be,
// which file types are accepted and which fidelity mode audits run in. All of
// it lives in one `ServerConfig` built once at startup and handed to the
// server; there is no global state.
//
// The upload policy (`allowed_file`, `secure_filename`, `unique_filename`,
// `store_upload`) is plain synchronous code so it can be used and tested
// without the HTTP stack. The HTTP surface itself sits behind the `web`
// feature.

use std::path::{Path, PathBuf};

use shelf_audit::{AuditError, FidelityMode};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "txt"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub mode: FidelityMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            mode: FidelityMode::Full,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SA_BIND`, `SA_UPLOAD_DIR` and `SA_MODE`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Ok(bind) = std::env::var("SA_BIND") {
            if !bind.is_empty() {
                cfg.bind_addr = bind;
            }
        }
        if let Ok(dir) = std::env::var("SA_UPLOAD_DIR") {
            if !dir.is_empty() {
                cfg.upload_dir = PathBuf::from(dir);
            }
        }
        if let Ok(mode) = std::env::var("SA_MODE") {
            cfg.mode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        Ok(cfg)
    }

    /// True when `name` has an extension on the allow-list (case-insensitive).
    pub fn allowed_file(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No image or metadata file provided")]
    MissingField(&'static str),
    #[error("No selected file")]
    NoSelectedFile(&'static str),
    #[error("Invalid file type: {0}")]
    DisallowedExtension(String),
    #[error("Upload exceeds the {0} byte limit")]
    TooLarge(usize),
    #[error("malformed upload: {0}")]
    Malformed(String),
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl UploadError {
    /// Whether the client is at fault, as opposed to the server.
    pub fn is_client_error(&self) -> bool {
        match self {
            UploadError::Io(_) => false,
            UploadError::Audit(err) => !matches!(err, AuditError::Worker(_)),
            _ => true,
        }
    }
}

/// Lowercased text after the last dot, if any.
fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Reduces a client-supplied name to a safe single path component.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// `YYYYmmdd_HHMMSS_<8 hex>` plus the lowercased extension of `name`.
pub fn unique_filename(name: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    match extension(name) {
        Some(ext) => format!("{timestamp}_{}.{ext}", &id[..8]),
        None => format!("{timestamp}_{}", &id[..8]),
    }
}

/// Rejects a client-supplied name whose sanitised form is not on the allow-list.
pub fn check_upload_name(cfg: &ServerConfig, original_name: &str) -> Result<(), UploadError> {
    if cfg.allowed_file(&secure_filename(original_name)) {
        Ok(())
    } else {
        Err(UploadError::DisallowedExtension(original_name.to_string()))
    }
}

/// Validates and writes one uploaded file into `upload_dir`, returning the
/// stored file name.
pub fn store_upload(cfg: &ServerConfig, original_name: &str, bytes: &[u8]) -> Result<String, UploadError> {
    check_upload_name(cfg, original_name)?;
    let safe = secure_filename(original_name);
    std::fs::create_dir_all(&cfg.upload_dir)?;
    let stored = unique_filename(&safe);
    std::fs::write(cfg.upload_dir.join(&stored), bytes)?;
    tracing::debug!(original = original_name, stored = %stored, bytes = bytes.len(), "upload stored");
    Ok(stored)
}

/// Path of a stored upload.
pub fn upload_path(cfg: &ServerConfig, stored_name: &str) -> PathBuf {
    Path::new(&cfg.upload_dir).join(stored_name)
}

#[cfg(feature = "web")]
mod web {
    use std::sync::Arc;

    use axum::extract::multipart::MultipartError;
    use axum::extract::{DefaultBodyLimit, Multipart, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use shelf_audit::{AuditConfig, AuditJob, AuditResult, AuditWorkerPool};
    use tower_http::services::ServeDir;

    use super::*;

    #[derive(Clone)]
    struct AppState {
        cfg: Arc<ServerConfig>,
        pool: Arc<AuditWorkerPool>,
    }

    struct Upload {
        file_name: String,
        data: Vec<u8>,
    }

    pub fn router(cfg: ServerConfig) -> Router {
        let pool = AuditWorkerPool::new(AuditConfig { mode: cfg.mode });
        let limit = cfg.max_upload_bytes;
        let uploads = ServeDir::new(&cfg.upload_dir);
        let state = AppState {
            cfg: Arc::new(cfg),
            pool: Arc::new(pool),
        };

        Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .route("/api/analyze", post(analyze))
            .nest_service("/uploads", uploads)
            .layer(DefaultBodyLimit::max(limit))
            .with_state(state)
    }

    async fn analyze(State(state): State<AppState>, multipart: Multipart) -> Response {
        match analyze_upload(&state, multipart).await {
            Ok(result) => Json(result).into_response(),
            Err(err) => {
                let status = match &err {
                    UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                    err if err.is_client_error() => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                tracing::warn!(error = %err, status = status.as_u16(), "analyze request rejected");
                (status, Json(json!({ "error": err.to_string() }))).into_response()
            }
        }
    }

    fn multipart_error(cfg: &ServerConfig, err: MultipartError) -> UploadError {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge(cfg.max_upload_bytes)
        } else {
            UploadError::Malformed(err.body_text())
        }
    }

    async fn analyze_upload(state: &AppState, mut multipart: Multipart) -> Result<AuditResult, UploadError> {
        let mut image = None;
        let mut metadata = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&state.cfg, e))?
        {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(&state.cfg, e))?
                .to_vec();
            match name.as_str() {
                "image" => image = Some(Upload { file_name, data }),
                "metadata" => metadata = Some(Upload { file_name, data }),
                _ => {}
            }
        }

        let image = image.ok_or(UploadError::MissingField("image"))?;
        let metadata = metadata.ok_or(UploadError::MissingField("metadata"))?;
        if image.file_name.is_empty() || image.data.is_empty() {
            return Err(UploadError::NoSelectedFile("image"));
        }
        if metadata.file_name.is_empty() {
            return Err(UploadError::NoSelectedFile("metadata"));
        }
        // Both names are checked before either file touches the disk.
        check_upload_name(&state.cfg, &image.file_name)?;
        check_upload_name(&state.cfg, &metadata.file_name)?;

        let image_name = store_upload(&state.cfg, &image.file_name, &image.data)?;
        let metadata_name = store_upload(&state.cfg, &metadata.file_name, &metadata.data)?;

        let job = AuditJob::new(
            upload_path(&state.cfg, &image_name),
            upload_path(&state.cfg, &metadata_name),
        );
        let mut result = state.pool.audit(job).await?;
        result.image_ref = format!("/uploads/{image_name}");
        Ok(result)
    }
}

#[cfg(feature = "web")]
pub use web::router;

#[cfg(feature = "web")]
pub async fn start_server(cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    std::fs::create_dir_all(&cfg.upload_dir)?;
    let bind_addr = cfg.bind_addr.clone();
    let mode = cfg.mode;
    let app = router(cfg);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, %mode, "shelf audit server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server stopped");
        }
    });
    Ok(server)
}

#[cfg(not(feature = "web"))]
pub async fn start_server(_cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for shelf_audit_server"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_is_case_insensitive() {
        let cfg = ServerConfig::default();
        assert!(cfg.allowed_file("shelf.PNG"));
        assert!(cfg.allowed_file("photo.jpeg"));
        assert!(cfg.allowed_file("manifest.txt"));
        assert!(!cfg.allowed_file("shelf.gif"));
        assert!(!cfg.allowed_file("shelf"));
        assert!(!cfg.allowed_file("shelf."));
    }

    #[test]
    fn secure_filename_strips_directories_and_odd_characters() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename(r"C:\photos\my shelf.jpg"), "my_shelf.jpg");
        assert_eq!(secure_filename("shelf (1)#.png"), "shelf_1.png");
        assert_eq!(secure_filename("..."), "");
    }

    #[test]
    fn unique_filename_has_timestamp_id_and_lower_extension() {
        let name = unique_filename("Shelf.JPG");
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpg");

        let parts: Vec<&str> = stem.split('_').collect();
        assert_eq!(parts.len(), 3, "{name}");
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
        assert!(parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit())));

        assert_ne!(unique_filename("a.png"), unique_filename("a.png"));
    }

    #[test]
    fn store_upload_writes_into_the_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig {
            upload_dir: dir.path().join("uploads"),
            ..ServerConfig::default()
        };

        let stored = store_upload(&cfg, "../shelf.png", b"bytes").unwrap();
        assert!(stored.ends_with(".png"));
        assert_eq!(std::fs::read(upload_path(&cfg, &stored)).unwrap(), b"bytes");

        let err = store_upload(&cfg, "payload.exe", b"MZ").unwrap_err();
        assert!(matches!(err, UploadError::DisallowedExtension(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn engine_failures_map_to_client_or_server_errors() {
        assert!(UploadError::from(AuditError::Decode("bad".into())).is_client_error());
        assert!(!UploadError::from(AuditError::Worker("gone".into())).is_client_error());
        assert!(!UploadError::from(std::io::Error::other("disk")).is_client_error());
    }

    #[test]
    fn upload_names_are_checked_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig {
            upload_dir: dir.path().join("uploads"),
            ..ServerConfig::default()
        };

        assert!(check_upload_name(&cfg, "../shelf.PNG").is_ok());
        assert!(matches!(
            check_upload_name(&cfg, "x.exe"),
            Err(UploadError::DisallowedExtension(name)) if name == "x.exe"
        ));
        assert!(!cfg.upload_dir.exists());
    }

    #[cfg(not(feature = "web"))]
    #[tokio::test]
    async fn start_server_requires_the_web_feature() {
        assert!(start_server(ServerConfig::default()).await.is_err());
    }
}
