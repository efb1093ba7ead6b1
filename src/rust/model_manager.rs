use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::models::ModelInfo;

/// Environment variable that overrides the cache root.
pub const CACHE_ENV_VAR: &str = "WASTESORT_CACHE";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Download of {url} failed with status {status}")]
    BadStatus { url: String, status: reqwest::StatusCode },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// Keeps model weights and tokenizers in a local cache directory.
///
/// Every cached file `f` is written as `f.part` and renamed into place once
/// complete, and its SHA-256 is recorded next to it in `f.sha256`. A cached file
/// is trusted only if it matches the pinned hash from [`ModelInfo`] or, when
/// none is pinned, the digest recorded at download time.
#[derive(Clone, Debug)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn partial_path(path: &Path) -> PathBuf {
    with_suffix(path, ".part")
}

fn digest_path(path: &Path) -> PathBuf {
    with_suffix(path, ".sha256")
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        if let Ok(path) = env::var(CACHE_ENV_VAR) {
            return PathBuf::from(path).join("models");
        }

        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("wastesort").join("models");
        }

        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("wastesort").join("models");
        }

        env::temp_dir().join("wastesort").join("models")
    }

    /// # Errors
    /// The directory cannot be created.
    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join("model.onnx")
    }

    pub fn get_tokenizer_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join("tokenizer.json")
    }

    pub fn is_model_downloaded(&self, name: &str) -> bool {
        let model_path = self.get_model_path(name);
        let tokenizer_path = self.get_tokenizer_path(name);
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        log::debug!(
            "Tokenizer path: {:?} (exists: {})",
            tokenizer_path,
            tokenizer_path.exists()
        );
        model_path.exists() && tokenizer_path.exists()
    }

    /// Downloads whichever of the model and tokenizer files is missing or fails
    /// verification.
    ///
    /// # Errors
    /// - `DownloadError` / `BadStatus` if a request fails
    /// - `HashMismatch` if downloaded bytes differ from a pinned hash
    /// - `IoError` if the cache directory cannot be written
    ///
    /// On any error both files are removed, so a later call starts clean.
    pub async fn download_model(&self, info: &ModelInfo) -> Result<(), ModelError> {
        let _lock = self.download_lock.lock().await;

        let model_dir = self.models_dir.join(&info.name);
        log::info!("Creating model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let model_path = self.get_model_path(&info.name);
        let model_result = self
            .fetch_if_invalid(&info.model_url, &model_path, info.model_hash.as_deref(), "model")
            .await;

        let tokenizer_path = self.get_tokenizer_path(&info.name);
        let tokenizer_result = self
            .fetch_if_invalid(
                &info.tokenizer_url,
                &tokenizer_path,
                info.tokenizer_hash.as_deref(),
                "tokenizer",
            )
            .await;

        match (model_result, tokenizer_result) {
            (Ok(()), Ok(())) => {
                log::info!("Model and tokenizer ready to use");
                Ok(())
            }
            (Err(e), _) => {
                log::error!("Failed to setup model file: {}", e);
                let _ = self.remove_download(&info.name);
                Err(e)
            }
            (_, Err(e)) => {
                log::error!("Failed to setup tokenizer file: {}", e);
                let _ = self.remove_download(&info.name);
                Err(e)
            }
        }
    }

    async fn fetch_if_invalid(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<(), ModelError> {
        if path.exists() {
            if self.verify_file(path, expected_hash)? {
                log::info!("Existing {} file verified successfully", file_type);
                return Ok(());
            }
            log::warn!("{} file verification failed, redownloading", file_type);
        }
        self.download_and_verify_file(url, path, expected_hash, file_type).await
    }

    /// Checks `path` against the pinned hash, or the recorded digest if none is pinned.
    /// A file with neither is not trusted.
    fn verify_file(&self, path: &Path, expected_hash: Option<&str>) -> Result<bool, ModelError> {
        if !path.exists() {
            return Ok(false);
        }
        let expected = match expected_hash {
            Some(hash) => hash.to_string(),
            None => match fs::read_to_string(digest_path(path)) {
                Ok(recorded) => recorded.trim().to_string(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::warn!("No pinned or recorded hash for {:?}", path);
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            },
        };
        let hash = sha256_hex(&fs::read(path)?);
        log::debug!("Calculated hash for {:?}: {} (expected {})", path, hash, expected);
        Ok(hash == expected)
    }

    /// Whether both files are present and match their pinned or recorded hashes.
    ///
    /// # Errors
    /// `IoError` if a file exists but cannot be read.
    pub fn verify_model(&self, info: &ModelInfo) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(&info.name);
        let tokenizer_path = self.get_tokenizer_path(&info.name);

        if !model_path.exists() || !tokenizer_path.exists() {
            log::info!("One or both model files do not exist");
            return Ok(false);
        }

        let model_ok = self.verify_file(&model_path, info.model_hash.as_deref())?;
        let tokenizer_ok = self.verify_file(&tokenizer_path, info.tokenizer_hash.as_deref())?;
        log::info!("Verification results: model={} tokenizer={}", model_ok, tokenizer_ok);

        Ok(model_ok && tokenizer_ok)
    }

    async fn download_and_verify_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<(), ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::BadStatus {
                url: url.to_string(),
                status,
            });
        }
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = sha256_hex(&bytes);
        if let Some(expected_hash) = expected_hash {
            if hash != expected_hash {
                log::error!(
                    "{} hash mismatch: expected {}, got {}",
                    file_type,
                    expected_hash,
                    hash
                );
                return Err(ModelError::HashMismatch {
                    file_type: file_type.to_string(),
                    expected: expected_hash.to_string(),
                    actual: hash,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // The final path only ever holds a complete file.
        remove_if_exists(&digest_path(path))?;
        let partial = partial_path(path);
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, path)?;
        fs::write(digest_path(path), &hash)?;

        if !self.verify_file(path, expected_hash)? {
            return Err(ModelError::VerificationFailed);
        }

        log::info!("{} file downloaded and verified successfully", file_type);
        Ok(())
    }

    /// Deletes the cached files of `name`, including partial downloads and digests.
    ///
    /// # Errors
    /// `IoError` if an existing file cannot be removed.
    pub fn remove_download(&self, name: &str) -> Result<(), ModelError> {
        for path in [self.get_model_path(name), self.get_tokenizer_path(name)] {
            remove_if_exists(&path)?;
            remove_if_exists(&partial_path(&path))?;
            remove_if_exists(&digest_path(&path))?;
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and verified.
    /// If the model doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    ///
    /// # Errors
    /// Any error from [`verify_model`](Self::verify_model) or
    /// [`download_model`](Self::download_model).
    pub async fn ensure_model_downloaded(&self, info: &ModelInfo) -> Result<(), ModelError> {
        if !self.is_model_downloaded(&info.name) {
            log::info!("Model {} not found, downloading...", info.name);
            self.download_model(info).await?;
        } else if !self.verify_model(info)? {
            log::info!("Model {} verification failed, re-downloading...", info.name);
            self.remove_download(&info.name)?;
            self.download_model(info).await?;
        } else {
            log::info!("Model {} verification successful", info.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const WEIGHTS: &[u8] = b"pretend these are quantized clip weights";

    fn scratch_dir(tag: &str) -> PathBuf {
        env::temp_dir().join(format!("wastesort-mm-{}-{}", tag, std::process::id()))
    }

    fn info_at(base: &str, name: &str, model_hash: Option<String>) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            model_url: format!("{}/model.onnx", base),
            tokenizer_url: format!("{}/tokenizer.json", base),
            model_hash,
            tokenizer_hash: None,
        }
    }

    fn unreachable_info(name: &str, model_hash: Option<String>) -> ModelInfo {
        info_at("http://127.0.0.1:9", name, model_hash)
    }

    /// Serves `WEIGHTS` for every request and counts the requests.
    async fn serve_weights() -> (SocketAddr, Arc<std::sync::atomic::AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut request = [0u8; 2048];
                    let _ = socket.read(&mut request).await;
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        WEIGHTS.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(WEIGHTS).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (addr, hits)
    }

    #[test]
    fn test_verify_model_with_pinned_hash() -> Result<(), ModelError> {
        let dir = scratch_dir("verify");
        let manager = ModelManager::new(&dir)?;
        let info = unreachable_info("tiny", Some(sha256_hex(b"weights")));

        assert!(!manager.verify_model(&info)?);

        fs::create_dir_all(dir.join("tiny"))?;
        let tokenizer_path = manager.get_tokenizer_path("tiny");
        fs::write(manager.get_model_path("tiny"), b"weights")?;
        fs::write(&tokenizer_path, b"{}")?;
        fs::write(digest_path(&tokenizer_path), sha256_hex(b"{}"))?;
        assert!(manager.is_model_downloaded("tiny"));
        assert!(manager.verify_model(&info)?);

        fs::write(manager.get_model_path("tiny"), b"corrupted data")?;
        assert!(!manager.verify_model(&info)?);

        manager.remove_download("tiny")?;
        assert!(!manager.is_model_downloaded("tiny"));
        assert!(!digest_path(&tokenizer_path).exists());
        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn test_unrecorded_file_is_not_trusted() -> Result<(), ModelError> {
        let dir = scratch_dir("unrecorded");
        let manager = ModelManager::new(&dir)?;
        let info = unreachable_info("bare", None);

        fs::create_dir_all(dir.join("bare"))?;
        fs::write(manager.get_model_path("bare"), WEIGHTS)?;
        fs::write(manager.get_tokenizer_path("bare"), b"{}")?;
        assert!(manager.is_model_downloaded("bare"));
        assert!(!manager.verify_model(&info)?);
        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[tokio::test]
    async fn test_download_records_digest_and_leaves_no_partial() -> Result<(), ModelError> {
        let (addr, _) = serve_weights().await;
        let dir = scratch_dir("download");
        let manager = ModelManager::new(&dir)?;
        let info = info_at(&format!("http://{}", addr), "served", None);

        manager.download_model(&info).await?;

        let model_path = manager.get_model_path("served");
        assert_eq!(fs::read(&model_path)?, WEIGHTS);
        assert!(!partial_path(&model_path).exists());
        assert_eq!(fs::read_to_string(digest_path(&model_path))?, sha256_hex(WEIGHTS));
        assert!(manager.verify_model(&info)?);
        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_model_is_redownloaded() -> Result<(), ModelError> {
        let (addr, hits) = serve_weights().await;
        let dir = scratch_dir("truncated");
        let manager = ModelManager::new(&dir)?;
        let info = info_at(&format!("http://{}", addr), "served", None);

        manager.download_model(&info).await?;
        let after_first = hits.load(std::sync::atomic::Ordering::SeqCst);

        let model_path = manager.get_model_path("served");
        fs::write(&model_path, &WEIGHTS[..10])?;
        assert!(!manager.verify_model(&info)?);

        manager.ensure_model_downloaded(&info).await?;
        assert_eq!(fs::read(&model_path)?, WEIGHTS);
        assert!(manager.verify_model(&info)?);
        assert!(hits.load(std::sync::atomic::Ordering::SeqCst) > after_first);
        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[tokio::test]
    async fn test_pinned_hash_mismatch_is_rejected() -> Result<(), ModelError> {
        let (addr, _) = serve_weights().await;
        let dir = scratch_dir("mismatch");
        let manager = ModelManager::new(&dir)?;
        let info = info_at(&format!("http://{}", addr), "served", Some(sha256_hex(b"other")));

        let result = manager.download_model(&info).await;
        assert!(matches!(result, Err(ModelError::HashMismatch { .. })));
        assert!(!manager.is_model_downloaded("served"));
        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_model_without_network_is_error() -> Result<(), ModelError> {
        let dir = scratch_dir("offline");
        let manager = ModelManager::new(&dir)?;
        let info = unreachable_info("offline", None);

        fs::create_dir_all(dir.join("offline"))?;
        let model_path = manager.get_model_path("offline");
        fs::write(&model_path, &WEIGHTS[..10])?;
        fs::write(digest_path(&model_path), sha256_hex(WEIGHTS))?;
        fs::write(manager.get_tokenizer_path("offline"), b"{}")?;

        assert!(manager.ensure_model_downloaded(&info).await.is_err());
        assert!(!manager.is_model_downloaded("offline"));
        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_download_cleans_up() {
        let dir = scratch_dir("unreachable");
        let manager = ModelManager::new(&dir).unwrap();
        let info = unreachable_info("missing", None);

        assert!(manager.download_model(&info).await.is_err());
        assert!(!manager.is_model_downloaded("missing"));
        let _ = fs::remove_dir_all(&dir);
    }
}
