use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use log::info;
use tokio::sync::OnceCell;

use super::error::ClassifierError;

/// A candidate label together with the score the model gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// A zero-shot image classifier scoring an image against caller-supplied text labels.
///
/// Implementations return the labels sorted by descending score. A successful call
/// returns at least one entry.
pub trait ZeroShotImageClassifier: Send + Sync {
    fn classify(
        &self,
        image: &DynamicImage,
        candidate_labels: &[&str],
    ) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Builds an inference adapter. Loading is expected to be slow (weights download,
/// session creation), so callers go through [`SharedAdapter`] rather than loading directly.
#[async_trait]
pub trait AdapterLoader: Send + Sync {
    type Adapter: ZeroShotImageClassifier + 'static;

    async fn load(&self) -> Result<Self::Adapter, ClassifierError>;
}

/// Holds an adapter that is loaded on first use and reused afterwards.
///
/// Concurrent callers arriving while the load is in flight wait on that same load.
/// A failed load leaves the cell empty, so a later call tries again.
pub struct SharedAdapter<L: AdapterLoader> {
    loader: L,
    cell: OnceCell<Arc<L::Adapter>>,
}

impl<L: AdapterLoader> SharedAdapter<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cell: OnceCell::new(),
        }
    }

    /// Returns the adapter, loading it on first use.
    ///
    /// # Errors
    /// Whatever the loader returns. A failed load is not cached, so the next
    /// call tries again.
    pub async fn get(&self) -> Result<Arc<L::Adapter>, ClassifierError> {
        let adapter = self
            .cell
            .get_or_try_init(|| async {
                info!("Loading image classification model...");
                let adapter = self.loader.load().await?;
                info!("Image classification model loaded");
                Ok::<_, ClassifierError>(Arc::new(adapter))
            })
            .await?;
        Ok(Arc::clone(adapter))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}
