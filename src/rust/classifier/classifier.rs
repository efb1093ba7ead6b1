use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use log::{error, info};

use super::adapter::{AdapterLoader, SharedAdapter, ZeroShotImageClassifier};
use super::category::{resolve, ClassificationResult, CANDIDATE_LABELS};
use super::error::ClassifierError;
use super::preprocess::decode_image;

/// Classifies photos of waste into a disposal category with guidance.
///
/// The inference adapter is loaded on the first classification (or on
/// [`preload`]) and reused for every later call. Concurrent first calls share a single load.
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use wastesort::{ClipModelLoader, WasteClassifier};
///
/// let classifier = WasteClassifier::new(ClipModelLoader::default());
/// let bytes = std::fs::read("bottle.jpg")?;
/// let result = classifier.classify_waste_image(&bytes).await?;
/// println!("{}: {}", result.category, result.description);
/// # Ok(())
/// # }
/// ```
///
/// [`preload`]: WasteClassifier::preload
pub struct WasteClassifier<L: AdapterLoader> {
    adapter: SharedAdapter<L>,
}

impl<L: AdapterLoader> WasteClassifier<L> {
    pub fn new(loader: L) -> Self {
        Self {
            adapter: SharedAdapter::new(loader),
        }
    }

    /// Loads the adapter now instead of on the first request.
    ///
    /// # Errors
    /// `InferenceError` if the model cannot be loaded. The failure is not cached.
    pub async fn preload(&self) -> Result<(), ClassifierError> {
        self.adapter.get().await.map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.adapter.is_loaded()
    }

    pub fn loader(&self) -> &L {
        self.adapter.loader()
    }

    /// Classifies an encoded image (PNG, JPEG, ...).
    ///
    /// A failure never produces a result, in particular never a `general` one.
    ///
    /// # Errors
    /// - `DecodeError` if the bytes are not a decodable image
    /// - `InferenceError` if the model cannot be loaded or run
    pub async fn classify_waste_image(
        &self,
        bytes: &[u8],
    ) -> Result<ClassificationResult, ClassifierError> {
        let adapter = self.adapter.get().await?;
        let bytes = bytes.to_vec();
        Self::run_blocking(adapter, move || decode_image(&bytes)).await
    }

    /// Reads an image file and classifies it.
    ///
    /// # Errors
    /// `DecodeError` if the file cannot be read, otherwise as
    /// [`classify_waste_image`](Self::classify_waste_image).
    pub async fn classify_waste_image_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ClassificationResult, ClassifierError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ClassifierError::DecodeError(format!("Failed to read {:?}: {}", path, e))
        })?;
        self.classify_waste_image(&bytes).await
    }

    /// Classifies an image that is already decoded.
    ///
    /// # Errors
    /// `InferenceError` if the model cannot be loaded or run.
    pub async fn classify_decoded(
        &self,
        image: DynamicImage,
    ) -> Result<ClassificationResult, ClassifierError> {
        let adapter = self.adapter.get().await?;
        Self::run_blocking(adapter, move || Ok(image)).await
    }

    /// Decodes and classifies on the blocking pool, as two separate tasks so a
    /// panic is reported against the stage it happened in.
    async fn run_blocking<F>(
        adapter: Arc<L::Adapter>,
        decode: F,
    ) -> Result<ClassificationResult, ClassifierError>
    where
        F: FnOnce() -> Result<DynamicImage, ClassifierError> + Send + 'static,
    {
        let result = match tokio::task::spawn_blocking(decode).await {
            Ok(Ok(image)) => tokio::task::spawn_blocking(move || {
                classify_with(adapter.as_ref(), &image)
            })
            .await
            .unwrap_or_else(|e| {
                Err(ClassifierError::InferenceError(format!("Classification task failed: {}", e)))
            }),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ClassifierError::DecodeError(format!("Image decoding failed: {}", e))),
        };

        if let Err(e) = &result {
            error!("Error classifying waste image: {}", e);
        }
        result
    }
}

/// Runs one zero-shot pass over the fixed candidate labels and resolves the winner.
///
/// # Errors
/// Any adapter error, or `InferenceError` if the adapter ranks no labels.
pub fn classify_with<A>(
    adapter: &A,
    image: &DynamicImage,
) -> Result<ClassificationResult, ClassifierError>
where
    A: ZeroShotImageClassifier + ?Sized,
{
    info!("Running image classification...");
    let ranked = adapter.classify(image, CANDIDATE_LABELS)?;
    let top = ranked
        .first()
        .ok_or_else(|| ClassifierError::InferenceError("Classifier returned no labels".into()))?;

    let result = resolve(&top.label, top.score);
    info!(
        "Top label '{}' ({:.3}) resolved to {}",
        top.label, top.score, result.category
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::adapter::LabelScore;
    use crate::WasteCategory;
    use image::RgbImage;

    #[derive(Clone)]
    struct Empty;

    impl ZeroShotImageClassifier for Empty {
        fn classify(
            &self,
            _: &DynamicImage,
            _: &[&str],
        ) -> Result<Vec<LabelScore>, ClassifierError> {
            Ok(Vec::new())
        }
    }

    #[derive(Clone)]
    struct Panics;

    impl ZeroShotImageClassifier for Panics {
        fn classify(
            &self,
            _: &DynamicImage,
            _: &[&str],
        ) -> Result<Vec<LabelScore>, ClassifierError> {
            panic!("model crashed");
        }
    }

    struct Ready<A>(A);

    #[async_trait::async_trait]
    impl<A: ZeroShotImageClassifier + Clone + 'static> AdapterLoader for Ready<A> {
        type Adapter = A;

        async fn load(&self) -> Result<A, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Clone)]
    struct EchoLabels;

    impl ZeroShotImageClassifier for EchoLabels {
        fn classify(
            &self,
            _: &DynamicImage,
            labels: &[&str],
        ) -> Result<Vec<LabelScore>, ClassifierError> {
            assert_eq!(labels, CANDIDATE_LABELS);
            Ok(vec![LabelScore::new("Plastic Bottle", 0.6), LabelScore::new("trash", 0.4)])
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(2, 2))
    }

    #[test]
    fn test_empty_ranking_is_an_error() {
        let result = classify_with(&Empty, &blank());
        assert!(matches!(result, Err(ClassifierError::InferenceError(_))));
    }

    #[test]
    fn test_top_label_is_resolved() {
        let result = classify_with(&EchoLabels, &blank()).unwrap();
        assert_eq!(result.category, WasteCategory::Recyclable);
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.description, "This appears to be plastic waste.");
    }

    #[tokio::test]
    async fn test_decode_panic_is_decode_error() {
        let result = WasteClassifier::<Ready<EchoLabels>>::run_blocking(
            Arc::new(EchoLabels),
            || -> Result<DynamicImage, ClassifierError> { panic!("decoder crashed") },
        )
        .await;
        assert!(matches!(result, Err(ClassifierError::DecodeError(_))));
    }

    #[tokio::test]
    async fn test_inference_panic_is_inference_error() {
        let classifier = WasteClassifier::new(Ready(Panics));
        let result = classifier.classify_decoded(blank()).await;
        assert!(matches!(result, Err(ClassifierError::InferenceError(_))));
    }

    #[tokio::test]
    async fn test_classify_decoded_resolves() {
        let classifier = WasteClassifier::new(Ready(EchoLabels));
        let result = classifier.classify_decoded(blank()).await.unwrap();
        assert_eq!(result.category, WasteCategory::Recyclable);
        assert!(classifier.is_loaded());
    }
}
