//! Waste image classification: a zero-shot CLIP model picks the best matching
//! material label for a photo, and a keyword table turns that label into a
//! disposal category with a short description and tips.
//!
//! # Basic Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("banana_peel.jpg")?;
//! let result = wastesort::classify_waste_image(&bytes).await?;
//! println!("{} ({:.0}%)", result.category, result.confidence * 100.0);
//! for tip in &result.tips {
//!     println!("  - {}", tip);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Label resolution
//!
//! Resolution is pure and never fails, so it can be used without a model:
//!
//! ```rust
//! use wastesort::{resolve, WasteCategory};
//!
//! let result = resolve("cardboard box", 0.8);
//! assert_eq!(result.category, WasteCategory::Recyclable);
//! assert_eq!(resolve("unknown object", 0.8).category, WasteCategory::General);
//! ```
//!
//! # Custom adapters
//!
//! [`WasteClassifier`] is generic over an [`AdapterLoader`], so any zero-shot
//! backend implementing [`ZeroShotImageClassifier`] can be plugged in.

use lazy_static::lazy_static;

pub mod classifier;
pub mod model_manager;
pub mod models;
mod runtime;

pub use classifier::{
    classify_with, default_rule, match_rule, resolve, AdapterLoader, CategoryRule,
    ClassificationResult, ClassifierError, ClipClassifier, ClipModelLoader, LabelScore, ModelSource,
    SharedAdapter, WasteCategory, WasteClassifier, ZeroShotImageClassifier, CANDIDATE_LABELS,
    CATEGORY_RULES,
};
pub use model_manager::{ModelError, ModelManager};
pub use models::{BuiltinModel, ModelCharacteristics, ModelInfo};
pub use runtime::{create_session_builder, RuntimeConfig};

lazy_static! {
    static ref DEFAULT_CLASSIFIER: WasteClassifier<ClipModelLoader> =
        WasteClassifier::new(ClipModelLoader::default());
}

/// Classifies an encoded image with the process-wide CLIP classifier.
///
/// The model is downloaded and loaded by the first call; every later call in the
/// process reuses it.
///
/// # Errors
/// See [`WasteClassifier::classify_waste_image`].
pub async fn classify_waste_image(bytes: &[u8]) -> Result<ClassificationResult, ClassifierError> {
    DEFAULT_CLASSIFIER.classify_waste_image(bytes).await
}

pub fn init_logger() {
    env_logger::init();
}
