pub mod adapter;
pub mod category;
#[allow(clippy::module_inception)]
pub mod classifier;
pub mod clip;
pub mod error;
pub mod preprocess;
mod utils;

pub use adapter::{AdapterLoader, LabelScore, SharedAdapter, ZeroShotImageClassifier};
pub use category::{
    default_rule, match_rule, resolve, CategoryRule, ClassificationResult, WasteCategory,
    CANDIDATE_LABELS, CATEGORY_RULES,
};
pub use classifier::{classify_with, WasteClassifier};
pub use clip::{ClipClassifier, ClipModelLoader, ModelSource};
pub use error::ClassifierError;
