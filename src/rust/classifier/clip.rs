use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::DynamicImage;
use log::{debug, error, info};
use ndarray::Array2;
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use tokenizers::Tokenizer;

use super::adapter::{AdapterLoader, LabelScore, ZeroShotImageClassifier};
use super::error::ClassifierError;
use super::preprocess::pixel_values;
use super::utils::{rank_labels, softmax};
use crate::runtime::{create_session_builder, RuntimeConfig};
use crate::{BuiltinModel, ModelCharacteristics, ModelManager};

/// Prompt each candidate label is wrapped in before it reaches the text tower.
pub const DEFAULT_HYPOTHESIS_TEMPLATE: &str = "This is a photo of {}";

const INPUT_IDS: &str = "input_ids";
const ATTENTION_MASK: &str = "attention_mask";
const PIXEL_VALUES: &str = "pixel_values";
const LOGITS_PER_IMAGE: &str = "logits_per_image";
const CLIP_END_OF_TEXT: &str = "<|endoftext|>";

/// Token ids and attention mask for a batch of label prompts, both `[num_labels, width]`.
#[derive(Debug)]
pub(crate) struct EncodedPrompts {
    pub ids: Array2<i64>,
    pub mask: Array2<i64>,
}

/// Padding id for the prompt batch: the tokenizer's own padding setting, then
/// CLIP's end-of-text token, then 0.
pub(crate) fn pad_token_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer
        .get_padding()
        .map(|padding| padding.pad_id)
        .or_else(|| tokenizer.token_to_id(CLIP_END_OF_TEXT))
        .unwrap_or(0)
}

/// Wraps each label in `template`, tokenizes, truncates to `max_length` and
/// right-pads every row to the longest one with `pad_id` (mask 0).
///
/// # Errors
/// - `InferenceError` if the tokenizer rejects a prompt
/// - `InferenceError` if no prompt produced any token
pub(crate) fn encode_prompts(
    tokenizer: &Tokenizer,
    template: &str,
    candidate_labels: &[&str],
    max_length: usize,
    pad_id: u32,
) -> Result<EncodedPrompts, ClassifierError> {
    let prompts: Vec<String> = candidate_labels
        .iter()
        .map(|label| template.replace("{}", label))
        .collect();

    let encodings = tokenizer.encode_batch(prompts, true).map_err(|e| {
        ClassifierError::InferenceError(format!("Failed to tokenize labels: {}", e))
    })?;

    let width = encodings
        .iter()
        .map(|encoding| encoding.get_ids().len().min(max_length))
        .max()
        .unwrap_or(0);
    if width == 0 {
        return Err(ClassifierError::InferenceError(
            "Tokenizer produced no tokens".into(),
        ));
    }

    let rows = encodings.len();
    let mut ids = Array2::<i64>::from_elem((rows, width), pad_id as i64);
    let mut mask = Array2::<i64>::zeros((rows, width));
    for (row, encoding) in encodings.iter().enumerate() {
        let attention = encoding.get_attention_mask();
        for (col, &id) in encoding.get_ids().iter().take(width).enumerate() {
            ids[[row, col]] = id as i64;
            mask[[row, col]] = attention.get(col).copied().unwrap_or(1) as i64;
        }
    }
    Ok(EncodedPrompts { ids, mask })
}

/// Turns the model's `logits_per_image` into label scores, best first.
///
/// # Errors
/// `InferenceError` if the number of logits differs from the number of labels.
pub(crate) fn scores_from_logits(
    candidate_labels: &[&str],
    logits: &[f32],
) -> Result<Vec<LabelScore>, ClassifierError> {
    if logits.len() != candidate_labels.len() {
        return Err(ClassifierError::InferenceError(format!(
            "Model returned {} logits for {} labels",
            logits.len(),
            candidate_labels.len()
        )));
    }
    Ok(rank_labels(candidate_labels, &softmax(logits)))
}

/// Zero-shot image classifier backed by a combined CLIP ONNX graph.
///
/// The graph takes tokenized label prompts and one image, and produces
/// `logits_per_image` of shape `[1, num_labels]`. Scores are the softmax of
/// those logits, so they sum to one across the candidate set.
#[derive(Debug)]
pub struct ClipClassifier {
    tokenizer: Tokenizer,
    session: Session,
    characteristics: ModelCharacteristics,
    hypothesis_template: String,
    uses_attention_mask: bool,
    pad_id: u32,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<ClipClassifier>();
    }
};

impl ClipClassifier {
    /// Loads the tokenizer and creates the ONNX session. Blocking; expect seconds.
    ///
    /// # Errors
    /// - `InferenceError` if either file is missing
    /// - `InferenceError` if the tokenizer cannot be parsed
    /// - `InferenceError` if ONNX Runtime fails to initialize or load the graph
    /// - `InferenceError` if the graph lacks `input_ids`, `pixel_values` or
    ///   `logits_per_image`
    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        characteristics: ModelCharacteristics,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::InferenceError(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }
        if !tokenizer_path.exists() {
            return Err(ClassifierError::InferenceError(format!(
                "Tokenizer file not found: {:?}",
                tokenizer_path
            )));
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            error!("Failed to load tokenizer: {}", e);
            ClassifierError::InferenceError(format!("Failed to load tokenizer: {}", e))
        })?;
        info!("Tokenizer loaded successfully");

        let session = create_session_builder(runtime_config)?.commit_from_file(model_path)?;
        let uses_attention_mask = Self::validate_model(&session)?;
        info!("Model structure validated successfully");

        let pad_id = pad_token_id(&tokenizer);

        Ok(Self {
            tokenizer,
            session,
            characteristics,
            hypothesis_template: DEFAULT_HYPOTHESIS_TEMPLATE.to_string(),
            uses_attention_mask,
            pad_id,
        })
    }

    /// Replaces the prompt template; `{}` marks where the label goes.
    ///
    /// # Errors
    /// `ValidationError` if the template has no `{}` placeholder.
    pub fn with_hypothesis_template(
        mut self,
        template: impl Into<String>,
    ) -> Result<Self, ClassifierError> {
        let template = template.into();
        if !template.contains("{}") {
            return Err(ClassifierError::ValidationError(
                "Hypothesis template must contain a '{}' placeholder".into(),
            ));
        }
        self.hypothesis_template = template;
        Ok(self)
    }

    pub fn characteristics(&self) -> &ModelCharacteristics {
        &self.characteristics
    }

    /// Checks the graph has the inputs and output the zero-shot head needs.
    /// Returns whether the graph also wants an attention mask.
    fn validate_model(session: &Session) -> Result<bool, ClassifierError> {
        let has_input = |name: &str| session.inputs.iter().any(|input| input.name == name);

        for required in [INPUT_IDS, PIXEL_VALUES] {
            if !has_input(required) {
                return Err(ClassifierError::InferenceError(format!(
                    "Model is missing required input '{}'",
                    required
                )));
            }
        }
        if !session.outputs.iter().any(|output| output.name == LOGITS_PER_IMAGE) {
            return Err(ClassifierError::InferenceError(format!(
                "Model is missing required output '{}'",
                LOGITS_PER_IMAGE
            )));
        }
        Ok(has_input(ATTENTION_MASK))
    }
}

impl ZeroShotImageClassifier for ClipClassifier {
    fn classify(
        &self,
        image: &DynamicImage,
        candidate_labels: &[&str],
    ) -> Result<Vec<LabelScore>, ClassifierError> {
        if candidate_labels.is_empty() {
            return Err(ClassifierError::ValidationError(
                "At least one candidate label is required".into(),
            ));
        }

        let EncodedPrompts { ids, mask } = encode_prompts(
            &self.tokenizer,
            &self.hypothesis_template,
            candidate_labels,
            self.characteristics.max_sequence_length,
            self.pad_id,
        )?;
        let pixels = pixel_values(image, self.characteristics.image_size)?;

        let mut inputs: HashMap<&str, DynValue> = HashMap::new();
        inputs.insert(INPUT_IDS, Tensor::from_array(ids)?.into_dyn());
        inputs.insert(PIXEL_VALUES, Tensor::from_array(pixels)?.into_dyn());
        if self.uses_attention_mask {
            inputs.insert(ATTENTION_MASK, Tensor::from_array(mask)?.into_dyn());
        }

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| ClassifierError::InferenceError(format!("Failed to run model: {}", e)))?;
        let logits = outputs[LOGITS_PER_IMAGE].try_extract_tensor::<f32>().map_err(|e| {
            ClassifierError::InferenceError(format!("Failed to extract logits: {}", e))
        })?;
        let logits: Vec<f32> = logits.iter().copied().collect();

        let ranked = scores_from_logits(candidate_labels, &logits)?;
        debug!("Ranked labels: {:?}", ranked);
        Ok(ranked)
    }
}

/// Where the CLIP files come from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// A catalogued model, fetched into the cache on first load
    Builtin(BuiltinModel),
    /// Files already on disk
    Files { model_path: PathBuf, tokenizer_path: PathBuf },
}

/// Loads a [`ClipClassifier`], downloading the weights first when needed.
#[derive(Debug, Clone)]
pub struct ClipModelLoader {
    source: ModelSource,
    models_dir: Option<PathBuf>,
    runtime_config: RuntimeConfig,
}

impl Default for ClipModelLoader {
    fn default() -> Self {
        Self::new(BuiltinModel::ClipVitBase32)
    }
}

impl ClipModelLoader {
    pub fn new(model: BuiltinModel) -> Self {
        Self {
            source: ModelSource::Builtin(model),
            models_dir: None,
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Uses a model and tokenizer already on disk. The files are expected to be a
    /// CLIP ViT-B/32 compatible export (224px images, 77 token prompts).
    pub fn from_files(
        model_path: impl Into<PathBuf>,
        tokenizer_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: ModelSource::Files {
                model_path: model_path.into(),
                tokenizer_path: tokenizer_path.into(),
            },
            models_dir: None,
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Overrides the cache directory used for built-in models.
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(dir.into());
        self
    }

    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    fn manager(&self) -> Result<ModelManager, ClassifierError> {
        let manager = match &self.models_dir {
            Some(dir) => ModelManager::new(dir),
            None => ModelManager::new_default(),
        };
        manager.map_err(|e| {
            ClassifierError::InferenceError(format!("Failed to create model manager: {}", e))
        })
    }

    /// Makes sure the files exist locally and returns their paths.
    async fn resolve_files(
        &self,
    ) -> Result<(PathBuf, PathBuf, ModelCharacteristics), ClassifierError> {
        match &self.source {
            ModelSource::Builtin(model) => {
                let manager = self.manager()?;
                let info = model.get_model_info();
                manager.ensure_model_downloaded(&info).await?;
                Ok((
                    manager.get_model_path(&info.name),
                    manager.get_tokenizer_path(&info.name),
                    model.characteristics(),
                ))
            }
            ModelSource::Files { model_path, tokenizer_path } => Ok((
                model_path.clone(),
                tokenizer_path.clone(),
                BuiltinModel::ClipVitBase32.characteristics(),
            )),
        }
    }
}

#[async_trait]
impl AdapterLoader for ClipModelLoader {
    type Adapter = ClipClassifier;

    /// Downloads the built-in model if needed, then builds the session on a
    /// blocking thread.
    ///
    /// # Errors
    /// `InferenceError` for any download, file or ONNX Runtime failure.
    async fn load(&self) -> Result<ClipClassifier, ClassifierError> {
        let (model_path, tokenizer_path, characteristics) = self.resolve_files().await?;
        let runtime_config = self.runtime_config.clone();

        tokio::task::spawn_blocking(move || {
            ClipClassifier::from_files(
                &model_path,
                &tokenizer_path,
                characteristics,
                &runtime_config,
            )
        })
        .await
        .map_err(|e| {
            ClassifierError::InferenceError(format!("Model loading task failed: {}", e))
        })?
    }
}
