const CLIP_REPO: &str = "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main";

/// Represents the available built-in models in the library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModel {
    /// CLIP ViT-B/32 exported to ONNX with 8-bit quantized weights
    ///
    /// Characteristics:
    /// - Image size: 224x224
    /// - Max text sequence length: 77
    /// - Size: ~150MB
    ClipVitBase32,
}

/// Characteristics of a model including its capabilities and requirements
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCharacteristics {
    /// Side length of the square image the vision tower consumes
    pub image_size: u32,
    /// Maximum number of tokens per candidate label prompt
    pub max_sequence_length: usize,
    /// Approximate size of the model in memory
    pub model_size_mb: usize,
}

/// Where a model's files live and how to check them.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub model_url: String,
    pub tokenizer_url: String,
    /// Expected SHA-256 of the model file. When `None`, the digest recorded at
    /// download time is checked instead.
    pub model_hash: Option<String>,
    /// Expected SHA-256 of the tokenizer file, with the same fallback.
    pub tokenizer_hash: Option<String>,
}

impl BuiltinModel {
    /// Get the characteristics of the model
    pub fn characteristics(&self) -> ModelCharacteristics {
        match self {
            Self::ClipVitBase32 => ModelCharacteristics {
                image_size: 224,
                max_sequence_length: 77,
                model_size_mb: 150,
            },
        }
    }

    pub fn get_model_info(&self) -> ModelInfo {
        match self {
            Self::ClipVitBase32 => ModelInfo {
                name: "clip-vit-base-patch32".to_string(),
                model_url: format!("{}/onnx/model_quantized.onnx", CLIP_REPO),
                tokenizer_url: format!("{}/tokenizer.json", CLIP_REPO),
                model_hash: None,
                tokenizer_hash: None,
            },
        }
    }
}
