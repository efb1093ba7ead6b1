use std::env;

use wastesort::model_manager::CACHE_ENV_VAR;
use wastesort::{BuiltinModel, ModelError, ModelManager};

#[test]
fn test_default_models_dir() {
    env::set_var(CACHE_ENV_VAR, "/tmp/wastesort-test-cache");
    let path = ModelManager::get_default_models_dir();
    assert!(path.ends_with("wastesort-test-cache/models"));
    env::remove_var(CACHE_ENV_VAR);

    let path = ModelManager::get_default_models_dir();
    assert!(path.to_string_lossy().contains("wastesort"));
    assert!(path.ends_with("models"));
}

#[test]
fn test_model_paths() -> Result<(), ModelError> {
    let dir = env::temp_dir().join(format!("wastesort-paths-{}", std::process::id()));
    let manager = ModelManager::new(&dir)?;
    let info = BuiltinModel::ClipVitBase32.get_model_info();

    assert!(manager.get_model_path(&info.name).ends_with("clip-vit-base-patch32/model.onnx"));
    assert!(manager
        .get_tokenizer_path(&info.name)
        .ends_with("clip-vit-base-patch32/tokenizer.json"));
    assert!(!manager.is_model_downloaded(&info.name));
    assert!(!manager.verify_model(&info)?);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
