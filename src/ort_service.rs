use crate::{
    config::ModelConfig,
    model_service::{ModelError, ModelService},
    record::{ScreeningRecord, MOVEMENT_FIELDS, PROFILE_FIELDS},
};
use ndarray::{Array2, Array3};
use once_cell::sync::OnceCell;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

const PROFILE_INPUT: &str = "profile_input";
const MOVEMENT_INPUT: &str = "movement_input";
const OUTPUT: &str = "output";

fn build_inputs(record: &ScreeningRecord) -> Result<(Array2<f32>, Array3<f32>), ModelError> {
    let profile = Array2::from_shape_vec((1, PROFILE_FIELDS), record.profile.to_vec())
        .map_err(|e| ModelError::TensorConstruction(e.to_string()))?;
    let movement = Array3::from_shape_vec((1, MOVEMENT_FIELDS, 1), record.movement.to_vec())
        .map_err(|e| ModelError::TensorConstruction(e.to_string()))?;

    Ok((profile, movement))
}

#[derive(Clone)]
pub struct OrtModelService {
    // Single session shared by all requests. Loading happens on the first
    // prediction; a failed load is not memoized, so a later request retries.
    session: Arc<OnceCell<Mutex<Session>>>,
    model_path: PathBuf,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ort::Error> {
        ort::init().commit()?;

        Ok(Self {
            session: Arc::new(OnceCell::new()),
            model_path: model_config.get_model_path(),
        })
    }

    fn session(&self) -> Result<&Mutex<Session>, ModelError> {
        self.session.get_or_try_init(|| {
            let session = Session::builder()
                .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|builder| builder.commit_from_file(&self.model_path))
                .map_err(ModelError::Load)?;

            tracing::info!(path = %self.model_path.display(), "loaded screening model");

            Ok(Mutex::new(session))
        })
    }
}

impl ModelService for OrtModelService {
    fn predict_likelihood(&self, record: &ScreeningRecord) -> Result<f32, ModelError> {
        let (profile, movement) = build_inputs(record)?;

        let mut session = self
            .session()?
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        let profile_ref = TensorRef::from_array_view(profile.view())
            .map_err(|e| ModelError::TensorConstruction(e.to_string()))?;
        let movement_ref = TensorRef::from_array_view(movement.view())
            .map_err(|e| ModelError::TensorConstruction(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![
                PROFILE_INPUT => profile_ref,
                MOVEMENT_INPUT => movement_ref
            ])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let (_shape, data) = outputs[OUTPUT]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        data.first().copied().ok_or(ModelError::EmptyOutput)
    }
}
