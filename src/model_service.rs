use crate::record::ScreeningRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to load model: {0}")]
    Load(#[source] ort::Error),
    #[error("failed to build input tensors: {0}")]
    TensorConstruction(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model returned no output values")]
    EmptyOutput,
}

pub trait ModelService: Send + Sync + Clone + 'static {
    fn predict_likelihood(&self, record: &ScreeningRecord) -> Result<f32, ModelError>;
}
