//! Classifier capability consumed by the pipeline.
//!
//! The pipeline only relies on `fit`, `schema` and `predict`; any tabular
//! classifier implementing the two traits below can be plugged in.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{PipelineError, Result};
use crate::feature_extraction::FeatureVector;
use crate::reconcile::{FeatureSchema, reconcile_with, ReconcileOptions, to_matrix};
use crate::shared_interface::Label;

pub use centroid::{NearestCentroid, NearestCentroidModel};

pub mod artifact;
pub mod evaluate;
mod centroid;

pub trait TrainedModel: Send + Sync {
    /// Columns the model was fitted against. Fixed once fitted.
    fn schema(&self) -> &FeatureSchema;

    /// One label per row, in row order. Rows must already conform to `schema()`.
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<Label>>;

    fn describe(&self) -> String;
}

pub trait Classifier {
    type Model: TrainedModel;

    fn fit(&self, features: &[FeatureVector], labels: &[Label]) -> Result<Self::Model>;
}

/// Schema and dense rows for fitting. The schema is taken from the first row;
/// later rows are reconciled onto it.
pub fn training_matrix(features: &[FeatureVector], labels: &[Label]) -> Result<(FeatureSchema, Vec<Vec<f64>>)> {
    if features.len() != labels.len() {
        return Err(PipelineError::LabelCountMismatch { features: features.len(), labels: labels.len() });
    }

    let first = features.first().ok_or(PipelineError::EmptyBatch)?;
    let schema = FeatureSchema::from_vector(first)?;
    let aligned = reconcile_with(features, &schema, ReconcileOptions { require_non_empty: true })?;
    let rows = to_matrix(&aligned.batch, &schema)?;

    Ok((schema, rows))
}

/// Holds the model currently used for scoring.
///
/// A new model replaces the shared reference as a whole; callers that already
/// hold the previous `Arc` keep predicting with its schema and weights.
#[derive(Default)]
pub struct ModelSlot {
    current: RwLock<Option<Arc<dyn TrainedModel>>>,
}

impl ModelSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<dyn TrainedModel>) -> Self {
        ModelSlot { current: RwLock::new(Some(model)) }
    }

    /// Install `model`, returning the one it replaces.
    pub fn swap(&self, model: Arc<dyn TrainedModel>) -> Option<Arc<dyn TrainedModel>> {
        info!("Installing model {} ({} features)", model.describe(), model.schema().len());
        self.current.write().replace(model)
    }

    pub fn current(&self) -> Result<Arc<dyn TrainedModel>> {
        self.current.read().clone().ok_or(PipelineError::UnfittedModel)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}
