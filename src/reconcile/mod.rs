//! Aligns encoded batches with the feature schema a model was trained on.
//!
//! Schema drift is the normal case here, not a failure: a model trained on an
//! older encoding sees columns it does not know and misses columns it expects.
//! Missing columns are filled with 0, unknown columns are dropped, order
//! follows the schema and missing values become 0. The fill with 0 is an
//! approximation; the drift report says where it happened.

use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::feature_extraction::{Batch, FeatureVector};

/// Ordered feature names a model was fitted against. Names are unique.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(names.len());
        for name in names.iter() {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::DuplicateColumn(name.clone()));
            }
        }
        Ok(FeatureSchema { names })
    }

    /// Schema made of the columns of `fv`, in its order.
    pub fn from_vector(fv: &FeatureVector) -> Result<Self> {
        Self::new(fv.names().map(str::to_owned).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = PipelineError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        FeatureSchema::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Fail with `EmptyBatch` instead of returning an empty batch.
    pub require_non_empty: bool,
}

/// What reconciliation had to correct. Column names are listed once, in the
/// order they were first encountered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DriftReport {
    /// Schema columns absent from at least one input vector.
    pub missing: Vec<String>,
    /// Input columns not in the schema, dropped.
    pub dropped: Vec<String>,
    /// Missing or NaN values replaced with 0.
    pub filled_values: usize,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.dropped.is_empty() && self.filled_values == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub batch: Batch,
    pub drift: DriftReport,
}

/// Reconcile with default options, returning only the aligned batch.
pub fn reconcile(batch: &[FeatureVector], schema: &FeatureSchema) -> Result<Batch> {
    reconcile_with(batch, schema, ReconcileOptions::default()).map(|r| r.batch)
}

pub fn reconcile_with(batch: &[FeatureVector], schema: &FeatureSchema, opts: ReconcileOptions) -> Result<Reconciliation> {
    if schema.is_empty() { return Err(PipelineError::EmptySchema); }
    if batch.is_empty() {
        if opts.require_non_empty { return Err(PipelineError::EmptyBatch); }
        return Ok(Reconciliation { batch: Vec::new(), drift: DriftReport::default() });
    }

    let known: HashSet<&str> = schema.names().iter().map(String::as_str).collect();
    let mut drift = DriftReport::default();
    let mut missing_seen: HashSet<&str> = HashSet::new();
    let mut dropped_seen: HashSet<&str> = HashSet::new();

    let aligned = batch.iter().map(|fv| {
        // First occurrence wins if an input vector repeats a name
        let mut lookup: HashMap<&str, Option<f64>> = HashMap::with_capacity(fv.len());
        for (name, value) in fv.iter() {
            lookup.entry(name).or_insert(value);

            if !known.contains(name) && dropped_seen.insert(name) {
                drift.dropped.push(name.to_owned());
            }
        }

        schema.names().iter().map(|name| {
            let value = match lookup.get(name.as_str()) {
                Some(Some(v)) if !v.is_nan() => *v,
                Some(_) => {
                    drift.filled_values += 1;
                    0.0
                }
                None => {
                    if missing_seen.insert(name.as_str()) {
                        drift.missing.push(name.clone());
                    }
                    0.0
                }
            };
            (name.as_str(), Some(value))
        }).collect::<FeatureVector>()
    }).collect::<Batch>();

    if !drift.is_clean() {
        debug!("Schema drift: {} missing column(s) {:?}, {} dropped column(s) {:?}, {} value(s) filled",
               drift.missing.len(), drift.missing, drift.dropped.len(), drift.dropped, drift.filled_values);
    }

    Ok(Reconciliation { batch: aligned, drift })
}

/// Dense rows of a batch that already conforms to `schema`: same columns, same
/// order, no missing values. Anything else is a `SchemaMismatch`, never fixed up here.
pub fn to_matrix(batch: &[FeatureVector], schema: &FeatureSchema) -> Result<Vec<Vec<f64>>> {
    batch.iter().enumerate().map(|(row, fv)| {
        if fv.len() != schema.len() {
            return Err(PipelineError::SchemaMismatch {
                row,
                reason: format!("expected {} columns, got {}", schema.len(), fv.len()),
            });
        }

        fv.iter().zip(schema.names().iter()).map(|((name, value), expected)| {
            if name != expected.as_str() {
                return Err(PipelineError::SchemaMismatch {
                    row,
                    reason: format!("expected column \"{}\", got \"{}\"", expected, name),
                });
            }
            match value {
                Some(v) if !v.is_nan() => Ok(v),
                _ => Err(PipelineError::SchemaMismatch { row, reason: format!("missing value in \"{}\"", name) }),
            }
        }).collect()
    }).collect()
}
