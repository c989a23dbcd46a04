use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::feature_extraction::FeatureVector;
use crate::model::{Classifier, TrainedModel, training_matrix};
use crate::reconcile::{FeatureSchema, to_matrix};
use crate::shared_interface::Label;

/// Nearest-centroid classifier over standardized features.
#[derive(Debug, Clone)]
pub struct NearestCentroid {
    /// Features whose standard deviation is below this are left unscaled.
    pub min_std: f64,
}

impl Default for NearestCentroid {
    fn default() -> Self {
        NearestCentroid { min_std: 1e-9 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NearestCentroidModel {
    schema: FeatureSchema,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// Sorted by label.
    centroids: Vec<(Label, Vec<f64>)>,
}

impl Classifier for NearestCentroid {
    type Model = NearestCentroidModel;

    fn fit(&self, features: &[FeatureVector], labels: &[Label]) -> Result<NearestCentroidModel> {
        let (schema, rows) = training_matrix(features, labels)?;
        let n_rows = rows.len() as f64;
        let n_features = schema.len();

        let mut means = vec![0.0; n_features];
        for row in rows.iter() {
            for (m, v) in means.iter_mut().zip(row.iter()) { *m += v; }
        }
        means.iter_mut().for_each(|m| *m /= n_rows);

        let mut scales = vec![0.0; n_features];
        for row in rows.iter() {
            for ((s, v), m) in scales.iter_mut().zip(row.iter()).zip(means.iter()) { *s += (v - m).powi(2); }
        }
        scales.iter_mut().for_each(|s| {
            let std = (*s / n_rows).sqrt();
            *s = if std < self.min_std { 1.0 } else { std };
        });

        // Per-label sums of standardized rows
        let mut sums: BTreeMap<Label, (Vec<f64>, usize)> = BTreeMap::new();
        for (row, label) in rows.iter().zip(labels.iter()) {
            let entry = sums.entry(*label).or_insert_with(|| (vec![0.0; n_features], 0));
            for (acc, z) in entry.0.iter_mut().zip(standardize(row, &means, &scales)) { *acc += z; }
            entry.1 += 1;
        }

        let centroids = sums.into_iter()
            .map(|(label, (sum, count))| (label, sum.into_iter().map(|s| s / count as f64).collect()))
            .collect();

        Ok(NearestCentroidModel { schema, means, scales, centroids })
    }
}

fn standardize<'a>(row: &'a [f64], means: &'a [f64], scales: &'a [f64]) -> impl Iterator<Item=f64> + 'a {
    row.iter().zip(means.iter()).zip(scales.iter()).map(|((v, m), s)| (v - m) / s)
}

impl NearestCentroidModel {
    pub fn labels(&self) -> Vec<Label> {
        self.centroids.iter().map(|(label, _)| *label).collect()
    }

    fn classify(&self, row: &[f64]) -> Label {
        let z: Vec<f64> = standardize(row, &self.means, &self.scales).collect();

        // Strict comparison keeps the lowest label on ties
        let mut best = (Label::Normal, f64::INFINITY);
        for (label, centroid) in self.centroids.iter() {
            let distance: f64 = z.iter().zip(centroid.iter()).map(|(a, b)| (a - b).powi(2)).sum();
            if distance < best.1 {
                best = (*label, distance);
            }
        }
        best.0
    }
}

impl TrainedModel for NearestCentroidModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<Label>> {
        let rows = to_matrix(features, &self.schema)?;
        Ok(rows.iter().map(|row| self.classify(row)).collect())
    }

    fn describe(&self) -> String {
        format!("NearestCentroid({} classes)", self.centroids.len())
    }
}
