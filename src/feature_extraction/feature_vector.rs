use serde::{Deserialize, Serialize};

/// Ordered named feature values of one record.
/// A value of `None` is a missing value, filled in by the reconciler.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct FeatureVector {
    columns: Vec<(String, Option<f64>)>,
}

/// Feature vectors scored together in one reconciliation pass.
pub type Batch = Vec<FeatureVector>;

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        FeatureVector { columns: Vec::with_capacity(capacity) }
    }

    pub fn push<S: Into<String>>(&mut self, name: S, value: Option<f64>) {
        self.columns.push((name.into(), value));
    }

    /// `None` if the column is absent, `Some(None)` if present but missing.
    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item=&str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item=Option<f64>> + '_ {
        self.columns.iter().map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item=(&str, Option<f64>)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> std::iter::FromIterator<(S, Option<f64>)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item=(S, Option<f64>)>>(iter: I) -> Self {
        FeatureVector { columns: iter.into_iter().map(|(n, v)| (n.into(), v)).collect() }
    }
}

impl<S: Into<String>> std::iter::FromIterator<(S, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item=(S, f64)>>(iter: I) -> Self {
        iter.into_iter().map(|(n, v)| (n, Some(v))).collect()
    }
}
