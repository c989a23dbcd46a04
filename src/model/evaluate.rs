use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{PipelineError, Result};
use crate::shared_interface::Label;

/// Shuffle with `seed` and split off `ceil(test_fraction * n)` items for testing.
/// At least one item is always left for training. Returns `(train, test)`.
pub fn train_test_split<T>(items: Vec<T>, test_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let fraction = test_fraction.max(0.0).min(1.0);
    let n_test = ((fraction * items.len() as f64).ceil() as usize).min(items.len().saturating_sub(1));

    let mut items = items;
    items.shuffle(&mut StdRng::seed_from_u64(seed));

    let test = items.split_off(items.len() - n_test);
    (items, test)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelMetrics {
    pub label: Label,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Labels seen in truth or prediction, in label order.
    pub per_label: Vec<LabelMetrics>,
    pub accuracy: f64,
    pub total: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl ClassificationReport {
    pub fn compute(truth: &[Label], predicted: &[Label]) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(PipelineError::LabelCountMismatch { features: predicted.len(), labels: truth.len() });
        }

        let per_label = Label::ALL.iter()
            .filter(|label| truth.contains(label) || predicted.contains(label))
            .map(|label| {
                let pairs = truth.iter().zip(predicted.iter());
                let tp = pairs.clone().filter(|(t, p)| *t == label && *p == label).count();
                let n_predicted = predicted.iter().filter(|p| *p == label).count();
                let support = truth.iter().filter(|t| *t == label).count();

                let precision = ratio(tp, n_predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };

                LabelMetrics { label: *label, precision, recall, f1, support }
            })
            .collect();

        let correct = truth.iter().zip(predicted.iter()).filter(|(t, p)| t == p).count();

        Ok(ClassificationReport { per_label, accuracy: ratio(correct, truth.len()), total: truth.len() })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        for m in self.per_label.iter() {
            writeln!(f, "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}", m.label.name(), m.precision, m.recall, m.f1, m.support)?;
        }
        write!(f, "\n{:>12} {:>32.2} {:>10}", "accuracy", self.accuracy, self.total)
    }
}


#[cfg(test)]
mod tests {
    use crate::model::evaluate::{ClassificationReport, train_test_split};
    use crate::shared_interface::Label::{Dos, Malware, Normal};

    #[test]
    fn split_sizes() {
        let (train, test) = train_test_split((0..10).collect::<Vec<_>>(), 0.2, 42);
        assert_eq!(8, train.len());
        assert_eq!(2, test.len());

        let (train, test) = train_test_split((0..11).collect::<Vec<_>>(), 0.2, 42);
        assert_eq!(8, train.len());
        assert_eq!(3, test.len());
    }

    #[test]
    fn split_leaves_training_rows() {
        let (train, test) = train_test_split(vec![1], 0.2, 42);
        assert_eq!(vec![1], train);
        assert!(test.is_empty());

        let (train, test) = train_test_split(vec![1, 2], 0.5, 42);
        assert_eq!(1, train.len());
        assert_eq!(1, test.len());

        let (train, test) = train_test_split(Vec::<usize>::new(), 0.2, 42);
        assert!(train.is_empty() && test.is_empty());
    }

    #[test]
    fn split_is_seeded() {
        let items: Vec<usize> = (0..50).collect();
        assert_eq!(train_test_split(items.clone(), 0.3, 7), train_test_split(items.clone(), 0.3, 7));

        let (mut train, test) = train_test_split(items.clone(), 0.3, 7);
        train.extend(test);
        train.sort_unstable();
        assert_eq!(items, train);
    }

    #[test]
    fn smoke_test() {
        let truth = vec![Normal, Normal, Normal, Dos, Dos];
        let predicted = vec![Normal, Normal, Dos, Dos, Malware];

        let report = ClassificationReport::compute(&truth, &predicted).unwrap();
        assert_eq!(3, report.per_label.len());
        assert_eq!(0.6, report.accuracy);

        let normal = &report.per_label[0];
        assert_eq!(Normal, normal.label);
        assert_eq!(1.0, normal.precision);
        assert!((normal.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(3, normal.support);

        let dos = &report.per_label[1];
        assert_eq!(0.5, dos.precision);
        assert_eq!(0.5, dos.recall);
        assert_eq!(0.5, dos.f1);

        let malware = &report.per_label[2];
        assert_eq!(0, malware.support);
        assert_eq!(0.0, malware.f1);
    }

    #[test]
    fn length_mismatch() {
        assert!(ClassificationReport::compute(&[Normal], &[]).is_err());
    }
}
