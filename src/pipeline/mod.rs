//! Scoring of raw packet batches: normalize, encode, reconcile against the
//! installed model's schema, predict, summarize and feed the trend window.
//!
//! A `Detector` is created once at startup and shared for the life of the
//! process. The model can be replaced while batches are being scored; the
//! trend window is updated under a mutex, once per batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use counter::Counter;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{MalformedRecord, PipelineError, Result};
use crate::feature_extraction::{encode_batch, EncodingScheme};
use crate::model::{ModelSlot, TrainedModel};
use crate::normalize::normalize;
use crate::reconcile::{DriftReport, reconcile_with, ReconcileOptions, Reconciliation};
use crate::shared_interface::{Label, PacketRecord, Protocol, RawRecord};
use crate::trend::TrendWindow;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub scheme: EncodingScheme,
    pub trend_capacity: usize,
    pub top_talkers: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            scheme: EncodingScheme::default(),
            trend_capacity: 10,
            top_talkers: 5,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// Position in the input batch.
    pub index: usize,
    pub packet: PacketRecord,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedRecord {
    pub index: usize,
    pub reason: MalformedRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    /// Every label, including those with no predictions.
    pub counts: BTreeMap<Label, usize>,
    /// Per-label counts for TCP, UDP and ICMP, plus OTHER when present.
    pub protocol_counts: BTreeMap<Protocol, BTreeMap<Label, usize>>,
    /// Most frequent source addresses, most frequent first.
    pub top_talkers: Vec<(String, usize)>,
    pub malicious: usize,
}

fn label_counts<'a, I: Iterator<Item=&'a ScoredRecord>>(records: I) -> BTreeMap<Label, usize> {
    let counter: Counter<Label> = records.map(|r| r.label).collect();
    Label::ALL.iter().map(|label| (*label, counter.get(label).copied().unwrap_or(0))).collect()
}

impl BatchSummary {
    pub fn from_scored(scored: &[ScoredRecord], n_top_talkers: usize) -> Self {
        let counts = label_counts(scored.iter());
        let malicious = counts.iter().filter(|(label, _)| label.is_malicious()).map(|(_, n)| n).sum();

        let protocol_counts = [Protocol::Tcp, Protocol::Udp, Protocol::Icmp, Protocol::Other].iter()
            .filter(|p| **p != Protocol::Other || scored.iter().any(|r| r.packet.protocol == Protocol::Other))
            .map(|p| (*p, label_counts(scored.iter().filter(|r| r.packet.protocol == *p))))
            .collect();

        let talkers: Counter<String> = scored.iter().map(|r| r.packet.src_ip.clone()).collect();
        let top_talkers = talkers.most_common_ordered().into_iter().take(n_top_talkers).collect();

        BatchSummary { total: scored.len(), counts, protocol_counts, top_talkers, malicious }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Predictions for the records that normalized, in input order.
    pub scored: Vec<ScoredRecord>,
    /// Records that could not be normalized; they are not scored.
    pub failed: Vec<FailedRecord>,
    pub summary: BatchSummary,
    pub drift: DriftReport,
    /// Trend window after this batch was observed.
    pub trend: Vec<(usize, usize)>,
}

pub struct Detector {
    scheme: EncodingScheme,
    model: ModelSlot,
    trend: Mutex<TrendWindow>,
    top_talkers: usize,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        Ok(Detector {
            scheme: config.scheme,
            model: ModelSlot::empty(),
            trend: Mutex::new(TrendWindow::new(config.trend_capacity)?),
            top_talkers: config.top_talkers,
        })
    }

    pub fn scheme(&self) -> &EncodingScheme {
        &self.scheme
    }

    /// Install a model, replacing the current one atomically.
    pub fn load_model(&self, model: Arc<dyn TrainedModel>) {
        self.model.swap(model);
    }

    pub fn model(&self) -> Result<Arc<dyn TrainedModel>> {
        self.model.current()
    }

    pub fn trend(&self) -> Vec<(usize, usize)> {
        self.trend.lock().snapshot()
    }

    /// Score one batch of raw records.
    ///
    /// Malformed records are reported in `failed` and the rest of the batch is
    /// scored. A missing model or an empty model schema aborts the whole batch.
    pub fn score(&self, raws: &[RawRecord]) -> Result<BatchReport> {
        // One model for the whole batch, even if another is installed meanwhile
        let model = self.model.current()?;

        let mut indices = Vec::with_capacity(raws.len());
        let mut records = Vec::with_capacity(raws.len());
        let mut failed = Vec::new();

        for (index, raw) in raws.iter().enumerate() {
            match normalize(raw, &self.scheme.thresholds) {
                Ok(record) => {
                    indices.push(index);
                    records.push(record);
                }
                Err(reason) => {
                    warn!("Skipping malformed record {}: {}", index, reason);
                    failed.push(FailedRecord { index, reason });
                }
            }
        }

        let encoded = encode_batch(&records, &self.scheme);
        let Reconciliation { batch, drift } = reconcile_with(&encoded, model.schema(), ReconcileOptions::default())?;

        let labels = if batch.is_empty() { Vec::new() } else { model.predict(&batch)? };
        if labels.len() != records.len() {
            return Err(PipelineError::LabelCountMismatch { features: records.len(), labels: labels.len() });
        }

        let scored: Vec<ScoredRecord> = indices.into_iter()
            .zip(records.into_iter())
            .zip(labels.into_iter())
            .map(|((index, record), label)| ScoredRecord { index, packet: record.packet, label })
            .collect();

        let summary = BatchSummary::from_scored(&scored, self.top_talkers);

        let trend = {
            let mut window = self.trend.lock();
            window.observe(summary.malicious);
            window.snapshot()
        };

        info!("Scored {} record(s): {} malicious, {} malformed", summary.total, summary.malicious, failed.len());

        Ok(BatchReport { scored, failed, summary, drift, trend })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::{MalformedRecord, PipelineError};
    use crate::feature_extraction::{encode_batch, EncodingScheme, FeatureVector, SchemeVersion};
    use crate::model::{Classifier, NearestCentroid, NearestCentroidModel, TrainedModel};
    use crate::normalize::normalize;
    use crate::pipeline::{BatchSummary, Detector, DetectorConfig, ScoredRecord};
    use crate::reconcile::FeatureSchema;
    use crate::shared_interface::{Label, PacketRecord, Protocol, RawRecord};

    fn raw(src_ip: &str, protocol: &str, length: i64) -> RawRecord {
        RawRecord {
            src_ip: src_ip.to_owned(),
            dst_ip: "10.0.0.9".to_owned(),
            protocol: protocol.to_owned(),
            length,
            src_port: Some(40000),
            dst_port: Some(443),
            flags: None,
        }
    }

    /// Small packets are Normal, large ones DoS.
    fn trained(scheme: &EncodingScheme) -> NearestCentroidModel {
        let rows: Vec<_> = vec![raw("a", "6", 60), raw("a", "17", 100), raw("a", "6", 1500), raw("a", "17", 1450)]
            .iter()
            .map(|r| normalize(r, &scheme.thresholds).unwrap())
            .collect();
        let labels = [Label::Normal, Label::Normal, Label::Dos, Label::Dos];
        NearestCentroid::default().fit(&encode_batch(&rows, scheme), &labels).unwrap()
    }

    #[test]
    fn unfitted_detector() {
        let detector = Detector::new(DetectorConfig::default()).unwrap();
        assert!(matches!(detector.score(&[raw("a", "6", 60)]), Err(PipelineError::UnfittedModel)));
        assert!(detector.trend().is_empty());
    }

    #[test]
    fn smoke_test() {
        let detector = Detector::new(DetectorConfig::default()).unwrap();
        detector.load_model(Arc::new(trained(detector.scheme())));

        let batch = vec![
            raw("192.168.1.2", "6", 70),
            raw("192.168.1.3", "bogus", 70),
            raw("192.168.1.2", "17", 1480),
            raw("192.168.1.4", "1", -5),
        ];
        let report = detector.score(&batch).unwrap();

        assert_eq!(vec![0, 2], report.scored.iter().map(|s| s.index).collect::<Vec<_>>());
        assert_eq!(vec![Label::Normal, Label::Dos], report.scored.iter().map(|s| s.label).collect::<Vec<_>>());
        assert_eq!(vec![1, 3], report.failed.iter().map(|f| f.index).collect::<Vec<_>>());
        assert_eq!(MalformedRecord::NegativeLength(-5), report.failed[1].reason);

        assert_eq!(2, report.summary.total);
        assert_eq!(1, report.summary.malicious);
        assert_eq!(vec![(1, 1)], report.trend);
        assert!(report.drift.is_clean());
    }

    #[test]
    fn legacy_model_scores_current_traffic() {
        let v1 = EncodingScheme::builtin(SchemeVersion::V1);
        let detector = Detector::new(DetectorConfig::default()).unwrap();
        detector.load_model(Arc::new(trained(v1)));

        let report = detector.score(&[raw("h", "6", 80), raw("h", "6", 1490)]).unwrap();
        assert_eq!(vec![Label::Normal, Label::Dos], report.scored.iter().map(|s| s.label).collect::<Vec<_>>());
        assert!(!report.drift.missing.is_empty());
        assert!(!report.drift.dropped.is_empty());
    }

    #[test]
    fn all_malformed_batch_still_counts_for_trend() {
        let detector = Detector::new(DetectorConfig { trend_capacity: 2, ..DetectorConfig::default() }).unwrap();
        detector.load_model(Arc::new(trained(detector.scheme())));

        detector.score(&[raw("a", "6", 1500)]).unwrap();
        let report = detector.score(&[raw("a", "?", 1)]).unwrap();
        assert!(report.scored.is_empty());
        assert_eq!(1, report.failed.len());
        assert_eq!(vec![(1, 1), (2, 0)], report.trend);

        detector.score(&[]).unwrap();
        assert_eq!(vec![(2, 0), (3, 0)], detector.trend());
    }

    #[test]
    fn concurrent_batches_share_one_trend() {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        let detector = Detector::new(DetectorConfig { trend_capacity: 10, ..DetectorConfig::default() }).unwrap();
        detector.load_model(Arc::new(trained(detector.scheme())));

        let mut last_indices: Vec<usize> = (0..16).into_par_iter()
            .map(|_| {
                let report = detector.score(&[raw("a", "6", 1500), raw("b", "6", 60)]).unwrap();
                assert!(report.trend.len() <= 10);
                report.trend.last().unwrap().0
            })
            .collect();

        // Every batch got its own slot
        last_indices.sort_unstable();
        assert_eq!((1..=16).collect::<Vec<_>>(), last_indices);

        let trend = detector.trend();
        assert_eq!((7..=16).map(|i| (i, 1)).collect::<Vec<_>>(), trend);
    }

    struct EmptySchemaModel(FeatureSchema);

    impl TrainedModel for EmptySchemaModel {
        fn schema(&self) -> &FeatureSchema { &self.0 }
        fn predict(&self, features: &[FeatureVector]) -> crate::error::Result<Vec<Label>> {
            Ok(features.iter().map(|_| Label::Normal).collect())
        }
        fn describe(&self) -> String { "empty".to_owned() }
    }

    #[test]
    fn empty_schema_aborts_batch() {
        let detector = Detector::new(DetectorConfig::default()).unwrap();
        detector.load_model(Arc::new(EmptySchemaModel(FeatureSchema::new(vec![]).unwrap())));

        assert!(matches!(detector.score(&[raw("a", "6", 60)]), Err(PipelineError::EmptySchema)));
        assert!(detector.trend().is_empty());
    }

    fn scored(src_ip: &str, protocol: Protocol, label: Label) -> ScoredRecord {
        ScoredRecord {
            index: 0,
            packet: PacketRecord {
                src_ip: src_ip.to_owned(),
                dst_ip: "10.0.0.1".to_owned(),
                protocol,
                length: 100,
                src_port: None,
                dst_port: None,
                flags: None,
            },
            label,
        }
    }

    #[test]
    fn summary_counts() {
        let records = vec![
            scored("10.1.1.1", Protocol::Tcp, Label::Normal),
            scored("10.1.1.2", Protocol::Tcp, Label::PortScan),
            scored("10.1.1.1", Protocol::Udp, Label::Dos),
            scored("10.1.1.3", Protocol::Udp, Label::Normal),
            scored("10.1.1.1", Protocol::Icmp, Label::Normal),
        ];
        let summary = BatchSummary::from_scored(&records, 2);

        assert_eq!(5, summary.total);
        assert_eq!(2, summary.malicious);
        assert_eq!(3, summary.counts[&Label::Normal]);
        assert_eq!(0, summary.counts[&Label::Malware]);
        assert_eq!(1, summary.protocol_counts[&Protocol::Tcp][&Label::PortScan]);
        assert_eq!(1, summary.protocol_counts[&Protocol::Udp][&Label::Dos]);
        assert!(!summary.protocol_counts.contains_key(&Protocol::Other));
        assert_eq!(vec![("10.1.1.1".to_owned(), 3), ("10.1.1.2".to_owned(), 1)], summary.top_talkers);
    }
}
