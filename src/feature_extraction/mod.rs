pub use feature_vector::{Batch, FeatureVector};
pub use scheme::{DerivedFlag, EncodingScheme, LengthBin, NumericField, SchemeVersion, Thresholds};

use crate::normalize::CanonicalRecord;

mod feature_vector;
mod scheme;


fn indicator(active: bool) -> Option<f64> {
    Some(if active { 1.0 } else { 0.0 })
}

/// Encode one canonical record under `scheme`.
///
/// The columns depend on the scheme alone: every known protocol and every
/// length bin gets a slot, whether or not it is active. A protocol the scheme
/// does not enumerate, or a length outside all bins, leaves the whole group at 0.
pub fn encode(record: &CanonicalRecord, scheme: &EncodingScheme) -> FeatureVector {
    let packet = &record.packet;
    let n_columns = scheme.numeric.len() + scheme.derived.len() + scheme.protocols.len() + scheme.length_bins.len();
    let mut fv = FeatureVector::with_capacity(n_columns);

    for field in scheme.numeric.iter() {
        fv.push(field.column(), field.value(packet));
    }

    for flag in scheme.derived.iter() {
        fv.push(flag.column(), indicator(record.derived.get(*flag)));
    }

    for protocol in scheme.protocols.iter() {
        fv.push(scheme.protocol_column(*protocol), indicator(packet.protocol == *protocol));
    }

    for bin in scheme.length_bins.iter() {
        fv.push(EncodingScheme::length_column(bin), indicator(bin.contains(packet.length)));
    }

    fv
}

/// Encode records one by one; no record influences another's columns.
pub fn encode_batch(records: &[CanonicalRecord], scheme: &EncodingScheme) -> Batch {
    records.iter().map(|record| encode(record, scheme)).collect()
}
