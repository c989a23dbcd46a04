//! Seeded synthetic traffic for demos and tests.
//!
//! The labels drawn here are random and carry no information about the packet
//! they are attached to. Models trained on them are only good for exercising
//! the pipeline.

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::shared_interface::{Label, LabeledRawRecord, RawRecord};

const PROTOCOL_CODES: [u8; 3] = [6, 17, 1];
const TCP_FLAGS: [i64; 4] = [0, 2, 16, 18];
const LABEL_WEIGHTS: [(Label, f64); 4] = [
    (Label::Normal, 0.7),
    (Label::Dos, 0.1),
    (Label::PortScan, 0.1),
    (Label::Malware, 0.1),
];

pub struct SyntheticTraffic {
    rng: StdRng,
}

impl SyntheticTraffic {
    pub fn new(seed: u64) -> Self {
        SyntheticTraffic { rng: StdRng::seed_from_u64(seed) }
    }

    /// Host on 192.168.1.0/24 talking to a host on 10.0.0.0/24. TCP packets
    /// carry flags; ICMP packets carry no ports.
    pub fn packet(&mut self) -> RawRecord {
        let code = PROTOCOL_CODES.choose(&mut self.rng).copied().unwrap_or(6);
        let (src_port, dst_port) = if code == 1 {
            (None, None)
        } else {
            (Some(self.rng.gen_range(1..=65535)), Some(self.rng.gen_range(1..=65535)))
        };
        let flags = if code == 6 { TCP_FLAGS.choose(&mut self.rng).copied() } else { None };

        RawRecord {
            src_ip: format!("192.168.1.{}", self.rng.gen_range(2..=250)),
            dst_ip: format!("10.0.0.{}", self.rng.gen_range(2..=250)),
            protocol: code.to_string(),
            length: self.rng.gen_range(60..=1500),
            src_port,
            dst_port,
            flags,
        }
    }

    pub fn labeled(&mut self) -> LabeledRawRecord {
        let raw = self.packet();
        let label = LABEL_WEIGHTS.choose_weighted(&mut self.rng, |(_, weight)| *weight)
            .map(|(label, _)| *label)
            .unwrap_or(Label::Normal);

        LabeledRawRecord {
            src_ip: raw.src_ip,
            dst_ip: raw.dst_ip,
            protocol: raw.protocol,
            length: raw.length,
            src_port: raw.src_port,
            dst_port: raw.dst_port,
            flags: raw.flags,
            label,
        }
    }

    pub fn packets(&mut self, n: usize) -> Vec<RawRecord> {
        (0..n).map(|_| self.packet()).collect()
    }

    pub fn labeled_rows(&mut self, n: usize) -> Vec<LabeledRawRecord> {
        (0..n).map(|_| self.labeled()).collect()
    }
}


#[cfg(test)]
mod tests {
    use crate::feature_extraction::Thresholds;
    use crate::normalize::normalize;
    use crate::shared_interface::Protocol;
    use crate::synthetic::SyntheticTraffic;

    #[test]
    fn seeded() {
        assert_eq!(SyntheticTraffic::new(42).labeled_rows(20), SyntheticTraffic::new(42).labeled_rows(20));
    }

    #[test]
    fn packets_normalize() {
        let thresholds = Thresholds::default();
        for raw in SyntheticTraffic::new(1).packets(500) {
            let record = normalize(&raw, &thresholds).unwrap();
            assert!(record.packet.length >= 60 && record.packet.length <= 1500);
            assert!(!record.derived.src_dst_same_subnet);

            match record.packet.protocol {
                Protocol::Icmp => assert_eq!(None, record.packet.src_port),
                Protocol::Tcp => assert!(record.packet.flags.is_some()),
                Protocol::Udp => assert_eq!(None, record.packet.flags),
                Protocol::Other => panic!("unexpected protocol"),
            }
        }
    }
}
