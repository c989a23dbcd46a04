//! Encoding schemes.
//!
//! A scheme fixes everything that decides the feature columns: which numeric
//! fields pass through, which derived flags are emitted and with which
//! thresholds, and the full category enumeration of every one-hot field.
//! Changing any of it changes the columns a model is trained on, so every
//! change gets a new version.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reconcile::FeatureSchema;
use crate::shared_interface::{PacketRecord, Protocol};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeVersion {
    /// Legacy layout: protocol one-hot, flags, large-packet flag at 1000 bytes.
    V1,
    /// Current layout: derived flags, protocol one-hot, length category one-hot.
    V2,
}

impl SchemeVersion {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Some(SchemeVersion::V1),
            "v2" | "2" => Some(SchemeVersion::V2),
            _ => None,
        }
    }
}

/// Cut-offs for the derived boolean attributes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Packets strictly longer than this are large.
    pub large_packet_bytes: u32,
    /// Ports strictly below this are privileged.
    pub privileged_port_limit: u16,
    /// Number of leading IPv4 octets that must match for "same subnet".
    pub subnet_octets: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            large_packet_bytes: 1200,
            privileged_port_limit: 1024,
            subnet_octets: 3,
        }
    }
}

/// Numeric packet attributes that pass through unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Length,
    SrcPort,
    DstPort,
    Flags,
}

impl NumericField {
    pub fn column(&self) -> &'static str {
        match self {
            NumericField::Length => "length",
            NumericField::SrcPort => "src_port",
            NumericField::DstPort => "dst_port",
            NumericField::Flags => "flags",
        }
    }

    /// `None` for absent optional attributes; the reconciler fills those.
    pub fn value(&self, packet: &PacketRecord) -> Option<f64> {
        match self {
            NumericField::Length => Some(packet.length as f64),
            NumericField::SrcPort => packet.src_port.map(f64::from),
            NumericField::DstPort => packet.dst_port.map(f64::from),
            NumericField::Flags => packet.flags.map(|f| f as f64),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedFlag {
    LargePacket,
    SameSubnet,
    PrivilegedPort,
}

impl DerivedFlag {
    pub fn column(&self) -> &'static str {
        match self {
            DerivedFlag::LargePacket => "is_large_packet",
            DerivedFlag::SameSubnet => "src_dst_same_subnet",
            DerivedFlag::PrivilegedPort => "port_range_flag",
        }
    }
}

/// Half-open length bucket `(lower, upper]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LengthBin {
    pub name: String,
    pub lower: u32,
    pub upper: u32,
}

impl LengthBin {
    pub fn new(name: &str, lower: u32, upper: u32) -> Self {
        LengthBin { name: name.to_owned(), lower, upper }
    }

    pub fn contains(&self, length: u32) -> bool {
        length > self.lower && length <= self.upper
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncodingScheme {
    pub version: SchemeVersion,
    pub thresholds: Thresholds,
    pub numeric: Vec<NumericField>,
    pub derived: Vec<DerivedFlag>,
    pub protocol_prefix: String,
    pub protocols: Vec<Protocol>,
    pub length_bins: Vec<LengthBin>,
}

lazy_static! {
    static ref SCHEME_V1: EncodingScheme = EncodingScheme {
        version: SchemeVersion::V1,
        thresholds: Thresholds { large_packet_bytes: 1000, ..Thresholds::default() },
        numeric: vec![NumericField::Length, NumericField::SrcPort, NumericField::DstPort, NumericField::Flags],
        derived: vec![DerivedFlag::LargePacket],
        protocol_prefix: "protocol_name_".to_owned(),
        protocols: vec![Protocol::Tcp, Protocol::Udp, Protocol::Icmp],
        length_bins: vec![],
    };

    static ref SCHEME_V2: EncodingScheme = EncodingScheme {
        version: SchemeVersion::V2,
        thresholds: Thresholds::default(),
        numeric: vec![NumericField::Length, NumericField::SrcPort, NumericField::DstPort],
        derived: vec![DerivedFlag::LargePacket, DerivedFlag::SameSubnet, DerivedFlag::PrivilegedPort],
        protocol_prefix: "protocol_".to_owned(),
        protocols: vec![Protocol::Tcp, Protocol::Udp, Protocol::Icmp],
        length_bins: vec![
            LengthBin::new("Small", 0, 500),
            LengthBin::new("Medium", 500, 1000),
            LengthBin::new("Large", 1000, 2000),
        ],
    };
}

impl Default for EncodingScheme {
    fn default() -> Self {
        SCHEME_V2.clone()
    }
}

impl EncodingScheme {
    pub fn builtin(version: SchemeVersion) -> &'static EncodingScheme {
        match version {
            SchemeVersion::V1 => &SCHEME_V1,
            SchemeVersion::V2 => &SCHEME_V2,
        }
    }

    /// Load a scheme from JSON. The column layout is checked for duplicates.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let scheme: EncodingScheme = serde_json::from_reader(reader)?;
        scheme.schema()?;
        Ok(scheme)
    }

    pub fn protocol_column(&self, protocol: Protocol) -> String {
        format!("{}{}", self.protocol_prefix, protocol.name())
    }

    pub fn length_column(bin: &LengthBin) -> String {
        format!("length_category_{}", bin.name)
    }

    /// All column names this scheme emits, in emission order.
    pub fn columns(&self) -> Vec<String> {
        self.numeric.iter().map(|f| f.column().to_owned())
            .chain(self.derived.iter().map(|d| d.column().to_owned()))
            .chain(self.protocols.iter().map(|p| self.protocol_column(*p)))
            .chain(self.length_bins.iter().map(EncodingScheme::length_column))
            .collect()
    }

    pub fn schema(&self) -> Result<FeatureSchema> {
        FeatureSchema::new(self.columns())
    }

    /// Columns both schemes emit under the same name but compute differently.
    ///
    /// Reconciliation matches columns by name only, so these pass through
    /// without showing up as drift.
    pub fn conflicting_columns(&self, other: &EncodingScheme) -> Vec<String> {
        let (a, b) = (&self.thresholds, &other.thresholds);

        let flags = self.derived.iter()
            .filter(|flag| other.derived.contains(*flag))
            .filter(|flag| match **flag {
                DerivedFlag::LargePacket => a.large_packet_bytes != b.large_packet_bytes,
                DerivedFlag::SameSubnet => a.subnet_octets != b.subnet_octets,
                DerivedFlag::PrivilegedPort => a.privileged_port_limit != b.privileged_port_limit,
            })
            .map(|flag| flag.column().to_owned());

        let bins = self.length_bins.iter()
            .filter(|bin| other.length_bins.iter().any(|o| o.name == bin.name && o != *bin))
            .map(EncodingScheme::length_column);

        flags.chain(bins).collect()
    }
}
