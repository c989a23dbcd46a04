use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol of a packet. Anything that is not TCP, UDP or ICMP is `Other`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "ICMP")]
    Icmp,
    #[serde(rename = "OTHER")]
    Other,
}

impl Protocol {
    /// IANA protocol number → protocol. Unassigned numbers are `Other`.
    pub fn from_code(code: u8) -> Self {
        match code {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            1 => Protocol::Icmp,
            _ => Protocol::Other,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TCP" => Some(Protocol::Tcp),
            "UDP" => Some(Protocol::Udp),
            "ICMP" => Some(Protocol::Icmp),
            "OTHER" => Some(Protocol::Other),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other => "OTHER",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed set of traffic categories a model can predict.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Normal,
    #[serde(rename = "DoS")]
    Dos,
    #[serde(rename = "Port Scan", alias = "PortScan")]
    PortScan,
    Malware,
}

impl Label {
    pub const ALL: [Label; 4] = [Label::Normal, Label::Dos, Label::PortScan, Label::Malware];

    pub fn is_malicious(&self) -> bool {
        *self != Label::Normal
    }

    pub fn name(&self) -> &'static str {
        match self {
            Label::Normal => "Normal",
            Label::Dos => "DoS",
            Label::PortScan => "Port Scan",
            Label::Malware => "Malware",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packet attributes as handed over by capture or by the synthetic generator.
/// Nothing is validated yet; `protocol` is either an IANA number or a name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub src_ip: String,
    pub dst_ip: String,
    pub protocol: String,
    pub length: i64,
    pub src_port: Option<i64>,
    pub dst_port: Option<i64>,
    pub flags: Option<i64>,
}

/// Raw record plus its label, one row of a training CSV.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LabeledRawRecord {
    pub src_ip: String,
    pub dst_ip: String,
    pub protocol: String,
    pub length: i64,
    pub src_port: Option<i64>,
    pub dst_port: Option<i64>,
    pub flags: Option<i64>,
    pub label: Label,
}

impl LabeledRawRecord {
    pub fn split(self) -> (RawRecord, Label) {
        let raw = RawRecord {
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            protocol: self.protocol,
            length: self.length,
            src_port: self.src_port,
            dst_port: self.dst_port,
            flags: self.flags,
        };
        (raw, self.label)
    }
}

/// Validated packet attributes. Immutable once produced by the normalizer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PacketRecord {
    pub src_ip: String,
    pub dst_ip: String,
    pub protocol: Protocol,
    pub length: u32,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub flags: Option<i64>,
}

impl fmt::Display for PacketRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let port = |p: Option<u16>| p.map_or_else(|| "-".to_owned(), |p| p.to_string());
        write!(f, "PacketRecord<{} {}:{} -> {}:{}, len={}>",
               self.protocol, self.src_ip, port(self.src_port), self.dst_ip, port(self.dst_port), self.length)
    }
}
