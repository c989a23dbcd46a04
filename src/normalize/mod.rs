use std::convert::TryFrom;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::MalformedRecord;
use crate::feature_extraction::{DerivedFlag, Thresholds};
use crate::shared_interface::{PacketRecord, Protocol, RawRecord};

#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedFlags {
    pub is_large_packet: bool,
    pub src_dst_same_subnet: bool,
    pub port_range_flag: bool,
}

impl DerivedFlags {
    pub fn get(&self, flag: DerivedFlag) -> bool {
        match flag {
            DerivedFlag::LargePacket => self.is_large_packet,
            DerivedFlag::SameSubnet => self.src_dst_same_subnet,
            DerivedFlag::PrivilegedPort => self.port_range_flag,
        }
    }
}

/// Validated packet plus the boolean attributes derived from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub packet: PacketRecord,
    pub derived: DerivedFlags,
}

/// Validate a raw record and compute its derived flags.
///
/// `protocol` may be an IANA number (6, 17 and 1 are TCP, UDP and ICMP, any
/// other number in 0..=255 is OTHER) or one of the names TCP, UDP, ICMP, OTHER.
pub fn normalize(raw: &RawRecord, thresholds: &Thresholds) -> Result<CanonicalRecord, MalformedRecord> {
    let protocol = parse_protocol(&raw.protocol)?;

    if raw.length < 0 { return Err(MalformedRecord::NegativeLength(raw.length)); }
    let length = u32::try_from(raw.length).map_err(|_| MalformedRecord::LengthOverflow(raw.length))?;

    let packet = PacketRecord {
        src_ip: raw.src_ip.trim().to_owned(),
        dst_ip: raw.dst_ip.trim().to_owned(),
        protocol,
        length,
        src_port: parse_port("src_port", raw.src_port)?,
        dst_port: parse_port("dst_port", raw.dst_port)?,
        flags: raw.flags,
    };

    let derived = derive_flags(&packet, thresholds);
    Ok(CanonicalRecord { packet, derived })
}

pub fn derive_flags(packet: &PacketRecord, thresholds: &Thresholds) -> DerivedFlags {
    let privileged = |port: Option<u16>| port.map_or(false, |p| p < thresholds.privileged_port_limit);

    DerivedFlags {
        is_large_packet: packet.length > thresholds.large_packet_bytes,
        src_dst_same_subnet: same_subnet(&packet.src_ip, &packet.dst_ip, thresholds.subnet_octets),
        port_range_flag: privileged(packet.src_port) || privileged(packet.dst_port),
    }
}

fn parse_protocol(input: &str) -> Result<Protocol, MalformedRecord> {
    let trimmed = input.trim();
    match trimmed.parse::<i64>() {
        Ok(code) => u8::try_from(code)
            .map(Protocol::from_code)
            .map_err(|_| MalformedRecord::UnknownProtocol(trimmed.to_owned())),
        Err(_) => Protocol::from_name(trimmed)
            .ok_or_else(|| MalformedRecord::UnknownProtocol(trimmed.to_owned())),
    }
}

fn parse_port(field: &'static str, port: Option<i64>) -> Result<Option<u16>, MalformedRecord> {
    match port {
        None => Ok(None),
        Some(value) => u16::try_from(value)
            .map(Some)
            .map_err(|_| MalformedRecord::PortOutOfRange { field, value }),
    }
}

/// Leading `octets` of two dotted-decimal IPv4 addresses are equal.
/// Addresses that are not IPv4 are never in the same subnet.
fn same_subnet(src: &str, dst: &str, octets: usize) -> bool {
    match (src.parse::<Ipv4Addr>(), dst.parse::<Ipv4Addr>()) {
        (Ok(src), Ok(dst)) => {
            let n = octets.min(4);
            src.octets()[..n] == dst.octets()[..n]
        }
        _ => false
    }
}


#[cfg(test)]
mod tests {
    use crate::error::MalformedRecord;
    use crate::feature_extraction::Thresholds;
    use crate::normalize::{normalize, same_subnet};
    use crate::shared_interface::{Protocol, RawRecord};

    fn raw(src_ip: &str, dst_ip: &str, protocol: &str, length: i64, src_port: Option<i64>, dst_port: Option<i64>) -> RawRecord {
        RawRecord {
            src_ip: src_ip.to_owned(),
            dst_ip: dst_ip.to_owned(),
            protocol: protocol.to_owned(),
            length,
            src_port,
            dst_port,
            flags: Some(18),
        }
    }

    #[test]
    fn smoke_test() {
        let record = normalize(&raw("192.168.1.5", "10.0.0.7", "6", 1500, Some(22), Some(50000)), &Thresholds::default()).unwrap();

        assert_eq!(Protocol::Tcp, record.packet.protocol);
        assert_eq!(1500, record.packet.length);
        assert_eq!(Some(22), record.packet.src_port);
        assert_eq!(Some(18), record.packet.flags);
        assert!(record.derived.is_large_packet);
        assert!(record.derived.port_range_flag);
        assert!(!record.derived.src_dst_same_subnet);
    }

    #[test]
    fn protocol_codes_and_names() {
        let t = Thresholds::default();
        let proto = |p: &str| normalize(&raw("a", "b", p, 60, None, None), &t).map(|r| r.packet.protocol);

        assert_eq!(Ok(Protocol::Udp), proto("17"));
        assert_eq!(Ok(Protocol::Icmp), proto("1"));
        assert_eq!(Ok(Protocol::Other), proto("47"));
        assert_eq!(Ok(Protocol::Icmp), proto("icmp"));
        assert_eq!(Ok(Protocol::Other), proto("OTHER"));
        assert_eq!(Err(MalformedRecord::UnknownProtocol("SCTP".to_owned())), proto("SCTP"));
        assert_eq!(Err(MalformedRecord::UnknownProtocol("300".to_owned())), proto("300"));
        assert_eq!(Err(MalformedRecord::UnknownProtocol("-6".to_owned())), proto("-6"));
    }

    #[test]
    fn negative_length() {
        let result = normalize(&raw("a", "b", "6", -1, None, None), &Thresholds::default());
        assert_eq!(Err(MalformedRecord::NegativeLength(-1)), result);
    }

    #[test]
    fn port_out_of_range() {
        let result = normalize(&raw("a", "b", "6", 60, Some(70000), None), &Thresholds::default());
        assert_eq!(Err(MalformedRecord::PortOutOfRange { field: "src_port", value: 70000 }), result);

        let result = normalize(&raw("a", "b", "6", 60, None, Some(-1)), &Thresholds::default());
        assert_eq!(Err(MalformedRecord::PortOutOfRange { field: "dst_port", value: -1 }), result);
    }

    #[test]
    fn thresholds_are_strict() {
        let t = Thresholds::default();
        let at = normalize(&raw("a", "b", "6", 1200, Some(1024), Some(1024)), &t).unwrap();
        assert!(!at.derived.is_large_packet);
        assert!(!at.derived.port_range_flag);

        let over = normalize(&raw("a", "b", "6", 1201, Some(1023), Some(1024)), &t).unwrap();
        assert!(over.derived.is_large_packet);
        assert!(over.derived.port_range_flag);
    }

    #[test]
    fn missing_ports_are_not_privileged() {
        let record = normalize(&raw("a", "b", "1", 84, None, None), &Thresholds::default()).unwrap();
        assert!(!record.derived.port_range_flag);
    }

    #[test]
    fn subnet_comparison() {
        assert!(same_subnet("192.168.1.5", "192.168.1.200", 3));
        assert!(!same_subnet("192.168.1.5", "192.168.2.5", 3));
        assert!(same_subnet("192.168.1.5", "192.168.2.5", 2));
        assert!(!same_subnet("192.168.1.5", "fe80::1", 3));
        assert!(!same_subnet("not-an-ip", "not-an-ip", 3));
    }
}
