//! Flow record schema.
//!
//! One [`FlowRecord`] per line of an sflowtool-style CSV log. The file has no
//! header row, so fields are decoded strictly by position.

use serde::{de, Deserialize, Deserializer};

/// Transport layer protocol, keyed by IANA protocol number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Other(u8),
}

impl Protocol {
    pub const TCP_NUMBER: u8 = 6;
    pub const UDP_NUMBER: u8 = 17;
}

impl From<u8> for Protocol {
    fn from(number: u8) -> Self {
        match number {
            Self::TCP_NUMBER => Protocol::Tcp,
            Self::UDP_NUMBER => Protocol::Udp,
            n => Protocol::Other(n),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Other(n) => write!(f, "PROTO:{}", n),
        }
    }
}

/// A single sampled packet observation.
///
/// Field order matches the column order of the log and must not change.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlowRecord {
    pub record_type: String,
    pub agent_address: String,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub input_port: u32,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub output_port: u32,
    pub src_mac: String,
    pub dst_mac: String,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub ethernet_type: u16,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub in_vlan: u16,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub out_vlan: u16,
    pub src_ip: String,
    pub dst_ip: String,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub ip_protocol: u8,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub ip_tos: u8,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub ip_ttl: u8,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub src_port: u16,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub dst_port: u16,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub tcp_flags: u16,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub packet_size: u32,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub ip_size: u32,
    #[serde(deserialize_with = "hex_or_decimal")]
    pub sampling_rate: u32,
}

/// Number of positional columns in a flow record line.
pub const FIELD_COUNT: usize = 20;

impl FlowRecord {
    /// Returns the transport protocol of this sample.
    pub fn protocol(&self) -> Protocol {
        Protocol::from(self.ip_protocol)
    }
}

/// Parses unsigned integer text written either in decimal or `0x` hex.
pub fn parse_unsigned(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    let parsed = match raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid integer '{}': {}", raw, e))
}

fn hex_or_decimal<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let raw = String::deserialize(deserializer)?;
    let value = parse_unsigned(&raw).map_err(de::Error::custom)?;
    T::try_from(value).map_err(|_| {
        de::Error::custom(format!(
            "value {} out of range for {}",
            value,
            std::any::type_name::<T>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Result<FlowRecord, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(line.as_bytes());
        reader
            .deserialize::<FlowRecord>()
            .next()
            .expect("one record")
    }

    #[test]
    fn test_decode_sflowtool_line() {
        let record = decode(
            "FLOW,10.0.0.254,17,3,001122334455,66778899aabb,0x0800,10,20,\
             192.168.1.10,8.8.8.8,17,0x00,64,53211,53,0x00,90,72,2048",
        )
        .unwrap();

        assert_eq!(record.record_type, "FLOW");
        assert_eq!(record.ethernet_type, 0x0800);
        assert_eq!(record.src_ip, "192.168.1.10");
        assert_eq!(record.dst_ip, "8.8.8.8");
        assert_eq!(record.dst_port, 53);
        assert_eq!(record.ip_size, 72);
        assert_eq!(record.sampling_rate, 2048);
        assert_eq!(record.protocol(), Protocol::Udp);
    }

    #[test]
    fn test_decode_decimal_fields_with_whitespace() {
        let record = decode(
            "FLOW, 10.0.0.254, 1, 2, aa, bb, 2048, 0, 0, 10.0.0.1, 10.0.0.2, 6, 0, 64, 40000, 443, 24, 1514, 1500, 512",
        )
        .unwrap();

        assert_eq!(record.ethernet_type, 2048);
        assert_eq!(record.tcp_flags, 24);
        assert_eq!(record.protocol(), Protocol::Tcp);
    }

    #[test]
    fn test_decode_rejects_out_of_range_port() {
        let result = decode(
            "FLOW,a,1,2,aa,bb,2048,0,0,10.0.0.1,10.0.0.2,6,0,64,40000,70000,0,100,90,1",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_non_numeric_size() {
        let result = decode(
            "FLOW,a,1,2,aa,bb,2048,0,0,10.0.0.1,10.0.0.2,6,0,64,40000,443,0,big,90,1",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_short_row() {
        let result = decode("FLOW,a,1,2,aa,bb,2048,0,0,10.0.0.1,10.0.0.2,6");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_unsigned() {
        assert_eq!(parse_unsigned("0x18"), Ok(24));
        assert_eq!(parse_unsigned("0X0800"), Ok(2048));
        assert_eq!(parse_unsigned(" 42 "), Ok(42));
        assert!(parse_unsigned("-1").is_err());
        assert!(parse_unsigned("0xZZ").is_err());
    }

    #[test]
    fn test_protocol_display() {
        assert_eq!(Protocol::from(6).to_string(), "TCP");
        assert_eq!(Protocol::from(17).to_string(), "UDP");
        assert_eq!(Protocol::from(1).to_string(), "PROTO:1");
    }
}
