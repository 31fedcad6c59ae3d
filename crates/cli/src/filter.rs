//! VID:PID device filters
//!
//! Filter format: `"0xVID:0xPID"`, with `*` accepted in either position
//! (`"0x1234:*"`, `"*:*"`).

use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;
use types::DeviceIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    vendor_id: Option<u16>,
    product_id: Option<u16>,
}

impl DeviceFilter {
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|vid| vid == vendor_id)
            && self.product_id.is_none_or(|pid| pid == product_id)
    }

    pub fn matches_identity(&self, identity: &DeviceIdentity) -> bool {
        self.matches(identity.vendor_id, identity.product_id)
    }

    /// Parse a list of filters, failing on the first invalid one
    pub fn parse_all(filters: &[String]) -> Result<Vec<Self>> {
        filters.iter().map(|f| f.parse()).collect()
    }

    /// True if any filter matches, or if there are no filters at all
    pub fn allows(filters: &[Self], vendor_id: u16, product_id: u16) -> bool {
        filters.is_empty() || filters.iter().any(|f| f.matches(vendor_id, product_id))
    }

    fn parse_id(id: &str, name: &str, filter: &str) -> Result<Option<u16>> {
        if id == "*" {
            return Ok(None);
        }

        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid {} '{}' in filter '{}', must start with '0x' (e.g., '0x1234')",
                    name,
                    id,
                    filter
                )
            })?;

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}' in filter '{}', hex part must be 1-4 digits",
                name,
                id,
                filter
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} '{}' in filter '{}', not a valid hex number", name, id, filter))
    }
}

impl FromStr for DeviceFilter {
    type Err = anyhow::Error;

    fn from_str(filter: &str) -> Result<Self> {
        let parts: Vec<&str> = filter.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')",
                filter
            ));
        }

        Ok(Self {
            vendor_id: Self::parse_id(parts[0], "VID", filter)?,
            product_id: Self::parse_id(parts[1], "PID", filter)?,
        })
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor_id {
            Some(vid) => write!(f, "{:#06x}:", vid)?,
            None => write!(f, "*:")?,
        }
        match self.product_id {
            Some(pid) => write!(f, "{:#06x}", pid),
            None => write!(f, "*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_logic() {
        let filters = DeviceFilter::parse_all(&[
            "0x1234:0x5678".to_string(), // Exact match
            "0xABCD:*".to_string(),      // Wildcard PID
        ])
        .unwrap();

        assert!(DeviceFilter::allows(&filters, 0x1234, 0x5678));
        assert!(DeviceFilter::allows(&filters, 0xABCD, 0x1111));
        assert!(DeviceFilter::allows(&filters, 0xABCD, 0x9999));

        assert!(!DeviceFilter::allows(&filters, 0x1234, 0x9999)); // Wrong PID
        assert!(!DeviceFilter::allows(&filters, 0x9999, 0x5678)); // Wrong VID
        assert!(!DeviceFilter::allows(&filters, 0x0000, 0x0000));

        // Empty filters = allow all
        assert!(DeviceFilter::allows(&[], 0x1234, 0x5678));
    }

    #[test]
    fn test_parse_valid() {
        assert!("0x1234:0x5678".parse::<DeviceFilter>().is_ok());
        assert!("0x1234:*".parse::<DeviceFilter>().is_ok());
        assert!("*:0x5678".parse::<DeviceFilter>().is_ok());
        assert!("*:*".parse::<DeviceFilter>().is_ok());
        assert!("0XABCD:0xef01".parse::<DeviceFilter>().is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert!("1234:5678".parse::<DeviceFilter>().is_err());
        assert!("0x1234".parse::<DeviceFilter>().is_err());
        assert!("0x1234:0x5678:0x9abc".parse::<DeviceFilter>().is_err());
        assert!("0xGHIJ:0x5678".parse::<DeviceFilter>().is_err());
        assert!("0x12345:0x5678".parse::<DeviceFilter>().is_err());
        assert!("0x:0x5678".parse::<DeviceFilter>().is_err());
    }

    #[test]
    fn test_display() {
        let filter: DeviceFilter = "0x1234:*".parse().unwrap();
        assert_eq!(filter.to_string(), "0x1234:*");
        let filter: DeviceFilter = "*:0x00ff".parse().unwrap();
        assert_eq!(filter.to_string(), "*:0x00ff");
    }
}
