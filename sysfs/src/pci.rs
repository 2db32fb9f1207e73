//! PCI and SCSI addressing of guest-visible disks.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Field value standing for "not specified".
pub const UNSPECIFIED: u16 = 0xFFFF;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid PCI address {0:?}: {1}")]
    Parse(String, &'static str),
    #[error("Incomplete PCI address {0}: bus, device and function required")]
    Incomplete(PciAddress),
}

/// Extended BDF address. Every field may be left unspecified and filled in
/// later from a default (see [`merge`](PciAddress::merge)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u16,
    pub device: u16,
    pub function: u16,
}

impl Default for PciAddress {
    fn default() -> Self {
        PciAddress {
            domain: UNSPECIFIED,
            bus: UNSPECIFIED,
            device: UNSPECIFIED,
            function: UNSPECIFIED,
        }
    }
}

impl PciAddress {
    /// Take this address and substitute every unspecified field from the
    /// default.
    pub fn merge(&self, default: &PciAddress) -> PciAddress {
        let pick = |a: u16, b: u16| if a == UNSPECIFIED { b } else { a };
        PciAddress {
            domain: pick(self.domain, default.domain),
            bus: pick(self.bus, default.bus),
            device: pick(self.device, default.device),
            function: pick(self.function, default.function),
        }
    }

    /// A usable address needs bus, device and function; an unspecified
    /// domain completes to 0.
    pub fn complete(&self) -> Result<PciAddress, AddressError> {
        if self.bus == UNSPECIFIED
            || self.device == UNSPECIFIED
            || self.function == UNSPECIFIED
        {
            return Err(AddressError::Incomplete(*self));
        }
        let mut addr = *self;
        if addr.domain == UNSPECIFIED {
            addr.domain = 0;
        }
        Ok(addr)
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.domain != UNSPECIFIED {
            write!(f, "{:04x}", self.domain)?;
        }
        write!(f, ":")?;
        if self.bus != UNSPECIFIED {
            write!(f, "{:02x}", self.bus)?;
        }
        write!(f, ":")?;
        if self.device != UNSPECIFIED {
            write!(f, "{:02x}", self.device)?;
        }
        write!(f, ".")?;
        if self.function != UNSPECIFIED {
            write!(f, "{:x}", self.function)?;
        }
        Ok(())
    }
}

fn parse_field(
    input: &str,
    field: &str,
    max: u16,
) -> Result<u16, AddressError> {
    if field.is_empty() {
        return Ok(UNSPECIFIED);
    }
    let val = u16::from_str_radix(field, 16)
        .map_err(|_| AddressError::Parse(input.to_string(), "not hex"))?;
    if val > max {
        return Err(AddressError::Parse(input.to_string(), "out of range"));
    }
    Ok(val)
}

impl FromStr for PciAddress {
    type Err = AddressError;

    /// Parse `[domain:]bus:device.function`, any field may be empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (left, function) = match s.rsplit_once('.') {
            Some(parts) => parts,
            None => {
                return Err(AddressError::Parse(
                    s.to_string(),
                    "missing function separator",
                ))
            }
        };
        let mut it = left.split(':');
        let (domain, bus, device) =
            match (it.next(), it.next(), it.next(), it.next()) {
                (Some(bus), Some(device), None, None) => ("", bus, device),
                (Some(domain), Some(bus), Some(device), None) => {
                    (domain, bus, device)
                }
                _ => {
                    return Err(AddressError::Parse(
                        s.to_string(),
                        "expected [domain:]bus:device",
                    ))
                }
            };
        Ok(PciAddress {
            domain: parse_field(s, domain, 0xFFFF)?,
            bus: parse_field(s, bus, 0xFF)?,
            device: parse_field(s, device, 0x1F)?,
            // three bits on the wire
            function: parse_field(s, function, 0x7)?,
        })
    }
}

/// Unit coordinates behind a SCSI host, disambiguating disks that share one
/// PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScsiDisk {
    pub target: u32,
    pub lun: u32,
}

impl fmt::Display for ScsiDisk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.target, self.lun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(domain: u16, bus: u16, device: u16, function: u16) -> PciAddress {
        PciAddress {
            domain,
            bus,
            device,
            function,
        }
    }

    #[test]
    fn parses_full_bdf() {
        assert_eq!(
            "0001:02:03.4".parse::<PciAddress>().unwrap(),
            addr(1, 2, 3, 4)
        );
    }

    #[test]
    fn parses_empty_slots() {
        assert_eq!(
            "::.".parse::<PciAddress>().unwrap(),
            PciAddress::default()
        );
        assert_eq!(
            ":17:.2".parse::<PciAddress>().unwrap(),
            addr(UNSPECIFIED, 0x17, UNSPECIFIED, 2)
        );
        assert_eq!(
            "00:17.0".parse::<PciAddress>().unwrap(),
            addr(UNSPECIFIED, 0, 0x17, 0)
        );
    }

    #[test]
    fn rejects_out_of_range_function() {
        assert!("::.8".parse::<PciAddress>().is_err());
    }

    #[test]
    fn rejects_malformed() {
        assert!("".parse::<PciAddress>().is_err());
        assert!("0000".parse::<PciAddress>().is_err());
        assert!("zz:00:00.0".parse::<PciAddress>().is_err());
        assert!("1:2:3:4.5".parse::<PciAddress>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for a in [
            addr(1, 2, 3, 4),
            addr(0, 0, 0x17, 0),
            PciAddress::default(),
            addr(UNSPECIFIED, 0x12, UNSPECIFIED, 7),
        ] {
            assert_eq!(a.to_string().parse::<PciAddress>().unwrap(), a);
        }
        assert_eq!(addr(1, 2, 3, 4).to_string(), "0001:02:03.4");
        assert_eq!(PciAddress::default().to_string(), "::.");
    }

    #[test]
    fn merges_unspecified_fields() {
        let merged =
            PciAddress::default().merge(&addr(1, 2, 3, 4));
        assert_eq!(merged, addr(1, 2, 3, 4));
        let partial = addr(UNSPECIFIED, 7, UNSPECIFIED, 0)
            .merge(&addr(1, 2, 3, 4));
        assert_eq!(partial, addr(1, 7, 3, 0));
    }

    #[test]
    fn completes_domain_only() {
        let done = addr(UNSPECIFIED, 1, 2, 3).complete().unwrap();
        assert_eq!(done, addr(0, 1, 2, 3));
        assert!(addr(0, UNSPECIFIED, 2, 3).complete().is_err());
    }
}
