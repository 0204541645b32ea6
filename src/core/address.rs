//! Network address containment for `ip` clauses
//!
//! An address is a fixed-length byte string (4 bytes for IPv4, 16 for IPv6)
//! paired with a mask of the same length. Textual forms:
//! - `192.168.1.10` - exact match (all-ones mask)
//! - `192.168.0.0/255.255.0.0` - mask given as an address
//! - `192.168.0.0/16` - mask given as a prefix length

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address with mask, immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    addr: Vec<u8>,
    mask: Vec<u8>,
}

impl Address {
    /// Parse `ip` or `ip/mask`
    ///
    /// # Examples
    /// ```
    /// use access_rules::core::address::Address;
    ///
    /// let net = Address::parse("10.0.0.0/8").unwrap();
    /// assert!(net.contains(&Address::parse("10.20.30.40").unwrap()));
    /// assert!(!net.contains(&Address::parse("11.0.0.1").unwrap()));
    /// ```
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        let unresolved = || ParseError::UnresolvedAddress(text.to_string());

        let (host, mask) = match text.split_once('/') {
            Some((host, mask)) => (host.trim(), Some(mask.trim())),
            None => (text, None),
        };

        let addr = octets(IpAddr::from_str(host).map_err(|_| unresolved())?);
        let mask = match mask {
            None => vec![0xff; addr.len()],
            Some(m) if m.contains('.') || m.contains(':') => {
                let mask = octets(IpAddr::from_str(m).map_err(|_| unresolved())?);
                if mask.len() != addr.len() {
                    return Err(unresolved());
                }
                mask
            }
            Some(m) => {
                let bits: usize = m.parse().map_err(|_| unresolved())?;
                if bits > addr.len() * 8 {
                    return Err(unresolved());
                }
                prefix_mask(addr.len(), bits)
            }
        };

        Ok(Address { addr, mask })
    }

    /// True iff both addresses have the same length and every masked byte
    /// of `self` equals the same byte of `other` under `self`'s mask.
    /// IPv4 never contains IPv6 (or vice versa).
    pub fn contains(&self, other: &Address) -> bool {
        if self.addr.len() != other.addr.len() {
            return false;
        }

        self.addr
            .iter()
            .zip(&other.addr)
            .zip(&self.mask)
            .all(|((a, b), m)| (a & m) == (b & m))
    }

    /// Whether the mask is all ones (exact host match)
    pub fn is_exact(&self) -> bool {
        self.mask.iter().all(|&b| b == 0xff)
    }

    pub fn len(&self) -> usize {
        self.addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addr.is_empty()
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        let addr = octets(ip);
        let mask = vec![0xff; addr.len()];
        Address { addr, mask }
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_ip(&self.addr))?;
        if !self.is_exact() {
            write!(f, "/{}", to_ip(&self.mask))?;
        }
        Ok(())
    }
}

fn octets(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

fn prefix_mask(len: usize, bits: usize) -> Vec<u8> {
    (0..len)
        .map(|i| {
            let remaining = bits.saturating_sub(i * 8).min(8);
            if remaining == 0 {
                0
            } else {
                0xffu8 << (8 - remaining)
            }
        })
        .collect()
}

// Lengths are always 4 or 16; constructors guarantee it.
fn to_ip(bytes: &[u8]) -> IpAddr {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        return IpAddr::V4(Ipv4Addr::from(v4));
    }
    let mut v6 = [0u8; 16];
    for (dst, src) in v6.iter_mut().zip(bytes) {
        *dst = *src;
    }
    IpAddr::V6(Ipv6Addr::from(v6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_address() {
        let a = Address::parse("192.168.1.10").unwrap();
        assert!(a.is_exact());
        assert!(a.contains(&a));
        assert!(!a.contains(&Address::parse("192.168.1.11").unwrap()));
    }

    #[test]
    fn test_mask_address_form() {
        let net = Address::parse("192.168.0.0/255.255.0.0").unwrap();
        assert!(net.contains(&Address::parse("192.168.44.1").unwrap()));
        assert!(!net.contains(&Address::parse("192.169.0.1").unwrap()));
    }

    #[test]
    fn test_prefix_length_form() {
        let net = Address::parse("172.16.0.0/12").unwrap();
        assert!(net.contains(&Address::parse("172.31.255.255").unwrap()));
        assert!(!net.contains(&Address::parse("172.32.0.1").unwrap()));
        assert_eq!(net.to_string(), "172.16.0.0/255.240.0.0");
    }

    #[test]
    fn test_ipv6() {
        let net = Address::parse("2001:db8::/32").unwrap();
        assert_eq!(net.len(), 16);
        assert!(net.contains(&Address::parse("2001:db8:1::5").unwrap()));
        assert!(!net.contains(&Address::parse("2001:db9::1").unwrap()));
    }

    #[test]
    fn test_mixed_families_never_match() {
        let v4 = Address::parse("0.0.0.0/0").unwrap();
        let v6 = Address::parse("::1").unwrap();
        assert!(!v4.contains(&v6));
        assert!(!v6.contains(&v4));
    }

    #[test]
    fn test_zero_mask_matches_everything_same_family() {
        let any = Address::parse("0.0.0.0/0").unwrap();
        assert!(any.contains(&Address::parse("8.8.8.8").unwrap()));
    }

    #[test]
    fn test_malformed_addresses() {
        for bad in ["", "300.1.1.1", "10.0.0.0/33", "10.0.0.0/ff::", "host.example", "1.2.3.4/x"] {
            match Address::parse(bad) {
                Err(ParseError::UnresolvedAddress(text)) => assert_eq!(text, bad.trim()),
                other => panic!("expected UnresolvedAddress for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["10.1.2.3", "10.0.0.0/255.0.0.0", "fe80::/ffff:ffff:ffff:ffff::"] {
            let parsed = Address::parse(text).unwrap();
            assert_eq!(parsed.to_string(), text);
            assert_eq!(Address::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }
}
