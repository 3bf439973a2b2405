use std::{fmt, str::FromStr};

use rand::Rng;

/// An Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

#[derive(Debug, thiserror::Error)]
#[error("invalid hardware address: {0}")]
pub struct ParseMacError(String);

impl MacAddr {
    /// Generates a random, locally administered, unicast address.
    pub fn random() -> Self {
        let mut bytes: [u8; 6] = rand::thread_rng().gen();
        // Clear the multicast bit, set the locally administered bit.
        bytes[0] = (bytes[0] & 0xfe) | 0x02;
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');

        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseMacError(s.to_owned()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_owned()))?;
        }

        if parts.next().is_some() {
            return Err(ParseMacError(s.to_owned()));
        }

        Ok(Self(bytes))
    }
}
