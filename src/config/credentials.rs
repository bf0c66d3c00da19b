//! WiFi credential data structures.
//!
//! This module contains platform-independent types for network credentials
//! that can be tested on the host machine.
//!
//! # Example
//!
//! ```
//! use garden_link::config::{Bssid, Credentials};
//!
//! let creds = Credentials::new("Greenhouse", "hunter2").unwrap();
//! assert!(creds.validate().is_ok());
//!
//! let pinned = creds.with_bssid("a4:cf:12:00:be:ef".parse::<Bssid>().unwrap());
//! assert!(pinned.bssid().is_some());
//! ```

use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Length of an access point's physical address.
pub const BSSID_LEN: usize = 6;

/// Physical address of a specific access point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Zeroize)]
pub struct Bssid([u8; BSSID_LEN]);

impl Bssid {
    /// Create a BSSID from its six octets.
    pub const fn new(octets: [u8; BSSID_LEN]) -> Self {
        Self(octets)
    }

    /// Create a BSSID from a slice, which must be exactly six bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let octets: [u8; BSSID_LEN] = bytes
            .try_into()
            .map_err(|_| ConfigError::BssidLength { len: bytes.len() })?;
        Ok(Self(octets))
    }

    /// The six octets of the address.
    pub fn octets(&self) -> [u8; BSSID_LEN] {
        self.0
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bssid({})", self)
    }
}

impl FromStr for Bssid {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != BSSID_LEN {
            return Err(ConfigError::InvalidFormat(format!("bad BSSID: {}", s)));
        }
        let mut octets = [0u8; BSSID_LEN];
        for (octet, part) in octets.iter_mut().zip(parts) {
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| ConfigError::InvalidFormat(format!("bad BSSID: {}", s)))?;
        }
        Ok(Self(octets))
    }
}

/// Credentials for associating with an access point.
///
/// Treated as an immutable value snapshot: components pass clones around
/// rather than sharing a buffer. The password is zeroed when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    ssid: String,
    password: String,
    bssid: Option<Bssid>,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// Returns an error if SSID or password are invalid. An empty password
    /// selects an open network.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let creds = Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid: None,
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Pin these credentials to a specific access point.
    pub fn with_bssid(mut self, bssid: Bssid) -> Self {
        self.bssid = Some(bssid);
        self
    }

    /// Validate the credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(())
    }

    /// Network name.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Network password (empty for open networks).
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Access point the credentials are pinned to, if any.
    pub fn bssid(&self) -> Option<Bssid> {
        self.bssid
    }

    /// Check if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Serialize to bytes for NVS storage.
    ///
    /// Format: `[ssid_len:1][ssid:N][password_len:1][password:M][bssid_set:1][bssid:6]?`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(3 + self.ssid.len() + self.password.len() + BSSID_LEN);
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        match self.bssid {
            Some(bssid) => {
                bytes.push(1);
                bytes.extend_from_slice(&bssid.octets());
            }
            None => bytes.push(0),
        }
        bytes
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.is_empty() {
            return Err(ConfigError::InvalidFormat("empty data".into()));
        }

        let ssid_len = bytes[0] as usize;
        if bytes.len() < 1 + ssid_len + 1 {
            return Err(ConfigError::InvalidFormat("truncated SSID".into()));
        }
        let ssid = String::from_utf8(bytes[1..1 + ssid_len].to_vec())
            .map_err(|_| ConfigError::InvalidFormat("invalid SSID UTF-8".into()))?;

        let password_len = bytes[1 + ssid_len] as usize;
        let password_start = 2 + ssid_len;
        let password_end = password_start + password_len;
        if bytes.len() < password_end + 1 {
            return Err(ConfigError::InvalidFormat("truncated password".into()));
        }
        let password = String::from_utf8(bytes[password_start..password_end].to_vec())
            .map_err(|_| ConfigError::InvalidFormat("invalid password UTF-8".into()))?;

        let creds = Self::new(ssid, password)?;
        match bytes[password_end] {
            0 => Ok(creds),
            1 => {
                let rest = &bytes[password_end + 1..];
                let octets = rest
                    .get(..BSSID_LEN)
                    .ok_or_else(|| ConfigError::InvalidFormat("truncated BSSID".into()))?;
                Ok(creds.with_bssid(Bssid::from_slice(octets)?))
            }
            flag => Err(ConfigError::InvalidFormat(format!(
                "bad BSSID flag: {}",
                flag
            ))),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"****")
            .field("bssid", &self.bssid)
            .finish()
    }
}

/// Credentials as announced over the air, before validation.
///
/// The provisioning transport hands over its fixed-size buffers untouched:
/// SSID and password may carry trailing NUL padding, and the BSSID is only
/// meaningful when the sender flagged it.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RawAnnouncement {
    pub ssid: Vec<u8>,
    pub password: Vec<u8>,
    pub bssid: Option<Vec<u8>>,
}

impl RawAnnouncement {
    /// Create an announcement from its raw parts.
    pub fn new(ssid: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            bssid: None,
        }
    }

    /// Attach the sender-flagged BSSID bytes.
    pub fn with_bssid(mut self, bssid: impl Into<Vec<u8>>) -> Self {
        self.bssid = Some(bssid.into());
        self
    }

    /// Decode into validated credentials.
    ///
    /// Malformed announcements (oversized fields, invalid UTF-8, empty SSID,
    /// BSSID not exactly six bytes) are rejected.
    pub fn decode(&self) -> Result<Credentials, ConfigError> {
        let ssid = decode_field(&self.ssid, MAX_SSID_LEN, "SSID")?;
        let password = decode_field(&self.password, MAX_PASSWORD_LEN, "password")?;
        let creds = Credentials::new(ssid, password)?;
        match &self.bssid {
            Some(bytes) => Ok(creds.with_bssid(Bssid::from_slice(bytes)?)),
            None => Ok(creds),
        }
    }
}

impl fmt::Debug for RawAnnouncement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAnnouncement")
            .field("ssid", &String::from_utf8_lossy(&self.ssid))
            .field("password_len", &self.password.len())
            .field("bssid", &self.bssid)
            .finish()
    }
}

/// Strip NUL padding and validate one text field of an announcement.
fn decode_field(raw: &[u8], max: usize, name: &str) -> Result<String, ConfigError> {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let trimmed = &raw[..end];
    if trimmed.len() > max {
        return Err(ConfigError::InvalidFormat(format!(
            "{} too long: {} bytes (max {})",
            name,
            trimmed.len(),
            max
        )));
    }
    if trimmed.contains(&0) {
        return Err(ConfigError::InvalidFormat(format!("{} has embedded NUL", name)));
    }
    String::from_utf8(trimmed.to_vec())
        .map_err(|_| ConfigError::InvalidFormat(format!("invalid {} UTF-8", name)))
}

/// Errors that can occur during configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// BSSID is not exactly six bytes.
    BssidLength { len: usize },
    /// Invalid data format during decoding or deserialization.
    InvalidFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::BssidLength { len } => {
                write!(f, "BSSID must be {} bytes, got {}", BSSID_LEN, len)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    const AP: [u8; 6] = [0xa4, 0xcf, 0x12, 0x00, 0xbe, 0xef];

    // ==================== Credentials Tests ====================

    #[test]
    fn test_valid_credentials() {
        let creds = Credentials::new("Greenhouse", "hunter2").unwrap();
        assert_eq!(creds.ssid(), "Greenhouse");
        assert_eq!(creds.password(), "hunter2");
        assert_eq!(creds.bssid(), None);
    }

    #[test]
    fn test_open_network() {
        let creds = Credentials::new("Allotment", "").unwrap();
        assert!(creds.is_open());
    }

    #[test]
    fn test_empty_ssid() {
        assert_eq!(Credentials::new("", "hunter2"), Err(ConfigError::SsidEmpty));
    }

    #[test]
    fn test_ssid_bounds() {
        assert!(Credentials::new("a".repeat(32), "").is_ok());
        assert!(matches!(
            Credentials::new("a".repeat(33), ""),
            Err(ConfigError::SsidTooLong { len: 33, max: 32 })
        ));
    }

    #[test]
    fn test_password_bounds() {
        assert!(Credentials::new("Greenhouse", "p".repeat(64)).is_ok());
        assert!(matches!(
            Credentials::new("Greenhouse", "p".repeat(65)),
            Err(ConfigError::PasswordTooLong { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("Greenhouse", "hunter2").unwrap();
        let debug_str = format!("{:?}", creds);
        assert!(debug_str.contains("Greenhouse"));
        assert!(!debug_str.contains("hunter2"));
    }

    // ==================== Bssid Tests ====================

    #[test]
    fn test_bssid_display_and_parse() {
        let bssid = Bssid::new(AP);
        assert_eq!(bssid.to_string(), "a4:cf:12:00:be:ef");
        assert_eq!("A4-CF-12-00-BE-EF".parse::<Bssid>().unwrap(), bssid);
    }

    #[test]
    fn test_bssid_parse_rejects_garbage() {
        assert!("a4:cf:12:00:be".parse::<Bssid>().is_err());
        assert!("zz:cf:12:00:be:ef".parse::<Bssid>().is_err());
    }

    #[test]
    fn test_bssid_from_slice_length() {
        assert_eq!(
            Bssid::from_slice(&[1, 2, 3]),
            Err(ConfigError::BssidLength { len: 3 })
        );
    }

    // ==================== Storage Format Tests ====================

    #[test]
    fn test_bytes_keep_pinned_bssid() {
        let creds = Credentials::new("Greenhouse", "hunter2")
            .unwrap()
            .with_bssid(Bssid::new(AP));
        let bytes = creds.to_bytes();
        assert_eq!(*bytes.last().unwrap(), 0xef);
        assert_eq!(Credentials::from_bytes(&bytes).unwrap(), creds);
    }

    #[test]
    fn test_bytes_without_bssid_end_with_flag() {
        let creds = Credentials::new("Greenhouse", "hunter2").unwrap();
        let bytes = creds.to_bytes();
        assert_eq!(bytes.len(), 1 + 10 + 1 + 7 + 1);
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[test]
    fn test_from_bytes_rejects_corruption() {
        assert!(matches!(
            Credentials::from_bytes(&[]),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            Credentials::from_bytes(&[5, b'h', b'e', b'l', b'l']),
            Err(ConfigError::InvalidFormat(_))
        ));
        // BSSID flagged but missing
        assert!(matches!(
            Credentials::from_bytes(&[1, b'x', 0, 1, 0xaa]),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            Credentials::from_bytes(&[1, b'x', 0, 7]),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    // ==================== Announcement Decoding Tests ====================

    #[test]
    fn test_decode_strips_nul_padding() {
        let mut ssid = b"Greenhouse".to_vec();
        ssid.resize(32, 0);
        let mut password = b"hunter2".to_vec();
        password.resize(64, 0);

        let creds = RawAnnouncement::new(ssid, password).decode().unwrap();
        assert_eq!(creds.ssid(), "Greenhouse");
        assert_eq!(creds.password(), "hunter2");
    }

    #[test]
    fn test_decode_with_bssid() {
        let creds = RawAnnouncement::new("Greenhouse", "hunter2")
            .with_bssid(AP.to_vec())
            .decode()
            .unwrap();
        assert_eq!(creds.bssid(), Some(Bssid::new(AP)));
    }

    #[test]
    fn test_decode_rejects_short_bssid() {
        let result = RawAnnouncement::new("Greenhouse", "hunter2")
            .with_bssid(vec![1, 2, 3, 4, 5])
            .decode();
        assert_eq!(result, Err(ConfigError::BssidLength { len: 5 }));
    }

    #[test]
    fn test_decode_rejects_all_zero_ssid() {
        let result = RawAnnouncement::new(vec![0u8; 32], "hunter2").decode();
        assert_eq!(result, Err(ConfigError::SsidEmpty));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let result = RawAnnouncement::new(vec![0xff, 0xfe], "hunter2").decode();
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_decode_rejects_embedded_nul_and_oversize() {
        assert!(RawAnnouncement::new(b"Green\0house".to_vec(), "")
            .decode()
            .is_err());
        assert!(RawAnnouncement::new("a".repeat(33), "").decode().is_err());
        assert!(RawAnnouncement::new("Greenhouse", "p".repeat(65))
            .decode()
            .is_err());
    }
}
