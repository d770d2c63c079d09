//! UUIDs and the UUID name table

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Universally Unique Identifier
///
/// A UUID in Bluetooth has some differences from the UUID of
/// [RFC 4122](https://datatracker.ietf.org/doc/html/rfc4122). To reduce the load of having to
/// transfer 128-bits for commonly used identifiers, the specification has mapped two ranges for
/// shortened UUIDs. A shortened UUID can always be converted into a full sized UUID.
///
/// ```
/// use btled::Uuid;
///
/// let heart_rate = Uuid::from_u16(0x2a37);
///
/// assert!(heart_rate.can_be_16_bit());
/// assert_eq!(Ok(heart_rate), Uuid::try_from("00002a37-0000-1000-8000-00805f9b34fb"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Uuid {
    base_uuid: u128,
}

impl Uuid {
    /// See Vol 3 part B sec 2.5.1 for where this value comes from.
    const BLUETOOTH_BASE_UUID: u128 = 0x0000000000001000800000805F9B34FB;

    pub const fn from_u32(v: u32) -> Self {
        Uuid {
            base_uuid: ((v as u128) << 96) | Self::BLUETOOTH_BASE_UUID,
        }
    }

    pub const fn from_u16(v: u16) -> Self {
        Uuid {
            base_uuid: ((v as u128) << 96) | Self::BLUETOOTH_BASE_UUID,
        }
    }

    pub const fn from_u128(v: u128) -> Self {
        Uuid { base_uuid: v }
    }

    /// Returns true if the UUID can be a 16 bit shortened UUID
    pub fn can_be_16_bit(&self) -> bool {
        !((!0u16 as u128) << 96) & self.base_uuid == Uuid::BLUETOOTH_BASE_UUID
    }

    /// Returns true if the UUID can be a 32 bit shortened UUID
    pub fn can_be_32_bit(&self) -> bool {
        !(((!0u32) as u128) << 96) & self.base_uuid == Uuid::BLUETOOTH_BASE_UUID
    }
}

impl std::fmt::Debug for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Formats the UUID in the same form as the daemon's discovery events
impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let v = self.base_uuid;

        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl From<u128> for Uuid {
    fn from(v: u128) -> Uuid {
        Self::from_u128(v)
    }
}

impl From<u16> for Uuid {
    fn from(v: u16) -> Uuid {
        Self::from_u16(v)
    }
}

impl From<Uuid> for u128 {
    fn from(uuid: Uuid) -> u128 {
        uuid.base_uuid
    }
}

impl TryFrom<Uuid> for u16 {
    type Error = ();

    fn try_from(uuid: Uuid) -> Result<u16, ()> {
        if uuid.can_be_16_bit() {
            Ok((uuid.base_uuid >> 96) as u16)
        } else {
            Err(())
        }
    }
}

#[cfg(feature = "uuid-crate")]
impl From<::uuid::Uuid> for Uuid {
    fn from(uuid: ::uuid::Uuid) -> Uuid {
        <u128>::from_be_bytes(*uuid.as_bytes()).into()
    }
}

#[cfg(feature = "uuid-crate")]
impl From<Uuid> for ::uuid::Uuid {
    fn from(uuid: Uuid) -> ::uuid::Uuid {
        ::uuid::Uuid::from_bytes(uuid.base_uuid.to_be_bytes())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UuidFormatError<'a> {
    IncorrectFieldLength(&'a str),
    IncorrectLength,
    IncorrectDigit(&'a str, &'a str),
}

impl<'a> std::fmt::Display for UuidFormatError<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            UuidFormatError::IncorrectFieldLength(field) => {
                write!(f, "Field with '{}' has an incorrect number of characters", field)
            }
            UuidFormatError::IncorrectLength => write!(f, "Incorrect Length"),
            UuidFormatError::IncorrectDigit(digits, field) => {
                write!(f, "Digits '{}' in field '{}' are not hexadecimal", digits, field)
            }
        }
    }
}

/// Create a UUID from its formatted type
///
/// The format is either a 16 octet UUID in the form of \[8\]-\[4\]-\[4\]-\[4\]-\[12\] or a shortened
/// 16 bit UUID written as `0x` followed by four hexadecimal digits.
impl<'a> TryFrom<&'a str> for Uuid {
    type Error = UuidFormatError<'a>;

    fn try_from(v: &'a str) -> Result<Self, Self::Error> {
        if let Some(short) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
            if short.len() != 4 {
                return Err(UuidFormatError::IncorrectFieldLength(short));
            }

            return <u16>::from_str_radix(short, 16)
                .map(Uuid::from_u16)
                .or(Err(UuidFormatError::IncorrectDigit(short, v)));
        }

        let field_lengths = [8, 4, 4, 4, 12];

        let mut fields = v.split('-');

        let mut value = 0u128;

        for len in field_lengths {
            let field = fields.next().ok_or(UuidFormatError::IncorrectLength)?;

            if field.len() != len {
                return Err(UuidFormatError::IncorrectFieldLength(field));
            }

            let digits = <u64>::from_str_radix(field, 16).or(Err(UuidFormatError::IncorrectDigit(field, v)))?;

            value = (value << (len * 4)) | digits as u128;
        }

        if fields.next().is_some() {
            return Err(UuidFormatError::IncorrectLength);
        }

        Ok(Uuid::from_u128(value))
    }
}

#[derive(Deserialize)]
struct UuidNamesFile {
    uuid128: Vec<UuidNameEntry>,
}

#[derive(Deserialize)]
struct UuidNameEntry {
    uuid: String,
    #[serde(rename = "str")]
    name: String,
}

/// Table of human readable UUID names
///
/// The table is loaded once from the generated JSON file and then shared by reference with
/// whatever needs name resolution. The file has the form
/// `{ "uuid128": [ { "uuid": "<128 bit uuid>", "str": "<name>" }, .. ] }`.
///
/// ```
/// let names = btled::UuidNames::from_json(
///     r#"{ "uuid128": [ { "uuid": "00002a37-0000-1000-8000-00805f9b34fb", "str": "Heart Rate Measurement" } ] }"#,
/// )
/// .unwrap();
///
/// assert_eq!(Some("Heart Rate Measurement"), names.name_of("0x2A37"));
/// assert_eq!("00002a37-0000-1000-8000-00805f9b34fb", names.resolve("Heart Rate Measurement"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct UuidNames {
    by_uuid: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl UuidNames {
    /// Load the table from JSON text
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let file: UuidNamesFile = serde_json::from_str(json)?;

        Ok(Self::from_entries(file))
    }

    /// Load the table from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path).map_err(serde_json::Error::io)?;

        let reader = std::io::BufReader::new(file);

        let file: UuidNamesFile = serde_json::from_reader(reader)?;

        Ok(Self::from_entries(file))
    }

    fn from_entries(file: UuidNamesFile) -> Self {
        let mut names = UuidNames::default();

        for entry in file.uuid128 {
            let uuid = entry.uuid.to_ascii_lowercase();

            names.by_name.entry(entry.name.clone()).or_insert_with(|| uuid.clone());

            names.by_uuid.entry(uuid).or_insert(entry.name);
        }

        log::debug!("loaded {} uuid names", names.by_uuid.len());

        names
    }

    /// Get the human readable name of a UUID
    ///
    /// Input `uuid` can be a full 128 bit UUID or a 16 bit UUID in `0x` form.
    pub fn name_of(&self, uuid: &str) -> Option<&str> {
        self.by_uuid.get(&normalize_uuid(uuid)).map(|name| name.as_str())
    }

    /// Get the 128 bit UUID with the given name
    pub fn uuid_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(|uuid| uuid.as_str())
    }

    /// Resolve a name or UUID into the textual form used by the attribute database
    ///
    /// A known name is replaced by its UUID, a parseable UUID is normalized, and anything else is
    /// returned lower cased. Lookups in the attribute database match the result as a prefix.
    pub fn resolve(&self, name_or_uuid: &str) -> String {
        if let Some(uuid) = self.uuid_of(name_or_uuid) {
            return uuid.to_string();
        }

        normalize_uuid(name_or_uuid)
    }
}

/// Normalize a textual UUID without a name table
pub(crate) fn normalize_uuid(uuid: &str) -> String {
    Uuid::try_from(uuid)
        .map(|uuid| uuid.to_string())
        .unwrap_or_else(|_| uuid.to_ascii_lowercase())
}
