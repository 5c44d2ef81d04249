//! The LZMA properties header.
//!
//! A standalone `.lzma` stream starts with 13 bytes:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 1 | `(pb * 5 + lp) * 9 + lc` |
//! | 1 | 4 | dictionary size, little-endian |
//! | 5 | 8 | uncompressed size, little-endian, all `0xFF` when unknown |
//!
//! A size field of all `0x00` or all `0xFF` means the size is unknown and the
//! payload ends with an end marker.
//!
//! Inside a 7z folder only the first five bytes are stored, as the coder
//! properties; the size comes from the folder record.

use crate::model::{DICT_SIZE_MIN, LzmaProperties};
use oxiseven_core::error::{OxiSevenError, Result};

/// Size of the coder properties (props byte and dictionary size).
pub const PROPS_SIZE: usize = 5;

/// Size of the full `.lzma` header.
pub const HEADER_SIZE: usize = PROPS_SIZE + 8;

/// Size field value written for "unknown, ends with an end marker".
const UNKNOWN_SIZE: u64 = u64::MAX;

/// The other size field value read as unknown.
const UNKNOWN_SIZE_ZERO: u64 = 0;

/// Parsed stream properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaHeader {
    /// Literal and position bits.
    pub props: LzmaProperties,
    /// Dictionary size as written.
    pub dict_size: u32,
    /// Declared uncompressed size, if known.
    pub uncompressed_size: Option<u64>,
}

impl LzmaHeader {
    /// Create a header.
    pub fn new(props: LzmaProperties, dict_size: u32, uncompressed_size: Option<u64>) -> Self {
        Self {
            props,
            dict_size,
            uncompressed_size,
        }
    }

    /// Parse the five coder property bytes.
    pub fn parse_props(bytes: &[u8; PROPS_SIZE]) -> Result<(LzmaProperties, u32)> {
        let props = LzmaProperties::from_byte(bytes[0]).ok_or_else(|| {
            OxiSevenError::invalid_header(format!("invalid properties byte 0x{:02X}", bytes[0]))
        })?;
        let dict_size = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if dict_size < DICT_SIZE_MIN {
            return Err(OxiSevenError::invalid_header(format!(
                "dictionary size {dict_size} is below the minimum of {DICT_SIZE_MIN}"
            )));
        }
        Ok((props, dict_size))
    }

    /// Header for a 7z folder: coder properties plus the size from the
    /// folder record.
    pub fn from_folder(props: [u8; PROPS_SIZE], uncompressed_size: Option<u64>) -> Result<Self> {
        let (props, dict_size) = Self::parse_props(&props)?;
        Ok(Self::new(props, dict_size, uncompressed_size))
    }

    /// Parse a full 13-byte header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(OxiSevenError::truncated(HEADER_SIZE - bytes.len()));
        }
        let mut props = [0u8; PROPS_SIZE];
        props.copy_from_slice(&bytes[..PROPS_SIZE]);
        let (props, dict_size) = Self::parse_props(&props)?;

        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[PROPS_SIZE..HEADER_SIZE]);
        let size = u64::from_le_bytes(size);
        let uncompressed_size =
            (size != UNKNOWN_SIZE && size != UNKNOWN_SIZE_ZERO).then_some(size);

        Ok(Self::new(props, dict_size, uncompressed_size))
    }

    /// The five coder property bytes.
    pub fn props_bytes(&self) -> [u8; PROPS_SIZE] {
        let dict = self.dict_size.to_le_bytes();
        [self.props.to_byte(), dict[0], dict[1], dict[2], dict[3]]
    }

    /// Serialize the full header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..PROPS_SIZE].copy_from_slice(&self.props_bytes());
        let size = self.uncompressed_size.unwrap_or(UNKNOWN_SIZE);
        bytes[PROPS_SIZE..].copy_from_slice(&size.to_le_bytes());
        bytes
    }

    /// Size of the decoder's output window.
    ///
    /// A stream of known size never looks back further than its own length,
    /// so small streams get a small window.
    pub fn window_size(&self) -> usize {
        match self.uncompressed_size {
            Some(size) => {
                let needed = size.max(u64::from(DICT_SIZE_MIN));
                needed.min(u64::from(self.dict_size)) as usize
            }
            None => self.dict_size as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_HEADER: [u8; HEADER_SIZE] = [
        0x5D, 0x00, 0x00, 0x01, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_parse_known_size() {
        let header = LzmaHeader::parse(&HELLO_HEADER).unwrap();
        assert_eq!(header.props, LzmaProperties::new(3, 0, 2));
        assert_eq!(header.dict_size, 1 << 16);
        assert_eq!(header.uncompressed_size, Some(11));
        assert_eq!(header.to_bytes(), HELLO_HEADER);
    }

    #[test]
    fn test_all_ones_size_is_unknown() {
        let mut bytes = HELLO_HEADER;
        bytes[5..].fill(0xFF);
        let header = LzmaHeader::parse(&bytes).unwrap();
        assert_eq!(header.uncompressed_size, None);
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn test_all_zero_size_is_unknown() {
        let mut bytes = HELLO_HEADER;
        bytes[5..].fill(0);
        let header = LzmaHeader::parse(&bytes).unwrap();
        assert_eq!(header.uncompressed_size, None);
        assert_eq!(header.window_size(), 1 << 16);
    }

    #[test]
    fn test_rejects_bad_props_and_small_dict() {
        let mut bytes = HELLO_HEADER;
        bytes[0] = 225;
        assert!(matches!(
            LzmaHeader::parse(&bytes),
            Err(OxiSevenError::InvalidHeader { .. })
        ));

        let mut bytes = HELLO_HEADER;
        bytes[1..5].copy_from_slice(&4095u32.to_le_bytes());
        assert!(matches!(
            LzmaHeader::parse(&bytes),
            Err(OxiSevenError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_short_header_is_truncated() {
        assert!(matches!(
            LzmaHeader::parse(&HELLO_HEADER[..7]),
            Err(OxiSevenError::TruncatedInput { needed: 6 })
        ));
    }

    #[test]
    fn test_folder_props() {
        let header = LzmaHeader::from_folder([0x5D, 0, 0, 0x10, 0], Some(5)).unwrap();
        assert_eq!(header.dict_size, 1 << 20);
        assert_eq!(header.props_bytes(), [0x5D, 0, 0, 0x10, 0]);
        assert_eq!(header.window_size(), DICT_SIZE_MIN as usize);
    }

    #[test]
    fn test_window_size_caps_at_dictionary() {
        let header = LzmaHeader::new(LzmaProperties::default(), 1 << 16, Some(1 << 30));
        assert_eq!(header.window_size(), 1 << 16);
        let header = LzmaHeader::new(LzmaProperties::default(), 1 << 16, None);
        assert_eq!(header.window_size(), 1 << 16);
    }
}
