//! System Description Table header parsing for AML-bearing tables.
//!
//! Checksums are the table collector's job; this module only rejects headers
//! that would make the AML body ill-defined (short buffers, wrong signature,
//! a length field that disagrees with the buffer).

use crate::HeaderError;
use crate::aml::value::IntegerWidth;
use crate::reader::BinaryReader;

/// Standard ACPI System Description Table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdtHeader {
    /// 4-byte ASCII signature identifying the table type.
    pub signature: [u8; 4],
    /// Total length of the table, including the header, in bytes.
    pub length: u32,
    /// Revision of the table structure. For DSDT/SSDT this selects the
    /// integer width.
    pub revision: u8,
    /// Checksum byte (not verified here).
    pub checksum: u8,
    /// OEM-supplied identification string.
    pub oem_id: [u8; 6],
    /// OEM-supplied table identification string.
    pub oem_table_id: [u8; 8],
    /// OEM-supplied revision number.
    pub oem_revision: u32,
    /// Vendor ID of the utility that created the table.
    pub creator_id: u32,
    /// Revision of the utility that created the table.
    pub creator_revision: u32,
}

impl SdtHeader {
    /// The size of an SDT header in bytes.
    pub const SIZE: usize = 36;

    /// Read an [`SdtHeader`] from the start of a byte slice.
    ///
    /// Returns `None` if the slice is shorter than [`SdtHeader::SIZE`] bytes.
    #[must_use]
    pub fn read_from_bytes(data: &[u8]) -> Option<Self> {
        let mut r = BinaryReader::new(data);
        let signature = r.read_bytes(4)?.try_into().ok()?;
        let length = r.read_u32()?;
        let revision = r.read_u8()?;
        let checksum = r.read_u8()?;
        let oem_id = r.read_bytes(6)?.try_into().ok()?;
        let oem_table_id = r.read_bytes(8)?.try_into().ok()?;
        Some(Self {
            signature,
            length,
            revision,
            checksum,
            oem_id,
            oem_table_id,
            oem_revision: r.read_u32()?,
            creator_id: r.read_u32()?,
            creator_revision: r.read_u32()?,
        })
    }

    /// The signature as text, or `"????"` if it is not ASCII.
    #[must_use]
    pub fn signature_str(&self) -> &str {
        core::str::from_utf8(&self.signature).unwrap_or("????")
    }

    /// The OEM table id as text with trailing padding removed.
    #[must_use]
    pub fn oem_table_id_str(&self) -> &str {
        core::str::from_utf8(&self.oem_table_id)
            .unwrap_or("")
            .trim_end_matches(['\0', ' '])
    }
}

/// A DSDT, SSDT or PSDT whose header has been validated.
#[derive(Debug, Clone, Copy)]
pub struct AmlTable<'a> {
    /// The parsed header.
    pub header: SdtHeader,
    /// The table bytes up to `header.length`, header included.
    pub data: &'a [u8],
}

impl<'a> AmlTable<'a> {
    /// Signatures whose body is a TermList.
    pub const SIGNATURES: [&'static [u8; 4]; 3] = [b"DSDT", b"SSDT", b"PSDT"];

    /// Validate the header of `data`.
    ///
    /// Bytes beyond the header's length field are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`HeaderError`] if the buffer is too short, the signature is
    /// not an AML table, or the length field is inconsistent.
    pub fn parse(data: &'a [u8]) -> Result<Self, HeaderError> {
        let header = SdtHeader::read_from_bytes(data).ok_or(HeaderError::TooShort)?;
        if !Self::SIGNATURES.contains(&&header.signature) {
            return Err(HeaderError::BadSignature(header.signature));
        }
        let declared = header.length as usize;
        if declared < SdtHeader::SIZE || declared > data.len() {
            return Err(HeaderError::BadLength {
                declared: header.length,
                available: data.len(),
            });
        }
        Ok(Self {
            header,
            data: &data[..declared],
        })
    }

    /// Integer width selected by the table revision: revision 1 (and the
    /// invalid revision 0) use 32-bit integers.
    #[must_use]
    pub fn integer_width(&self) -> IntegerWidth {
        if self.header.revision < 2 {
            IntegerWidth::Bits32
        } else {
            IntegerWidth::Bits64
        }
    }

    /// Absolute offset of the first AML byte.
    #[must_use]
    pub fn body_start(&self) -> usize {
        SdtHeader::SIZE
    }
}
