use assert_into::AssertInto;
use static_assertions::const_assert;
use std::{mem, str::Utf8Error};
use thiserror::Error;
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::little_endian::U32,
};

pub const UF2_MAGIC_START0: u32 = 0x0A324655;
pub const UF2_MAGIC_START1: u32 = 0x9E5D5157;
pub const UF2_MAGIC_END: u32 = 0x0AB16F30;

pub const UF2_FLAG_FILE_CONTAINER: u32 = 0x00001000;

pub const UF2_BLOCK_SIZE: usize = 512;
pub const UF2_HEADER_SIZE: usize = 32;
pub const UF2_DATA_SIZE: usize = 476;

/// Payload bytes carried by every block but the last one of a file.
pub const UF2_PAYLOAD_SIZE: usize = 256;

/// Room left for the file name after a full payload.
pub const UF2_MAX_NAME_LEN: usize = UF2_DATA_SIZE - UF2_PAYLOAD_SIZE;

/// One 512 byte block of a UF2 file container.
///
/// The `data` area holds `payload_size` bytes of file content directly
/// followed by the UTF-8 name of the file the block belongs to. The name is
/// NUL terminated unless it runs up to the end magic.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct Uf2Block {
    // 32 byte header
    pub magic_start0: U32,
    pub magic_start1: U32,
    pub flags: U32,
    /// Byte offset of the payload within its file
    pub target_offset: U32,
    pub payload_size: U32,
    /// Number of blocks of the file this block belongs to
    pub block_count: U32,
    pub reserved: U32,
    pub file_size: U32,
    pub data: [u8; UF2_DATA_SIZE],
    pub magic_end: U32,
}

const_assert!(mem::size_of::<Uf2Block>() == UF2_BLOCK_SIZE);
const_assert!(mem::size_of::<Uf2Block>() == UF2_HEADER_SIZE + UF2_DATA_SIZE + 4);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Block is {0} bytes long instead of 512")]
    WrongBlockSize(usize),
    #[error("Container ends with a partial block of {0} bytes")]
    TruncatedBlock(usize),
    #[error("Bad start magic {0:#010x} {1:#010x}")]
    BadStartMagic(u32, u32),
    #[error("Bad end magic {0:#010x}")]
    BadEndMagic(u32),
    #[error("Flags {0:#010x} do not describe a file container block")]
    NotFileContainer(u32),
    #[error("Payload size {0} does not fit in the 476 byte data area")]
    PayloadTooLarge(u32),
    #[error("File name is not valid UTF-8")]
    NameNotUtf8(#[source] Utf8Error),
}

impl Uf2Block {
    /// Builds the `block_index`th block of the file `name`.
    ///
    /// The name is not checked beyond its length, see
    /// [`validate_name`](crate::pack::validate_name).
    ///
    /// # Panics
    ///
    /// Panics if `payload` is longer than [`UF2_PAYLOAD_SIZE`] bytes, if `name`
    /// is longer than [`UF2_MAX_NAME_LEN`] bytes, or if the payload offset does
    /// not fit in 32 bits.
    pub fn file_container(
        block_index: usize,
        payload: &[u8],
        block_count: u32,
        file_size: u32,
        name: &str,
    ) -> Self {
        assert!(payload.len() <= UF2_PAYLOAD_SIZE);
        assert!(name.len() <= UF2_MAX_NAME_LEN);

        let mut block = Self::new_zeroed();

        block.magic_start0 = U32::new(UF2_MAGIC_START0);
        block.magic_start1 = U32::new(UF2_MAGIC_START1);
        block.flags = U32::new(UF2_FLAG_FILE_CONTAINER);
        block.target_offset = U32::new((block_index * UF2_PAYLOAD_SIZE).assert_into());
        block.payload_size = U32::new(payload.len().assert_into());
        block.block_count = U32::new(block_count);
        block.file_size = U32::new(file_size);

        let (content, tail) = block.data.split_at_mut(payload.len());
        content.copy_from_slice(payload);
        tail[..name.len()].copy_from_slice(name.as_bytes());

        block.magic_end = U32::new(UF2_MAGIC_END);

        block
    }

    /// Views `bytes` as a block and checks that it is a well formed file
    /// container block.
    pub fn parse(bytes: &[u8]) -> Result<&Self, FormatError> {
        let block =
            Self::ref_from_bytes(bytes).map_err(|_| FormatError::WrongBlockSize(bytes.len()))?;
        block.validate()?;
        Ok(block)
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        let (start0, start1) = (self.magic_start0.get(), self.magic_start1.get());
        if start0 != UF2_MAGIC_START0 || start1 != UF2_MAGIC_START1 {
            return Err(FormatError::BadStartMagic(start0, start1));
        }

        if self.magic_end.get() != UF2_MAGIC_END {
            return Err(FormatError::BadEndMagic(self.magic_end.get()));
        }

        if self.flags.get() != UF2_FLAG_FILE_CONTAINER {
            return Err(FormatError::NotFileContainer(self.flags.get()));
        }

        if self.payload_len() > UF2_DATA_SIZE {
            return Err(FormatError::PayloadTooLarge(self.payload_size.get()));
        }

        Ok(())
    }

    fn payload_len(&self) -> usize {
        self.payload_size.get() as usize
    }

    /// The valid content bytes of this block. Only meaningful on a validated block.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.payload_len().min(UF2_DATA_SIZE)]
    }

    /// The name stored after the payload, up to the first NUL.
    pub fn name(&self) -> Result<&str, FormatError> {
        let area = &self.data[self.payload_len().min(UF2_DATA_SIZE)..];
        let end = area.iter().position(|&b| b == 0).unwrap_or(area.len());
        std::str::from_utf8(&area[..end]).map_err(FormatError::NameNotUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn layout_matches_wire_format() {
        let block = Uf2Block::file_container(2, &[0xaa; 88], 3, 600, "dir/a.bin");
        let bytes = block.as_bytes();

        assert_eq!(bytes.len(), UF2_BLOCK_SIZE);
        assert_eq!(word(bytes, 0), UF2_MAGIC_START0);
        assert_eq!(word(bytes, 4), UF2_MAGIC_START1);
        assert_eq!(word(bytes, 8), UF2_FLAG_FILE_CONTAINER);
        assert_eq!(word(bytes, 12), 512);
        assert_eq!(word(bytes, 16), 88);
        assert_eq!(word(bytes, 20), 3);
        assert_eq!(word(bytes, 24), 0);
        assert_eq!(word(bytes, 28), 600);
        assert_eq!(word(bytes, 508), UF2_MAGIC_END);

        assert!(bytes[32..120].iter().all(|&b| b == 0xaa));
        assert_eq!(&bytes[120..129], b"dir/a.bin");
        assert!(bytes[129..508].iter().all(|&b| b == 0));
    }

    #[test]
    fn full_block_name_window() {
        let block = Uf2Block::file_container(0, &[1; UF2_PAYLOAD_SIZE], 1, 256, "a.txt");
        let bytes = block.as_bytes();

        assert_eq!(&bytes[288..293], b"a.txt");
        assert_eq!(bytes[293], 0);
    }

    #[test]
    fn parse_reads_fields_back() {
        let block = Uf2Block::file_container(1, b"hello", 2, 261, "b.txt");
        let parsed = Uf2Block::parse(block.as_bytes()).unwrap();

        assert_eq!(parsed.payload(), b"hello");
        assert_eq!(parsed.name().unwrap(), "b.txt");
        assert_eq!(parsed.target_offset.get(), 256);
        assert_eq!(parsed.block_count.get(), 2);
        assert_eq!(parsed.file_size.get(), 261);
    }

    #[test]
    fn name_filling_whole_window() {
        let name = "n".repeat(UF2_MAX_NAME_LEN);
        let block = Uf2Block::file_container(0, &[7; UF2_PAYLOAD_SIZE], 1, 256, &name);
        let parsed = Uf2Block::parse(block.as_bytes()).unwrap();

        assert_eq!(parsed.name().unwrap(), name);
        assert_eq!(parsed.magic_end.get(), UF2_MAGIC_END);
    }

    #[test]
    #[should_panic]
    fn oversized_name_panics() {
        Uf2Block::file_container(0, b"x", 1, 1, &"n".repeat(UF2_MAX_NAME_LEN + 1));
    }

    #[test]
    #[should_panic]
    fn oversized_payload_panics() {
        Uf2Block::file_container(0, &[0; UF2_PAYLOAD_SIZE + 1], 1, 257, "x");
    }

    #[test]
    fn rejects_wrong_size() {
        let block = Uf2Block::file_container(0, b"x", 1, 1, "x");
        let bytes = block.as_bytes();

        assert_eq!(
            Uf2Block::parse(&bytes[..511]).err(),
            Some(FormatError::WrongBlockSize(511))
        );
    }

    #[test]
    fn rejects_any_corrupted_magic_or_flags_byte() {
        let block = Uf2Block::file_container(0, b"data", 1, 4, "f");
        let original = block.as_bytes().to_vec();

        for offset in (0..12).chain(508..512) {
            let mut bytes = original.clone();
            bytes[offset] ^= 0xff;
            assert!(
                Uf2Block::parse(&bytes).is_err(),
                "corrupting byte {offset} was not detected"
            );
        }
    }

    #[test]
    fn rejects_other_flags() {
        let mut block = Uf2Block::file_container(0, b"data", 1, 4, "f");
        block.flags = U32::new(0x00002000);

        assert_eq!(
            Uf2Block::parse(block.as_bytes()).err(),
            Some(FormatError::NotFileContainer(0x00002000))
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut block = Uf2Block::file_container(0, b"data", 1, 4, "f");
        block.payload_size = U32::new(477);

        assert_eq!(
            Uf2Block::parse(block.as_bytes()).err(),
            Some(FormatError::PayloadTooLarge(477))
        );
    }

    #[test]
    fn rejects_invalid_utf8_name() {
        let mut block = Uf2Block::file_container(0, b"data", 1, 4, "f");
        block.data[4] = 0xff;

        let parsed = Uf2Block::parse(block.as_bytes()).unwrap();
        assert!(matches!(parsed.name(), Err(FormatError::NameNotUtf8(_))));
    }
}
