//! Backend library of files2uf2.
//!
//! Packs any number of named files into a single UF2 stream using the
//! "file container" flag, and unpacks such a stream back into files.
//! Every file is split into 256 byte payloads, each carried by one 512 byte
//! block that also records the file name, the payload offset within the
//! file, the number of blocks of the file and its total size.

use std::io;
use thiserror::Error;

pub mod chunk;
pub mod pack;
pub mod uf2;
pub mod unpack;

pub use pack::{ContainerWriter, PackEntry, pack, pack_into, validate_name};
pub use uf2::{FormatError, UF2_MAX_NAME_LEN};
pub use unpack::{
    BlockReader, Grouping, LogicalFile, check_container_len, relative_output_path, unpack,
    unpack_from,
};

#[derive(Error, Debug)]
pub enum Uf2Error {
    #[error("Failed to read input")]
    FailedToRead(#[source] io::Error),
    #[error("Failed to write to output")]
    FailedToWrite(#[source] io::Error),
    #[error("Block {block} is not a valid UF2 file container block")]
    InvalidFormat {
        block: usize,
        #[source]
        source: FormatError,
    },
    #[error("Name {0:?} is {1} bytes long, at most 220 bytes fit in a block")]
    NameTooLong(String, usize),
    #[error("Name {0:?} is empty or contains a NUL byte")]
    InvalidName(String),
    #[error("File {0:?} is {1} bytes long, more than a container can describe")]
    FileTooLarge(String, usize),
    #[error("Name {0:?} does not map to a path inside the destination")]
    UnsafePath(String),
}
