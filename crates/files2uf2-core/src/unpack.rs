use crate::{
    Uf2Error,
    uf2::{FormatError, UF2_BLOCK_SIZE, Uf2Block},
};
use log::{debug, warn};
use std::{
    collections::HashMap,
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

/// How blocks are gathered into files while unpacking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Grouping {
    /// Consecutive blocks with the same name form one file. A name that shows
    /// up again later starts a new file.
    #[default]
    Adjacent,
    /// All blocks with the same name form one file, in order of first
    /// appearance. Every file is kept in memory until the end of the container.
    ByName,
}

/// A file reassembled from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalFile {
    pub name: String,
    pub content: Vec<u8>,
    /// Number of blocks that made up this file
    pub blocks: usize,
    /// File size recorded in the first block
    pub declared_size: u32,
}

impl LogicalFile {
    fn start(block: DecodedBlock) -> Self {
        if block.target_offset != 0 {
            warn!(
                "{}: first block {} starts at offset {:#x}",
                block.name, block.index, block.target_offset
            );
        }

        Self {
            name: block.name,
            content: block.payload,
            blocks: 1,
            declared_size: block.file_size,
        }
    }

    fn append(&mut self, block: DecodedBlock) {
        if block.target_offset as usize != self.content.len() {
            warn!(
                "{}: block {} claims offset {:#x}, {:#x} bytes read so far",
                self.name,
                block.index,
                block.target_offset,
                self.content.len()
            );
        }

        self.content.extend_from_slice(&block.payload);
        self.blocks += 1;
    }

    fn check_size(&self) {
        if self.declared_size as usize != self.content.len() {
            warn!(
                "{}: recorded size is {} bytes, reassembled {} bytes",
                self.name,
                self.declared_size,
                self.content.len()
            );
        }
    }
}

/// The fields of one validated block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    /// Position of the block in the container
    pub index: usize,
    pub name: String,
    pub target_offset: u32,
    pub block_count: u32,
    pub file_size: u32,
    pub payload: Vec<u8>,
}

impl DecodedBlock {
    pub fn decode(index: usize, bytes: &[u8]) -> Result<Self, Uf2Error> {
        let invalid = |source| Uf2Error::InvalidFormat {
            block: index,
            source,
        };

        let block = Uf2Block::parse(bytes).map_err(invalid)?;
        let name = block.name().map_err(invalid)?;

        Ok(Self {
            index,
            name: name.to_owned(),
            target_offset: block.target_offset.get(),
            block_count: block.block_count.get(),
            file_size: block.file_size.get(),
            payload: block.payload().to_vec(),
        })
    }
}

/// Fails when `len` bytes cannot be split into whole blocks.
pub fn check_container_len(len: u64) -> Result<(), Uf2Error> {
    let block_size = UF2_BLOCK_SIZE as u64;
    let rest = len % block_size;
    if rest != 0 {
        return Err(Uf2Error::InvalidFormat {
            block: (len / block_size) as usize,
            source: FormatError::TruncatedBlock(rest as usize),
        });
    }

    Ok(())
}

/// Reads and validates blocks one at a time.
///
/// Iteration stops after the first error.
pub struct BlockReader<R> {
    input: R,
    index: usize,
    done: bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            index: 0,
            done: false,
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.input.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => (),
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<DecodedBlock, Uf2Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = [0; UF2_BLOCK_SIZE];
        let result = match self.fill(&mut buf) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(UF2_BLOCK_SIZE) => DecodedBlock::decode(self.index, &buf),
            Ok(partial) => Err(Uf2Error::InvalidFormat {
                block: self.index,
                source: FormatError::TruncatedBlock(partial),
            }),
            Err(e) => Err(Uf2Error::FailedToRead(e)),
        };

        self.index += 1;
        self.done = result.is_err();
        Some(result)
    }
}

/// Reads a container from `input` and hands every reassembled file to `sink`.
///
/// With [`Grouping::Adjacent`] only the file being reassembled is held in
/// memory. Returns the number of files handed out.
pub fn unpack_from(
    input: impl Read,
    grouping: Grouping,
    mut sink: impl FnMut(LogicalFile) -> Result<(), Uf2Error>,
) -> Result<usize, Uf2Error> {
    let mut emit = |file: LogicalFile| {
        file.check_size();
        debug!("{}: {} blocks, {} bytes", file.name, file.blocks, file.content.len());
        sink(file)
    };

    let mut count = 0;

    match grouping {
        Grouping::Adjacent => {
            let mut current: Option<LogicalFile> = None;

            for block in BlockReader::new(input) {
                let block = block?;

                if let Some(file) = current.as_mut().filter(|file| file.name == block.name) {
                    file.append(block);
                    continue;
                }

                if let Some(done) = current.replace(LogicalFile::start(block)) {
                    emit(done)?;
                    count += 1;
                }
            }

            if let Some(done) = current {
                emit(done)?;
                count += 1;
            }
        }
        Grouping::ByName => {
            let mut files: Vec<LogicalFile> = Vec::new();
            let mut positions: HashMap<String, usize> = HashMap::new();

            for block in BlockReader::new(input) {
                let block = block?;

                match positions.get(&block.name) {
                    Some(&position) => files[position].append(block),
                    None => {
                        positions.insert(block.name.clone(), files.len());
                        files.push(LogicalFile::start(block));
                    }
                }
            }

            for file in files {
                emit(file)?;
                count += 1;
            }
        }
    }

    Ok(count)
}

/// Unpacks an in-memory container.
pub fn unpack(container: &[u8], grouping: Grouping) -> Result<Vec<LogicalFile>, Uf2Error> {
    check_container_len(container.len() as u64)?;

    let mut files = Vec::new();
    unpack_from(container, grouping, |file| {
        files.push(file);
        Ok(())
    })?;

    Ok(files)
}

/// Turns a container name into a path relative to the destination directory.
///
/// Names that are absolute or climb out with `..` are refused.
pub fn relative_output_path(name: &str) -> Result<PathBuf, Uf2Error> {
    let mut path = PathBuf::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => (),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Uf2Error::UnsafePath(name.to_owned()));
            }
        }
    }

    if path.as_os_str().is_empty() {
        return Err(Uf2Error::UnsafePath(name.to_owned()));
    }

    Ok(path)
}
