use crate::{
    Uf2Error,
    chunk::chunks,
    uf2::{UF2_BLOCK_SIZE, UF2_MAX_NAME_LEN, UF2_PAYLOAD_SIZE, Uf2Block},
};
use assert_into::AssertInto;
use log::debug;
use std::io::Write;
use zerocopy::IntoBytes;

/// A file to be stored in a container under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    pub name: String,
    pub content: Vec<u8>,
}

impl PackEntry {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Checks that `name` can be embedded in a block.
pub fn validate_name(name: &str) -> Result<(), Uf2Error> {
    if name.is_empty() || name.contains('\0') {
        return Err(Uf2Error::InvalidName(name.to_owned()));
    }

    if name.len() > UF2_MAX_NAME_LEN {
        return Err(Uf2Error::NameTooLong(name.to_owned(), name.len()));
    }

    Ok(())
}

/// Number of blocks used to store a file of `len` bytes.
///
/// An empty file still takes one block so that it shows up when unpacking.
pub fn blocks_for_len(len: usize) -> usize {
    len.div_ceil(UF2_PAYLOAD_SIZE).max(1)
}

/// Size in bytes of the container holding `entries`.
pub fn container_len<'a>(entries: impl IntoIterator<Item = &'a PackEntry>) -> usize {
    entries
        .into_iter()
        .map(|entry| blocks_for_len(entry.content.len()) * UF2_BLOCK_SIZE)
        .sum()
}

/// Appends files to a UF2 file container one after the other.
pub struct ContainerWriter<W> {
    output: W,
    blocks_written: usize,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            blocks_written: 0,
        }
    }

    /// Writes every block of one file.
    pub fn write_file(&mut self, name: &str, content: &[u8]) -> Result<(), Uf2Error> {
        validate_name(name)?;

        let file_size = u32::try_from(content.len())
            .map_err(|_| Uf2Error::FileTooLarge(name.to_owned(), content.len()))?;
        let block_count = blocks_for_len(content.len());
        let mut payloads = chunks(content, UF2_PAYLOAD_SIZE);

        for block_index in 0..block_count {
            let payload = payloads.next().unwrap_or_default();
            let block = Uf2Block::file_container(
                block_index,
                payload,
                block_count.assert_into(),
                file_size,
                name,
            );

            debug!(
                "{} block {} / {} {:#08x}",
                name,
                block_index,
                block_count,
                block.target_offset.get()
            );

            self.output
                .write_all(block.as_bytes())
                .map_err(Uf2Error::FailedToWrite)?;
            self.blocks_written += 1;
        }

        Ok(())
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Flushes the output and hands it back.
    pub fn finish(mut self) -> Result<W, Uf2Error> {
        self.output.flush().map_err(Uf2Error::FailedToWrite)?;
        Ok(self.output)
    }
}

/// Writes `entries` as a container to `output`, in order.
///
/// All names are checked before the first block is written.
pub fn pack_into(entries: &[PackEntry], output: impl Write) -> Result<(), Uf2Error> {
    for entry in entries {
        validate_name(&entry.name)?;
    }

    let mut writer = ContainerWriter::new(output);
    for entry in entries {
        writer.write_file(&entry.name, &entry.content)?;
    }
    writer.finish()?;

    Ok(())
}

/// Packs `entries` into an in-memory container.
pub fn pack(entries: &[PackEntry]) -> Result<Vec<u8>, Uf2Error> {
    let mut output = Vec::with_capacity(container_len(entries));
    pack_into(entries, &mut output)?;
    Ok(output)
}
