use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use files2uf2_core::{
    ContainerWriter, Uf2Error, pack::blocks_for_len, uf2::UF2_BLOCK_SIZE, validate_name,
};
use log::{LevelFilter, debug, info};

use crate::reporter::ProgressBarReporter;

/// A file on disk and the name it gets inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub name: String,
}

impl SourceEntry {
    /// Parses `SOURCE` or `SOURCE=NAME`. Without a name the source's file name is used.
    pub fn parse(arg: &str) -> Result<Self, String> {
        let (path, name) = match arg.split_once('=') {
            Some((path, name)) => (PathBuf::from(path), name.to_string()),
            None => {
                let path = PathBuf::from(arg);
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| format!("Cannot derive a container name from '{}'", arg))?
                    .to_string();
                (path, name)
            }
        };

        validate_name(&name).map_err(|err| err.to_string())?;

        Ok(Self { path, name })
    }
}

pub fn pack<P: AsRef<Path>>(
    entries: &[SourceEntry],
    output_path: &P,
) -> Result<(), Box<dyn std::error::Error>> {
    let show_progress = log::max_level() >= LevelFilter::Info;
    pack_with_progress(entries, output_path.as_ref(), show_progress)
}

fn pack_with_progress(
    entries: &[SourceEntry],
    output_path: &Path,
    show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    for entry in entries {
        validate_name(&entry.name)?;
    }

    let len = container_len(entries)?;

    let result = {
        let output = BufWriter::new(File::create(output_path)?);

        if show_progress {
            info!("Packing {} files", entries.len());
            let mut reporter = ProgressBarReporter::new(len, output);
            let result = write_entries(entries, &mut reporter);
            reporter.finish();
            println!();
            result
        } else {
            write_entries(entries, output)
        }
    };

    if let Err(err) = result {
        fs::remove_file(output_path)?;
        return Err(err);
    }

    info!("UF2 file {} successfully created", output_path.display());

    Ok(())
}

/// Stats every source, so missing files are reported before the output is created.
fn container_len(entries: &[SourceEntry]) -> Result<u64, Box<dyn std::error::Error>> {
    let mut len = 0;
    for entry in entries {
        let size = fs::metadata(&entry.path)
            .map_err(|err| format!("Failed to read {}: {}", entry.path.display(), err))?
            .len();
        let size = checked_file_len(&entry.name, size)?;
        len += (blocks_for_len(size) * UF2_BLOCK_SIZE) as u64;
    }
    Ok(len)
}

fn checked_file_len(name: &str, len: u64) -> Result<usize, Uf2Error> {
    usize::try_from(len)
        .ok()
        .filter(|&len| u32::try_from(len).is_ok())
        .ok_or_else(|| {
            Uf2Error::FileTooLarge(name.to_owned(), usize::try_from(len).unwrap_or(usize::MAX))
        })
}

fn write_entries(
    entries: &[SourceEntry],
    output: impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = ContainerWriter::new(output);

    for entry in entries {
        let content = fs::read(&entry.path)
            .map_err(|err| format!("Failed to read {}: {}", entry.path.display(), err))?;

        debug!("{} -> {}", entry.path.display(), entry.name);

        writer.write_file(&entry.name, &content)?;
    }

    let blocks = writer.blocks_written();
    writer.finish()?;
    debug!("Wrote {} blocks", blocks);

    Ok(())
}
