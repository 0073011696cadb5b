use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};

use files2uf2_core::{
    Grouping, LogicalFile, Uf2Error, check_container_len, relative_output_path, unpack_from,
};
use log::{LevelFilter, debug, info};

use crate::reporter::ProgressBarReporter;

pub fn unpack<P1: AsRef<Path>, P2: AsRef<Path>>(
    input_path: &P1,
    destination: &P2,
    grouping: Grouping,
) -> Result<(), Box<dyn std::error::Error>> {
    let show_progress = log::max_level() >= LevelFilter::Info;
    unpack_with_progress(
        input_path.as_ref(),
        destination.as_ref(),
        grouping,
        show_progress,
    )
}

fn unpack_with_progress(
    input_path: &Path,
    destination: &Path,
    grouping: Grouping,
    show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (input, len) = open_container(input_path)?;

    fs::create_dir_all(destination)?;

    let sink = |file: LogicalFile| write_file(destination, &file);

    let count = if show_progress {
        info!("Extracting {}", input_path.display());
        let mut reporter = ProgressBarReporter::new(len, input);
        let result = unpack_from(&mut reporter, grouping, sink);
        reporter.finish();
        println!();
        result?
    } else {
        unpack_from(input, grouping, sink)?
    };

    info!(
        "UF2 file successfully extracted, {} files written to {}",
        count,
        destination.display()
    );

    Ok(())
}

/// Prints the files stored in a container without writing them out.
pub fn list<P: AsRef<Path>>(
    input_path: &P,
    grouping: Grouping,
) -> Result<(), Box<dyn std::error::Error>> {
    let (input, _) = open_container(input_path.as_ref())?;

    println!("{:>10}  {:>6}  name", "bytes", "blocks");
    let count = unpack_from(input, grouping, |file| {
        println!("{:>10}  {:>6}  {}", file.content.len(), file.blocks, file.name);
        Ok(())
    })?;

    info!("{} files", count);

    Ok(())
}

fn open_container(path: &Path) -> Result<(BufReader<File>, u64), Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    check_container_len(len)?;

    Ok((BufReader::new(file), len))
}

fn write_file(destination: &Path, file: &LogicalFile) -> Result<(), Uf2Error> {
    let path = destination.join(relative_output_path(&file.name)?);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(Uf2Error::FailedToWrite)?;
    }

    fs::write(&path, &file.content).map_err(Uf2Error::FailedToWrite)?;

    debug!("Wrote {} ({} bytes)", path.display(), file.content.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use files2uf2_core::{PackEntry, pack};

    #[test]
    fn writes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("file.uf2");
        fs::write(
            &container,
            pack(&[
                PackEntry::new("Projects/file.elf", vec![1; 600]),
                PackEntry::new("Projects/empty", Vec::new()),
                PackEntry::new("top.txt", b"top".to_vec()),
            ])
            .unwrap(),
        )
        .unwrap();

        for show_progress in [false, true] {
            let destination = dir.path().join(format!("unpacked-{show_progress}"));
            unpack_with_progress(&container, &destination, Grouping::Adjacent, show_progress)
                .unwrap();

            let projects = destination.join("Projects");
            assert_eq!(fs::read(projects.join("file.elf")).unwrap(), vec![1; 600]);
            assert!(fs::read(projects.join("empty")).unwrap().is_empty());
            assert_eq!(fs::read(destination.join("top.txt")).unwrap(), b"top");
        }
    }

    #[test]
    fn by_name_grouping_merges_split_runs() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("split.uf2");
        let a = pack(&[PackEntry::new("a", vec![1; 300])]).unwrap();
        let b = pack(&[PackEntry::new("b", b"bee".to_vec())]).unwrap();
        fs::write(&container, [&a[..512], &b[..], &a[512..]].concat()).unwrap();

        let destination = dir.path().join("unpacked");
        unpack_with_progress(&container, &destination, Grouping::ByName, true).unwrap();

        assert_eq!(fs::read(destination.join("a")).unwrap(), vec![1; 300]);
        assert_eq!(fs::read(destination.join("b")).unwrap(), b"bee");
    }

    #[test]
    fn corrupt_block_fails_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("corrupt.uf2");
        let mut bytes = pack(&[PackEntry::new("a", b"a".to_vec())]).unwrap();
        bytes[0] ^= 0xff;
        fs::write(&container, bytes).unwrap();

        let destination = dir.path().join("unpacked");
        assert!(unpack_with_progress(&container, &destination, Grouping::Adjacent, true).is_err());
        assert!(!destination.join("a").exists());
    }

    #[test]
    fn refuses_names_outside_destination() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("evil.uf2");
        fs::write(
            &container,
            pack(&[PackEntry::new("../escaped", b"x".to_vec())]).unwrap(),
        )
        .unwrap();

        let destination = dir.path().join("unpacked");
        assert!(unpack_with_progress(&container, &destination, Grouping::Adjacent, true).is_err());
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn rejects_truncated_container_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("short.uf2");
        let mut bytes = pack(&[PackEntry::new("a", b"a".to_vec())]).unwrap();
        bytes.pop();
        fs::write(&container, bytes).unwrap();

        for show_progress in [false, true] {
            let destination = dir.path().join("unpacked");
            assert!(
                unpack_with_progress(&container, &destination, Grouping::Adjacent, show_progress)
                    .is_err()
            );
            assert!(!destination.exists());
        }
    }
}
