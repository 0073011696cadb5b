use clap::{Parser, ValueEnum};
use env_logger::Env;
use files2uf2_core::Grouping;
use log::*;

use std::{io::Write, path::PathBuf};

use crate::{
    pack::{SourceEntry, pack},
    unpack::{list, unpack},
};

mod pack;
mod reporter;
mod unpack;

#[derive(Parser, Debug)]
enum Command {
    /// Pack files into a UF2 file container
    ///
    /// Example: files2uf2 pack build/file.uf2 build/file.elf=Projects/file.elf build/file.rbf=Projects/file.rbf
    #[command(arg_required_else_help = true)]
    Pack {
        /// Output UF2 file
        output: PathBuf,

        /// Files to pack, as SOURCE or SOURCE=NAME_IN_CONTAINER
        #[clap(required = true, value_parser = SourceEntry::parse)]
        files: Vec<SourceEntry>,
    },
    /// Extract the files of a UF2 file container into a folder
    #[command(arg_required_else_help = true)]
    Unpack {
        /// Input UF2 file
        input: PathBuf,

        /// Destination folder, created if missing
        destination: PathBuf,

        /// How blocks are grouped into files
        #[clap(short, long, value_enum, default_value_t = GroupBy::Adjacent)]
        group: GroupBy,
    },
    /// List the files of a UF2 file container
    #[command(arg_required_else_help = true)]
    List {
        /// Input UF2 file
        input: PathBuf,

        /// How blocks are grouped into files
        #[clap(short, long, value_enum, default_value_t = GroupBy::Adjacent)]
        group: GroupBy,
    },
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum GroupBy {
    /// Consecutive blocks with the same name make up a file
    #[default]
    Adjacent,
    /// All blocks with the same name make up a file
    ByName,
}

impl From<GroupBy> for Grouping {
    fn from(group: GroupBy) -> Self {
        match group {
            GroupBy::Adjacent => Grouping::Adjacent,
            GroupBy::ByName => Grouping::ByName,
        }
    }
}

#[derive(Parser, Debug, Default)]
#[clap(version, about, long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Set the logging verbosity
    #[clap(short, long, value_enum, global = true, default_value_t = LogLevel::Info)]
    verbose: LogLevel,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default())
        .filter_level(cli.verbose.into())
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            let level = record.level();
            if level == Level::Info {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(buf, "{}: {}", record.level(), record.args())
            }
        })
        .init();

    let command = match cli.command {
        Some(command) => command,
        None => return Ok(()),
    };

    match command {
        Command::Pack { output, files } => pack(&files, &output),
        Command::Unpack {
            input,
            destination,
            group,
        } => unpack(&input, &destination, group.into()),
        Command::List { input, group } => list(&input, group.into()),
    }
}
