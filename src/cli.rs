use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::extractor::ArchiveSource;
use crate::io::{DEFAULT_MAX_RETRY, DEFAULT_WINDOW};

#[derive(Parser, Debug)]
#[command(name = "tarix")]
#[command(version)]
#[command(about = "Random-access extraction from large tar archives using an offset index", long_about = None)]
#[command(after_help = "Examples:\n  \
  tarix index -tar data.tar                        write data.tar.index.json\n  \
  tarix extract -tar data.tar -index data.tar.index.json -file a/b.txt -output -\n  \
  tarix list -index data.tar.index.json")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-vv for debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress and status messages
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Retries per HTTP Range request on connection errors
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_RETRY, global = true)]
    pub retries: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a tar archive and write its offset index
    Index {
        /// TAR file (path or HTTP URL) to index
        #[arg(long, value_name = "PATH")]
        tar: String,

        /// Output index file (default: <tar>.index.json)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Read-ahead window in bytes used while scanning headers
        #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_WINDOW)]
        read_ahead: usize,
    },

    /// Extract one member using an index
    Extract {
        /// TAR file (path or HTTP URL) to extract from
        #[arg(long, value_name = "PATH")]
        tar: String,

        /// Index file for the TAR
        #[arg(long, value_name = "PATH")]
        index: PathBuf,

        /// File path to extract from the TAR
        #[arg(long, value_name = "PATH")]
        file: String,

        /// Output file (default: base name of the member, '-' for stdout)
        #[arg(long, value_name = "PATH")]
        output: Option<String>,
    },

    /// Show the entries of an index
    List {
        /// Index file to list
        #[arg(long, value_name = "PATH")]
        index: PathBuf,
    },

    /// Print a member to stdout, followed by a newline
    #[command(name = "printfrompath")]
    PrintFromPath {
        /// TAR file (path or HTTP URL) to extract from
        #[arg(long, value_name = "PATH")]
        tar: String,

        /// Index file for the TAR
        #[arg(long, value_name = "PATH")]
        index: PathBuf,

        /// File path to extract from the TAR
        #[arg(long, value_name = "PATH")]
        file: String,
    },
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

/// Long options that may also be spelled with a single dash (`-tar x`)
const SINGLE_DASH_LONG: &[&str] = &["tar", "index", "file", "output", "read-ahead", "retries"];

/// Rewrite `-tar`, `-index=x` and friends into their `--` form.
///
/// The first released version of the tool took Go-style flags, and
/// scripts still pass them that way.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-') else {
                return arg;
            };
            if rest.starts_with('-') {
                return arg;
            }
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if SINGLE_DASH_LONG.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}

/// Default index location for an archive: `<tar>.index.json`.
///
/// For a URL the index is written to the working directory, named after the
/// last path segment.
pub fn default_index_path(tar: &str) -> PathBuf {
    match ArchiveSource::parse(tar) {
        ArchiveSource::Local(path) => {
            let mut name = path.into_os_string();
            name.push(".index.json");
            PathBuf::from(name)
        }
        ArchiveSource::Http(url) => {
            let path = url.split(['?', '#']).next().unwrap_or(&url);
            let base = path
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or("archive.tar");
            PathBuf::from(format!("{base}.index.json"))
        }
    }
}

/// Default extraction target: the base name of the member path
pub fn default_output_path(member: &str) -> String {
    Path::new(member)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| member.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_single_dash_flags() {
        let normalized = normalize_args(args(&[
            "tarix", "extract", "-tar", "a.tar", "-index=a.idx", "-file", "x", "-output", "-", "-v",
        ]));
        assert_eq!(
            normalized,
            args(&[
                "tarix", "extract", "--tar", "a.tar", "--index=a.idx", "--file", "x", "--output",
                "-", "-v",
            ])
        );
    }

    #[test]
    fn test_parse_go_style_extract() {
        let cli = Cli::try_parse_from(normalize_args(args(&[
            "tarix", "extract", "-tar", "a.tar", "-index", "a.idx", "-file", "dir/x.txt",
        ])))
        .unwrap();
        match cli.command {
            Command::Extract {
                tar,
                index,
                file,
                output,
            } => {
                assert_eq!(tar, "a.tar");
                assert_eq!(index, PathBuf::from("a.idx"));
                assert_eq!(file, "dir/x.txt");
                assert_eq!(output, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_missing_required_flag() {
        assert!(Cli::try_parse_from(args(&["tarix", "list"])).is_err());
        assert!(Cli::try_parse_from(args(&["tarix"])).is_err());
    }

    #[test]
    fn test_printfrompath_name() {
        let cli = Cli::try_parse_from(args(&[
            "tarix",
            "printfrompath",
            "--tar",
            "a.tar",
            "--index",
            "a.idx",
            "--file",
            "f",
        ]))
        .unwrap();
        assert!(matches!(cli.command, Command::PrintFromPath { .. }));
    }

    #[test]
    fn test_default_paths() {
        assert_eq!(
            default_index_path("data/a.tar"),
            PathBuf::from("data/a.tar.index.json")
        );
        assert_eq!(
            default_index_path("https://example.com/dumps/a.tar?sig=1"),
            PathBuf::from("a.tar.index.json")
        );
        assert_eq!(default_output_path("dir/sub/file.txt"), "file.txt");
        assert_eq!(default_output_path("file.txt"), "file.txt");
    }
}
