use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "trackforge")]
#[command(author, version, about = "Batch media tagging, genre remux and export")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe media files (or directories of them) and display information
    Probe {
        /// Files or directories to probe
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Read, write or clear embedded tags of .mp3 and .m4a/.mp4 files
    Tags {
        #[command(subcommand)]
        action: TagsCommand,
    },

    /// Rename files and rewrite their genre in place
    Save {
        #[command(flatten)]
        selection: Selection,
    },

    /// Transcode files into a folder using the configured export formats
    Export {
        /// Destination folder (must exist)
        #[arg(long, short = 'o', required = true)]
        to: PathBuf,

        #[command(flatten)]
        selection: Selection,
    },

    /// Repair leftovers of an interrupted replace (backup and temp siblings)
    Recover {
        /// Files whose siblings should be checked
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TagsCommand {
    /// Print the tags of one file
    Read {
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the tags of files; fields not given are removed
    Write {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        album: Option<String>,
        /// Track as N or N/M
        #[arg(long)]
        track: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        comment: Option<String>,

        /// Embed this image (JPEG or PNG) as the only cover
        #[arg(long, conflicts_with = "remove_cover")]
        cover: Option<PathBuf>,

        /// Remove every embedded cover
        #[arg(long)]
        remove_cover: bool,
    },

    /// Remove all tags, covers included
    Clear {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Files plus the edits shared by `save` and `export`.
#[derive(Args)]
pub struct Selection {
    /// Files or directories to process
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// New base name; numbered " 01", " 02", ... when several files are given
    #[arg(long)]
    pub name: Option<String>,

    /// Genre to store (repeatable). Defaults to the genre already in each file
    #[arg(long = "genre", short = 'g')]
    pub genres: Vec<String>,
}
