use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Castify - cast local videos to DLNA renderers
#[derive(Parser, Debug)]
#[command(name = "castify", version, about = "Cast local videos to DLNA renderers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the network for media renderers
    Discover {
        /// Search duration in seconds (configured value when omitted)
        #[arg(long, short = 't')]
        timeout: Option<u64>,

        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the subtitle and audio tracks of a file
    Tracks {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Serve a directory to renderers until Ctrl+C
    Serve { dir: PathBuf },

    /// Play a file on a renderer
    Cast {
        file: PathBuf,

        /// Renderer name, index in the discovery list (from 1) or description URL
        #[arg(long, short = 'd')]
        device: Option<String>,

        /// Subtitle track to embed, counted among subtitle streams from 0
        #[arg(long, short = 's')]
        subtitle: Option<u32>,

        /// Audio track to keep, counted among audio streams from 0
        #[arg(long, short = 'a')]
        audio: Option<u32>,

        /// Search duration in seconds
        #[arg(long, short = 't')]
        timeout: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_arguments() {
        let cli = Cli::parse_from([
            "castify", "cast", "movie.mkv", "--device", "2", "--subtitle", "0",
        ]);
        match cli.command {
            Command::Cast {
                file,
                device,
                subtitle,
                audio,
                timeout,
            } => {
                assert_eq!(file, PathBuf::from("movie.mkv"));
                assert_eq!(device.as_deref(), Some("2"));
                assert_eq!(subtitle, Some(0));
                assert_eq!(audio, None);
                assert_eq!(timeout, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_discover_arguments() {
        let cli = Cli::parse_from(["castify", "discover", "--timeout", "4", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Discover {
                timeout: Some(4),
                json: true
            }
        ));
    }
}
