//! Command-line interface for voxloop
//!
//! Provides argument parsing using clap derive macros.

use clap::Parser;
use std::path::PathBuf;

/// Realtime voice assistant for the terminal
#[derive(Parser, Debug)]
#[command(
    name = "voxloop",
    version,
    about = "Realtime voice assistant for the terminal"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose output (-v: transcript diagnostics)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., pipewire)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Instruction file read once at startup (default: script.txt)
    #[arg(long, value_name = "PATH")]
    pub instructions: Option<PathBuf>,

    /// List audio input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_args() {
        let cli = Cli::try_parse_from(["voxloop"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.device.is_none());
        assert!(cli.instructions.is_none());
        assert!(!cli.list_devices);
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::try_parse_from([
            "voxloop",
            "--device",
            "pipewire",
            "--instructions",
            "prompts/agent.txt",
            "-q",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.device.as_deref(), Some("pipewire"));
        assert_eq!(
            cli.instructions,
            Some(PathBuf::from("prompts/agent.txt"))
        );
        assert!(cli.quiet);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_list_devices() {
        let cli = Cli::try_parse_from(["voxloop", "--list-devices"]).unwrap();
        assert!(cli.list_devices);
    }

    #[test]
    fn test_version_flag() {
        let result = Cli::try_parse_from(["voxloop", "--version"]);
        // Clap returns an error for --version but with DisplayVersion kind
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayVersion
        );
    }
}
