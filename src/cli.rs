use clap::{ArgAction, Parser};
use crate::browser::{LaunchConfig, NetworkIdle};
use crate::request::{ConversionRequest, Margins, PaperFormat, DEFAULT_PATH};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for `--timeout`, one day.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Converts an HTML string to a PDF using a headless browser
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, disable_help_flag = true)]
pub struct Args {
    /// HTML content to convert to PDF
    #[arg(short = 'h', long)]
    pub html: String,

    /// Page format (Letter, Legal, Tabloid, Ledger, A0-A6)
    #[arg(short, long, default_value = "A4")]
    pub format: PaperFormat,

    /// Top margin
    #[arg(long = "marginTop", visible_alias = "margin-top", default_value = "2cm")]
    pub margin_top: String,

    /// Right margin
    #[arg(long = "marginRight", visible_alias = "margin-right", default_value = "1cm")]
    pub margin_right: String,

    /// Bottom margin
    #[arg(long = "marginBottom", visible_alias = "margin-bottom", default_value = "2cm")]
    pub margin_bottom: String,

    /// Left margin
    #[arg(long = "marginLeft", visible_alias = "margin-left", default_value = "1cm")]
    pub margin_left: String,

    /// Output file path
    #[arg(short, long, default_value = DEFAULT_PATH)]
    pub path: PathBuf,

    /// Seconds to wait for the page to go network idle
    #[arg(
        long,
        env = "HTML2PDF_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    pub timeout: u64,

    /// Chromium binary to use instead of the auto-detected one
    #[arg(long, env = "HTML2PDF_CHROME")]
    pub chrome: Option<PathBuf>,

    /// Run Chromium without its sandbox (containers running as root)
    #[arg(long, env = "HTML2PDF_NO_SANDBOX")]
    pub no_sandbox: bool,

    /// More logging, repeat for more (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Args {
    pub fn request(&self) -> ConversionRequest {
        ConversionRequest {
            html: self.html.clone(),
            format: self.format,
            margins: Margins {
                top: self.margin_top.clone(),
                right: self.margin_right.clone(),
                bottom: self.margin_bottom.clone(),
                left: self.margin_left.clone(),
            },
            path: self.path.clone(),
        }
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            chrome: self.chrome.clone(),
            sandbox: !self.no_sandbox,
            timeout: Duration::from_secs(self.timeout),
        }
    }

    pub fn network_idle(&self) -> NetworkIdle {
        NetworkIdle::with_timeout(Duration::from_secs(self.timeout))
    }

    /// Default `RUST_LOG` filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
