use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-lens")]
#[command(about = "Decompile Java class files, loose or inside jars, with a selectable engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub cfr: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub procyon: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub vineflower: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub jd: Option<PathBuf>,

    /// Log each decompilation step to stderr.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Decompile class files: `path/B.class` or `lib.jar!/a/B.class`.
    Decompile {
        #[arg(required = true, value_name = "LOCATION")]
        locations: Vec<String>,

        #[arg(short = 'e', long, value_name = "ID")]
        engine: Option<String>,

        /// Keep the engine's own line layout for this run.
        #[arg(long)]
        no_realign: bool,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Decompile every class file under a directory, one JSON object per line.
    Dir {
        dir: PathBuf,

        #[arg(short = 'e', long, value_name = "ID")]
        engine: Option<String>,

        #[arg(long)]
        no_realign: bool,
    },
    Engines,
    Select {
        id: String,
    },
    Realign {
        #[arg(value_enum)]
        state: Toggle,
    },
    Show,
    /// Forget all stored preferences.
    Reset,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Self::On
    }
}
