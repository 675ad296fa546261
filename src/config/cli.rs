use clap::Parser;

/// Command line of the `hira-analysis` binary. Flags override the configuration file.
#[derive(Debug, Clone, Parser)]
#[command(name = "hira-analysis")]
#[command(about = "Pulsed signal extraction and model fitting for qubit sensor measurements")]
#[command(version)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "analysis.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Override the output directory from config
    #[arg(short, long)]
    pub output: Option<String>,

    /// Show what would be processed without reading or writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the available fit functions with their estimators and exit
    #[arg(long)]
    pub list_fits: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["hira-analysis"]);
        assert_eq!(args.config, "analysis.toml");
        assert!(!args.verbose);
        assert!(args.monitor.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from([
            "hira-analysis",
            "-c",
            "runs/t1.toml",
            "--monitor",
            "true",
            "--output",
            "/tmp/t1",
            "--log-json",
            "--list-fits",
        ]);
        assert_eq!(args.config, "runs/t1.toml");
        assert_eq!(args.monitor, Some(true));
        assert_eq!(args.output.as_deref(), Some("/tmp/t1"));
        assert!(args.log_json);
        assert!(args.list_fits);
    }
}
