use anyhow::Context;
use clap::Parser;
use hira_analysis::config::toml_config::AnalysisConfig;
use hira_analysis::fit::{AnalysisLogic, FitModel};
use hira_analysis::io::resolve_path;
use hira_analysis::utils::error::{AnalysisError, ErrorSeverity};
use hira_analysis::utils::{logger, validation::Validate};
use hira_analysis::{AnalysisEngine, AnalysisPipeline, CliArgs, LocalStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    if args.list_fits {
        list_fits();
        return Ok(());
    }

    tracing::info!("Starting hira-analysis");
    tracing::info!("Loading configuration from: {}", args.config);

    let mut config = match AnalysisConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(exit_code(&e).max(1));
        }
    };

    if let Some(output) = &args.output {
        config.load.output_path = output.clone();
        tracing::info!("Output path overridden to: {}", output);
    }

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        tracing::error!("Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("Configuration loaded and validated");
    display_config_summary(&config, args.dry_run);

    if args.dry_run {
        tracing::info!("DRY RUN - nothing will be read or written");
        return perform_dry_run(&config);
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("System monitoring enabled");
    }

    let pipeline = AnalysisPipeline::new(LocalStorage::default(), config);
    let engine = AnalysisEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(location) => {
            println!("✅ Analysis completed successfully!");
            println!("📁 Output saved to: {}", location);
        }
        Err(e) => {
            tracing::error!(
                "Analysis failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let code = exit_code(&e);
            if code > 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

fn exit_code(e: &AnalysisError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn list_fits() {
    let (one_d, two_d) = AnalysisLogic::new().get_all_fits();
    println!("1d fits:");
    for name in one_d {
        print_fit(name);
    }
    println!("2d fits:");
    for name in two_d {
        print_fit(name);
    }
}

fn print_fit(name: &str) {
    if let Ok(model) = name.parse::<FitModel>() {
        let estimators: Vec<&str> = model.estimators().iter().map(|e| e.name()).collect();
        println!(
            "  {:<32} estimators: {} (default {})",
            name,
            estimators.join(", "),
            model.default_estimator()
        );
    }
}

fn display_config_summary(config: &AnalysisConfig, dry_run: bool) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name, config.pipeline.version
    );
    if !config.pipeline.description.is_empty() {
        println!("  Description: {}", config.pipeline.description);
    }
    println!("  Inputs: {}", config.inputs.len());
    println!("  Fits: {}", config.fits.len());
    println!("  Output: {}", config.load.output_path);
    println!("  Formats: {}", config.load.output_formats.join(", "));
    println!("  Concurrent Reads: {}", config.concurrent_reads());
    if dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}

fn perform_dry_run(config: &AnalysisConfig) -> anyhow::Result<()> {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📂 Inputs:");
    let mut missing = 0;
    for input in &config.inputs {
        let path = resolve_path(&input.path, input.format)
            .with_context(|| format!("input '{}'", input.name))?;
        let status = if path.exists() {
            "found"
        } else {
            missing += 1;
            "MISSING"
        };
        println!(
            "  {} ({}) <- {} [{}]",
            input.name,
            input.format,
            path.display(),
            status
        );
    }

    if let Some(pulsed) = &config.pulsed {
        println!();
        println!("⚡ Pulsed extraction ({}):", pulsed.method);
        let w = &pulsed.windows;
        println!(
            "  signal {:e}..{:e} s, reference {:e}..{:e} s, bin width {:e} s",
            w.signal_start, w.signal_end, w.norm_start, w.norm_end, w.bin_width
        );
        for input in config.pulsed_inputs() {
            println!("  {} -> {}_pulsed", input.name, input.name);
        }
    }

    if !config.fits.is_empty() {
        println!();
        println!("📈 Fits:");
        for fit in &config.fits {
            let method = fit
                .fit_method()
                .with_context(|| format!("fit on '{}'", fit.input))?;
            println!("  {} on {}", method, fit.input);
        }
    }

    println!();
    println!("💾 Output:");
    println!("  Path: {}", config.load.output_path);
    if let Some(archive) = config.archive_name() {
        println!("  Compression: {} (ZIP)", archive);
    }

    println!();
    if missing > 0 {
        anyhow::bail!("{} of {} inputs are missing", missing, config.inputs.len());
    }
    println!("✅ Dry run analysis complete.");
    Ok(())
}
