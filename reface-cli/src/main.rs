mod cli;
mod config;
mod output;

use crate::{
    cli::{Args, Commands, RunArgs},
    config::AppConfig,
    output::{JsonLinesStatusSink, Tone, label},
};
use anyhow::Result;
use clap::Parser;
use reface::logging::{LoggingOptions, cleanup_old_logs, init_logging};
use reface::{
    CommandContentFilter, Pipeline, PipelineRequest, StatusReporter, TracingStatusSink,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("Application error: {:#}", e);
            eprintln!("{} {:#}", label("Error:", Tone::Bad), e);
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = AppConfig::load(args.config.as_deref())?;
    let _logging = init_logging(&logging_options(&config.logging, args.verbose, args.quiet))?;
    debug!("Loaded configuration: {:?}", config);

    if let (Some(dir), Some(days)) = (&config.logging.dir, config.logging.retention_days) {
        if let Err(e) = cleanup_old_logs(dir, days).await {
            warn!("Failed to clean up old logs: {}", e);
        }
    }

    match args.command {
        Commands::Run(run_args) => run_pipeline(&config, run_args).await,
        Commands::Processors { json } => {
            output::print_processors(&config.registry().names(), json);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn logging_options(base: &LoggingOptions, verbose: bool, quiet: bool) -> LoggingOptions {
    let mut options = base.clone();
    if quiet {
        options.filter = Some("error".to_string());
    } else if verbose {
        options.filter = Some("reface=debug,reface_cli=debug".to_string());
    }
    options
}

async fn run_pipeline(config: &AppConfig, args: RunArgs) -> Result<ExitCode> {
    let defaults = config.pipeline_defaults()?;
    let options = config.options(args.options());

    let mut status = StatusReporter::silent().with_sink(Arc::new(TracingStatusSink));
    if args.json {
        status.add_sink(Arc::new(JsonLinesStatusSink));
    }

    let mut pipeline = Pipeline::new(Arc::new(config.media_tool()), defaults)
        .with_registry(config.registry())
        .with_status(status)
        .with_reject_hook(Arc::new(|target: &Path| {
            warn!("Content filter rejected {}", target.display());
        }));
    if let Some(spec) = &config.content_filter {
        pipeline = pipeline.with_content_filter(Arc::new(CommandContentFilter::new(spec.clone())));
    }

    let mut request = PipelineRequest::new(&args.source, &args.target).with_options(options);
    if let Some(output) = &args.output {
        request = request.with_output(output);
    }

    let report = pipeline.run(request).await;
    output::print_report(&report, args.json);
    Ok(output::exit_code(&report))
}
