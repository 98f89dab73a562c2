mod render;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use slidegen_client::config::LoggingConfig;
use slidegen_client::{ClientConfig, DisplayState, HttpJobApi, JobApi, JobController};
use slidegen_common::{DownloadRef, GenerateOptions, JobId};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Base URL of the SlideGen API (overrides config and SLIDEGEN_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a presentation and wait for it to finish
    Generate(GenerateArgs),
    /// Show the status of a job
    Status {
        id: String,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Show the render report of a finished job
    Report {
        id: String,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Download the presentation of a finished job
    Download {
        id: String,
        /// Destination file (defaults to presentation_<id>.pptx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that the API is reachable
    Health,
}

#[derive(Args)]
struct GenerateArgs {
    /// What the presentation should be about
    prompt: String,
    /// Template ID
    #[arg(short, long, default_value = slidegen_common::DEFAULT_TEMPLATE_ID)]
    template: String,
    /// Output language (e.g. "en", "zh", or "auto")
    #[arg(short, long, default_value = slidegen_common::DEFAULT_LANGUAGE)]
    language: String,
    /// Content density: sparse, normal or dense
    #[arg(short, long, default_value = "normal")]
    density: String,
    /// Destination file (defaults to presentation_<id>.pptx)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Only print the download URL
    #[arg(long)]
    no_download: bool,
}

enum Step {
    Progress,
    Settled,
    Interrupted,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    setup_logging(&config.logging, cli.verbose)?;

    let api = Arc::new(
        HttpJobApi::from_config(&config.api).context("Failed to set up HTTP client")?,
    );
    log::debug!("Using API at {}", api.base_url());

    match cli.command {
        Commands::Generate(args) => generate(api, &config, args).await,
        Commands::Status { id, json } => {
            let snapshot = api.job_status(&JobId(id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                render::print_snapshot(&snapshot, config.polling.min_visible_progress);
            }
            Ok(())
        }
        Commands::Report { id, json } => {
            let report = api.job_report(&JobId(id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render::print_report(&report);
            }
            Ok(())
        }
        Commands::Download { id, output } => {
            let download = DownloadRef::for_job(api.base_url(), &JobId(id));
            save(&api, &download, output).await
        }
        Commands::Health => {
            let health = api.health().await?;
            println!(
                "{}: {}",
                health.service.as_deref().unwrap_or(api.base_url()),
                health.status
            );
            Ok(())
        }
    }
}

async fn generate(api: Arc<HttpJobApi>, config: &ClientConfig, args: GenerateArgs) -> anyhow::Result<()> {
    let options = GenerateOptions::default()
        .with_template(args.template)
        .with_language(args.language)
        .with_density(slidegen_common::parse_density(&args.density)?);

    let mut controller = JobController::from_config(api.clone(), config);
    let job_id = controller.submit(&args.prompt, options).await?;
    println!("Submitted job {}", job_id);

    let mut shown = controller.display();
    println!("{}", shown);

    loop {
        let step = tokio::select! {
            more = controller.next_event() => if more { Step::Progress } else { Step::Settled },
            _ = tokio::signal::ctrl_c() => Step::Interrupted,
        };

        match step {
            Step::Progress => {
                let now = controller.display();
                if now != shown {
                    println!("{}", now);
                    shown = now;
                }
            }
            Step::Settled => break,
            Step::Interrupted => {
                controller.reset();
                eprintln!("Interrupted. Job {} keeps running on the server.", job_id);
                eprintln!("Check it later with: slidegen status {}", job_id);
                return Ok(());
            }
        }
    }

    if let DisplayState::Failed { message } = controller.display() {
        anyhow::bail!("Job {} failed: {}", job_id, message);
    }

    let view = controller.view();
    if let Some(report) = &view.report {
        render::print_report(report);
    } else if let Some(err) = &view.report_error {
        eprintln!("Render report unavailable: {}", err);
    }

    let download = controller.request_download()?;
    if args.no_download {
        println!("Download: {}", download.url);
        return Ok(());
    }
    save(&api, &download, args.output).await
}

async fn save(api: &HttpJobApi, download: &DownloadRef, output: Option<PathBuf>) -> anyhow::Result<()> {
    let dest = output.unwrap_or_else(|| PathBuf::from(&download.file_name));
    let bytes = api
        .download_to(download, &dest)
        .await
        .with_context(|| format!("Failed to download {}", download.url))?;
    println!("Saved {} ({} bytes)", dest.display(), bytes);
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::default();
    if let Some(path) = &cli.config {
        config.merge(ClientConfig::from_file(path)?);
    }
    config.apply_env();
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    Ok(config)
}

fn setup_logging(logging: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        logging.level.parse::<log::LevelFilter>()
            .with_context(|| format!("Invalid log level: {}", logging.level))?
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Warn)
        .level_for("slidegen", level)
        .level_for("slidegen_client", level)
        .chain(std::io::stderr());

    if let Some(path) = &logging.output {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
