// Web-based image captioner in front of a BLIP captioning backend.
//
// `caption-studio` (or `caption-studio serve`) hosts the upload page,
// `caption-studio caption <FILES>` captions files from the command line, and
// `caption-studio status` reports what the backend is running on.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use caption_studio::{
    controller::format_inference_time, server, App, CandidateFile, CaptionClient, Config,
    Controller, Event, FileStore, HistoryStore, IntakeSource, Phase,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the upload page (default).
    Serve,
    /// Caption image files and add them to the history.
    Caption {
        files: Vec<PathBuf>,
        /// Text the caption should start from, e.g. "a photo of".
        #[arg(short, long)]
        prompt: Option<String>,
    },
    /// Show backend health and model information.
    Status,
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn build_app(config: &Config) -> Arc<App> {
    let history = HistoryStore::open(FileStore::new(&config.history_path));
    info!(
        "📚 Loaded {} history entries from {}",
        history.len(),
        config.history_path.display()
    );
    App::new(
        Controller::new(history),
        CaptionClient::new(&config.backend_url),
    )
}

async fn serve(config: Config) -> Result<()> {
    let app = build_app(&config);
    app.refresh_status().await;

    let router = server::router(Arc::clone(&app), &config.static_dir);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("could not bind {}", config.bind_addr))?;

    info!("🚀 Server running on http://{}", config.bind_addr);
    info!("🔗 Captioning backend: {}", config.backend_url);

    axum::serve(listener, router).await?;
    Ok(())
}

async fn caption(config: Config, files: Vec<PathBuf>, prompt: Option<String>) -> Result<()> {
    let app = build_app(&config);
    let prompt = prompt.unwrap_or_default();

    for path in files {
        let file = CandidateFile::from_path(&path)
            .with_context(|| format!("could not read {}", path.display()))?;
        app.submit(Event::FileOffered {
            source: IntakeSource::FilePicker,
            file,
        })
        .await;
        if app.view().phase != Phase::Ready {
            println!("{}: skipped (not an image or larger than 10MB)", path.display());
            continue;
        }

        app.submit(Event::GenerateClicked {
            prompt: prompt.clone(),
        })
        .await;
        let view = app.view();
        match view.phase {
            Phase::Captioned => println!(
                "{}: {} ({})",
                path.display(),
                view.caption,
                view.inference_time
                    .unwrap_or_else(|| format_inference_time(0.0))
            ),
            _ => println!("{}: {}", path.display(), view.caption),
        }
    }
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let client = CaptionClient::new(&config.backend_url);
    let health = client.health().await;
    println!("Backend: {}", config.backend_url);
    println!("Device:  {}", health.device_label());

    match client.model_info().await {
        Ok(model) => {
            println!("Model:   {}", model.model_name);
            println!("Loaded:  {}", model.model_loaded);
            if !model.supported_formats.is_empty() {
                println!("Formats: {}", model.supported_formats.join(", "));
            }
            if let Some(max) = model.max_file_size_mb {
                println!("Max size: {}MB", max);
            }
        }
        Err(e) => println!("Model:   unavailable ({})", e),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = Config::from_env()?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Caption { files, prompt } => caption(config, files, prompt).await,
        Command::Status => status(config).await,
    }
}
