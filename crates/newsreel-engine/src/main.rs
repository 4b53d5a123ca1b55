//! Footage pipeline worker binary.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsreel_browser::{CookieStore, PlatformBrowser, SessionManager};
use newsreel_engine::{EngineConfig, FootagePipeline, MatchOptions, ModelClient};
use newsreel_models::{ProgressUpdate, Segment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("newsreel=info".parse().unwrap())
        .add_directive("chromiumoxide=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let mut args = std::env::args().skip(1);
    let headline = args.next().context("usage: newsreel-engine <headline> <text> [--match-only]")?;
    let text = args.next().context("missing segment text argument")?;
    let match_only = args.any(|a| a == "--match-only");

    let segment = Segment::new(headline, text);
    info!(headline = %segment.headline, "Starting footage pipeline");

    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    let model = match ModelClient::from_env() {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to create model client: {}", e);
            std::process::exit(1);
        }
    };

    let store = CookieStore::default_profile()?;
    let session = SessionManager::new(store, config.platform_base_url.clone());

    let driver = PlatformBrowser::launch(config.headless)
        .await
        .context("Failed to launch browser")?
        .with_nav_timeout(config.nav_timeout);

    let mut pipeline = FootagePipeline::new(config, session, model);
    let options = MatchOptions::default();
    let progress = |update: ProgressUpdate| {
        info!("{}", serde_json::to_string(&update).unwrap_or_default());
    };

    let result = if match_only {
        pipeline
            .match_segment(&driver, &segment, &options, &progress)
            .await
            .map(|matched| serde_json::to_value(matched))
    } else {
        pipeline
            .download_best(&driver, &segment, &options, &progress)
            .await
            .map(|report| serde_json::to_value(report))
    };

    driver.close().await;

    match result {
        Ok(Ok(value)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Failed to serialize result: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            std::process::exit(1);
        }
    }
}
