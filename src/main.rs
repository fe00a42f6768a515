use anyhow::{Context, Result};
use bondharvest::{browser::WebDriverBrowser, logging, CliArgs, Harvester};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) configuration ────────────────────────────────────────────
    let config = CliArgs::parse().resolve()?;

    // ─── 2) init logging ─────────────────────────────────────────────
    let log_path = logging::init(&config.log_dir)?;
    info!(log = %log_path.display(), "startup");
    info!(
        url = %config.target_url,
        start = %config.start_date,
        end = %config.end_date,
        days = config.date_range().len(),
        output = %config.output_path.display(),
        "harvest configured"
    );

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 3) open the browser session ─────────────────────────────────
    let browser = WebDriverBrowser::connect(&config.webdriver_url, config.browser, config.headless)
        .await
        .with_context(|| format!("connecting to WebDriver at {}", config.webdriver_url))?;

    // ─── 4) walk the date range ──────────────────────────────────────
    // config was validated by `resolve`, so this cannot strand the session
    let mut harvester = Harvester::new(config, browser)?;
    match harvester.run().await {
        Ok(summary) => {
            info!(records = summary.records, rows = summary.rows, "all done");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "harvest failed");
            Err(e.into())
        }
    }
}
