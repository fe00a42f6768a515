// src/harvest.rs

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use crate::{
    accumulate::Accumulator,
    browser::Browser,
    config::HarvestConfig,
    error::{HarvestError, Result},
    extract::TableExtractor,
    session::PageSession,
};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub dates_visited: usize,
    pub records: usize,
    pub rows: usize,
    pub not_found: usize,
    pub timeouts: usize,
}

/// Walks the configured date range through one page session and writes a
/// single combined CSV.
pub struct Harvester<B: Browser> {
    config: HarvestConfig,
    session: PageSession<B>,
    extractor: TableExtractor,
}

impl<B: Browser> Harvester<B> {
    pub fn new(config: HarvestConfig, browser: B) -> Result<Self> {
        config
            .validate()
            .map_err(|e| HarvestError::Config(format!("{:#}", e)))?;
        let extractor = TableExtractor::new(&config.layout).map_err(HarvestError::Config)?;
        let session = PageSession::new(browser, &config);
        Ok(Self {
            config,
            session,
            extractor,
        })
    }

    pub fn session(&self) -> &PageSession<B> {
        &self.session
    }

    /// Harvest every date, write the output and close the browser session.
    ///
    /// The session is closed on every exit path. If the loop is abandoned,
    /// whatever was collected up to then is still written before the error
    /// is returned.
    pub async fn run(&mut self) -> Result<HarvestSummary> {
        let outcome = self.harvest().await;
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "failed to close browser session");
        }
        outcome
    }

    #[instrument(level = "info", skip(self), fields(start = %self.config.start_date, end = %self.config.end_date))]
    async fn harvest(&mut self) -> Result<HarvestSummary> {
        let mut acc = Accumulator::new();
        let mut summary = HarvestSummary::default();

        let walked = self.walk(&mut acc, &mut summary).await;
        summary.records = acc.len();
        summary.rows = acc.row_count();

        if let Err(e) = walked {
            error!(error = %e, records = summary.records, "harvest aborted");
            if !acc.is_empty() {
                match acc
                    .combine()
                    .and_then(|t| t.write_csv(&self.config.output_path))
                {
                    Ok(()) => warn!(
                        path = %self.config.output_path.display(),
                        "wrote partial results"
                    ),
                    Err(w) => error!(error = %w, "could not write partial results"),
                }
            }
            return Err(e);
        }

        let table = acc.combine().map_err(|e| {
            error!(dates = summary.dates_visited, "{}", e);
            e
        })?;
        table.write_csv(&self.config.output_path)?;

        info!(
            dates = summary.dates_visited,
            records = summary.records,
            rows = summary.rows,
            not_found = summary.not_found,
            timeouts = summary.timeouts,
            "harvest complete"
        );
        Ok(summary)
    }

    async fn walk(&mut self, acc: &mut Accumulator, summary: &mut HarvestSummary) -> Result<()> {
        let mut consecutive_timeouts = 0u32;

        for date in self.config.date_range() {
            summary.dates_visited += 1;
            info!("fetching data for date: {}", date);

            let markup = match self.session.render_for_date(date).await {
                Ok(markup) => {
                    consecutive_timeouts = 0;
                    markup
                }
                Err(e @ HarvestError::RenderTimeout { .. }) => {
                    consecutive_timeouts += 1;
                    summary.timeouts += 1;
                    error!(%date, consecutive = consecutive_timeouts, "{}", e);
                    self.check_timeouts(date, consecutive_timeouts)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.extractor.extract(&markup) {
                Some(snapshot) => {
                    info!(%date, rows = snapshot.rows.len(), columns = snapshot.headers.len(), "table extracted");
                    acc.push(date, snapshot);
                }
                None => {
                    summary.not_found += 1;
                    error!("{}", HarvestError::TableNotFound { date });
                }
            }
        }
        Ok(())
    }

    fn check_timeouts(&self, date: NaiveDate, consecutive: u32) -> Result<()> {
        if consecutive >= self.config.max_consecutive_timeouts {
            return Err(HarvestError::TimeoutThreshold { date, consecutive });
        }
        Ok(())
    }
}
