// src/session.rs

use chrono::NaiveDate;
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::{
    browser::{Browser, Locator},
    config::{HarvestConfig, PageLayout},
    dates::format_date,
    error::{HarvestError, Result, WaitStage},
};

/// Unlocks the date field and sets its value without the date picker.
const SET_DATE_SCRIPT: &str = "var el = document.getElementById(arguments[0]);\n\
     el.removeAttribute('readonly');\n\
     el.value = arguments[1];";

/// One long-lived browser session showing the target page.
///
/// Owns the browser; every render mutates its navigation state.
pub struct PageSession<B: Browser> {
    browser: B,
    target_url: String,
    layout: PageLayout,
    render_timeout: Duration,
    grace_delay: Duration,
    poll_interval: Duration,
    closed: bool,
}

impl<B: Browser> PageSession<B> {
    pub fn new(browser: B, config: &HarvestConfig) -> Self {
        Self {
            browser,
            target_url: config.target_url.clone(),
            layout: config.layout.clone(),
            render_timeout: config.render_timeout(),
            grace_delay: config.grace_delay(),
            poll_interval: config.poll_interval(),
            closed: false,
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    /// Load the page, query `date`, wait for the table and return the
    /// rendered markup.
    ///
    /// A timeout leaves the session open; the next call navigates afresh.
    pub async fn render_for_date(&mut self, date: NaiveDate) -> Result<String> {
        if self.closed {
            return Err(HarvestError::browser("page session already closed"));
        }
        let date_str = format_date(date);
        debug!(date = %date_str, url = %self.target_url, "loading page");

        self.browser.navigate(&self.target_url).await?;
        self.browser
            .execute_script(
                SET_DATE_SCRIPT,
                vec![json!(self.layout.date_input_id), json!(date_str)],
            )
            .await?;

        let button = Locator::class_name(&self.layout.search_button_class);
        let handle = self.browser.find_element(&button).await?.ok_or_else(|| {
            HarvestError::browser(format!("search button ({}) not on page", button))
        })?;
        self.browser.click(&handle).await?;

        let table = Locator::class_name(&self.layout.table_class);
        self.wait_for(&table, date, WaitStage::Table).await?;
        let row = Locator::xpath(format!(
            "//table[contains(@class, '{}')]//tr",
            self.layout.table_class
        ));
        self.wait_for(&row, date, WaitStage::Row).await?;

        // late asynchronous content the presence checks miss
        sleep(self.grace_delay).await;

        let markup = self.browser.page_source().await?;
        info!("{}", markup);
        Ok(markup)
    }

    /// Poll until `locator` matches or the render timeout passes.
    async fn wait_for(&mut self, locator: &Locator, date: NaiveDate, stage: WaitStage) -> Result<()> {
        // no deadline when the timeout is too large to represent
        let deadline = Instant::now().checked_add(self.render_timeout);
        loop {
            if self.browser.find_element(locator).await?.is_some() {
                return Ok(());
            }
            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(HarvestError::RenderTimeout {
                        date,
                        stage,
                        timeout: self.render_timeout,
                    });
                }
                Some(deadline) => self.poll_interval.min(deadline - now),
                None => self.poll_interval,
            };
            sleep(pause).await;
        }
    }

    /// Close the browser session. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.browser.close().await
    }
}
