// src/browser/fake.rs
//
// Scripted browser for harvester and session tests.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;

use super::{Browser, ElementHandle, Locator};
use crate::{dates::parse_date, error::Result};

/// What the fake page shows after a query for a date.
#[derive(Debug, Clone)]
pub enum FakePage {
    /// Table and rows appear; `page_source` returns the markup.
    Rendered(String),
    /// Nothing ever appears.
    Hangs,
    /// The table container appears but never gets a row.
    EmptyTable,
}

#[derive(Debug, Default)]
pub struct FakeBrowser {
    pages: HashMap<NaiveDate, FakePage>,
    current: Option<NaiveDate>,
    /// Every date the page was queried for, in order.
    pub queried: Vec<NaiveDate>,
    pub navigations: usize,
    pub scripts: Vec<(String, Vec<Value>)>,
    pub closed: usize,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, date: &str, page: FakePage) -> Self {
        self.pages.insert(parse_date(date).unwrap(), page);
        self
    }

    fn page(&self) -> Option<&FakePage> {
        self.current.and_then(|d| self.pages.get(&d))
    }
}

impl Browser for FakeBrowser {
    async fn navigate(&mut self, _url: &str) -> Result<()> {
        self.navigations += 1;
        self.current = None;
        Ok(())
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        if let Some(date) = args.get(1).and_then(Value::as_str) {
            self.current = parse_date(date).ok();
        }
        self.scripts.push((script.to_string(), args));
        Ok(Value::Null)
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let found = match locator {
            Locator::ClassName(c) if c == "search-btn" => true,
            Locator::ClassName(_) => matches!(
                self.page(),
                Some(FakePage::Rendered(_)) | Some(FakePage::EmptyTable)
            ),
            Locator::XPath(_) => matches!(self.page(), Some(FakePage::Rendered(_))),
        };
        Ok(found.then(|| ElementHandle(locator.to_string())))
    }

    async fn click(&mut self, _element: &ElementHandle) -> Result<()> {
        if let Some(date) = self.current {
            self.queried.push(date);
        }
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String> {
        Ok(match self.page() {
            Some(FakePage::Rendered(html)) => html.clone(),
            _ => "<html><body></body></html>".to_string(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.closed += 1;
        Ok(())
    }
}

/// A page with a bond-details table of `headers` and `rows`.
pub fn table_page(headers: &[&str], rows: &[&[&str]]) -> String {
    let mut html = String::from("<html><body><table class=\"bond_details_table\"><tr>");
    for h in headers {
        html.push_str(&format!("<th> {} </th>", h));
    }
    html.push_str("</tr>");
    for row in rows {
        html.push_str("<tr class=\"data\">");
        for cell in *row {
            html.push_str(&format!("<td>\n  {}\n</td>", cell));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table></body></html>");
    html
}

/// A rendered page that holds no bond-details table.
pub fn page_without_table() -> String {
    "<html><body><table class=\"other\"><tr><th>x</th></tr></table></body></html>".to_string()
}
