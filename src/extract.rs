// src/extract.rs

use scraper::{ElementRef, Html, Selector};

use crate::config::PageLayout;

/// Header plus data rows pulled from one rendered page.
///
/// Rows are not checked against the header width.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Turns rendered markup into a [`TableSnapshot`].
pub struct TableExtractor {
    table: Selector,
    header_cell: Selector,
    data_row: Selector,
    data_cell: Selector,
}

impl TableExtractor {
    pub fn new(layout: &PageLayout) -> Result<Self, String> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| format!("invalid selector {:?}: {:?}", css, e))
        };
        Ok(Self {
            table: parse(&format!("table.{}", layout.table_class))?,
            header_cell: parse("th")?,
            data_row: parse(&format!("tr.{}", layout.data_row_class))?,
            data_cell: parse("td")?,
        })
    }

    /// `None` when the markup holds no bond-details table.
    pub fn extract(&self, markup: &str) -> Option<TableSnapshot> {
        let doc = Html::parse_document(markup);
        let table = doc.select(&self.table).next()?;

        let headers = table.select(&self.header_cell).map(cell_text).collect();
        let rows = table
            .select(&self.data_row)
            .map(|tr| tr.select(&self.data_cell).map(cell_text).collect())
            .collect();

        Some(TableSnapshot { headers, rows })
    }
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
