use super::{OutputFormat, ui};
use crate::core::currency::CurrencyCode;
use crate::core::rate::{CurrencyPairRate, SourceId};
use anyhow::{Context, Result};
use comfy_table::Cell;
use serde::Serialize;

/// One rate as exposed to API consumers.
#[derive(Debug, Serialize, PartialEq)]
pub struct RateView {
    pub alias: String,
    pub from: u16,
    pub to: u16,
    pub rate: f64,
}

impl From<&CurrencyPairRate> for RateView {
    fn from(record: &CurrencyPairRate) -> Self {
        RateView {
            alias: record.pair().alias(),
            from: record.from_currency.0,
            to: record.to_currency.0,
            rate: record.rate,
        }
    }
}

#[derive(Serialize)]
#[serde(rename = "xrates")]
struct XmlRates<'a> {
    #[serde(rename = "xrate")]
    xrate: &'a [RateView],
}

/// Keeps the records matching the optional from/to codes.
pub fn filter_rates(
    records: Vec<CurrencyPairRate>,
    from: Option<CurrencyCode>,
    to: Option<CurrencyCode>,
) -> Vec<CurrencyPairRate> {
    records
        .into_iter()
        .filter(|r| from.is_none_or(|code| r.from_currency == code))
        .filter(|r| to.is_none_or(|code| r.to_currency == code))
        .collect()
}

pub fn render_json(records: &[CurrencyPairRate]) -> Result<String> {
    let views: Vec<RateView> = records.iter().map(RateView::from).collect();
    serde_json::to_string_pretty(&views).context("Failed to serialize rates as JSON")
}

pub fn render_xml(records: &[CurrencyPairRate]) -> Result<String> {
    let views: Vec<RateView> = records.iter().map(RateView::from).collect();
    quick_xml::se::to_string(&XmlRates { xrate: &views })
        .context("Failed to serialize rates as XML")
}

pub fn render_table(records: &[CurrencyPairRate], minutes: Option<f64>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("From"),
        ui::header_cell("To"),
        ui::header_cell("Rate"),
        ui::header_cell("Updated (UTC)"),
        ui::header_cell("Source"),
    ]);

    for record in records {
        let source = match record.source.parse::<SourceId>() {
            Ok(id) => format!("{} ({})", id, id.homepage()),
            Err(_) => record.source.clone(),
        };
        table.add_row(vec![
            Cell::new(record.pair().alias()),
            Cell::new(record.from_currency.name().unwrap_or("-")),
            Cell::new(record.to_currency.name().unwrap_or("-")),
            ui::rate_cell(record.rate),
            Cell::new(record.last_updated.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(source),
        ]);
    }

    let freshness = minutes.map_or("never".to_string(), |m| format!("{m} minutes ago"));
    format!(
        "{}\n\n{}\n\n{} {}",
        ui::style_text("Exchange rates", ui::StyleType::Title),
        table,
        ui::style_text("Last refresh:", ui::StyleType::Label),
        ui::style_text(&freshness, ui::StyleType::Subtle)
    )
}

pub fn render(
    records: &[CurrencyPairRate],
    minutes: Option<f64>,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(records, minutes)),
        OutputFormat::Json => render_json(records),
        OutputFormat::Xml => render_xml(records),
    }
}
