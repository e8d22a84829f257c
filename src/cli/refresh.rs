use super::ui;
use crate::core::currency::CurrencyPair;
use crate::core::store::RateStore;
use crate::engine::{Dispatcher, RefreshReport};
use anyhow::{Context, Result};
use comfy_table::Cell;

impl RefreshReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Pair"),
            ui::header_cell("Rate"),
            ui::header_cell("Status"),
        ]);

        let mut rows: Vec<_> = self
            .updated
            .iter()
            .map(|r| (r.pair(), Some(r.rate), None))
            .chain(
                self.failed
                    .iter()
                    .map(|(pair, e)| (*pair, None, Some(e.to_string()))),
            )
            .collect();
        rows.sort_by_key(|(pair, _, _)| *pair);

        for (pair, rate, error) in rows {
            table.add_row(vec![
                Cell::new(pair.alias()),
                ui::format_optional_cell(rate, ui::format_rate),
                ui::status_cell(error.as_deref()),
            ]);
        }

        let (label, style) = if self.failed.is_empty() {
            ("all pairs updated".to_string(), ui::StyleType::Success)
        } else {
            (
                format!("{} of {} pairs failed", self.failed.len(), self.attempted()),
                ui::StyleType::Error,
            )
        };
        format!(
            "{}\n\n{}\n\n{}",
            ui::style_text("Refresh", ui::StyleType::Title),
            table,
            ui::style_text(&label, style)
        )
    }
}

/// Refreshes one pair, surfacing its error to the caller.
pub async fn run_one(dispatcher: &Dispatcher, pair: CurrencyPair) -> Result<()> {
    let record = dispatcher
        .update(pair)
        .await
        .with_context(|| format!("Failed to refresh {}", pair.alias()))?;
    println!(
        "{} {} = {}",
        ui::style_text("Updated", ui::StyleType::Success),
        pair.alias(),
        ui::format_rate(record.rate)
    );
    Ok(())
}

/// Refreshes every pair behind a progress bar and prints the outcome.
pub async fn run_all(
    dispatcher: &Dispatcher,
    store: &dyn RateStore,
    concurrency: usize,
) -> Result<RefreshReport> {
    let total = store.list_pairs().await?.len() as u64;
    let pb = ui::new_progress_bar(total, true);
    pb.set_message("Refreshing rates...");

    let report = dispatcher
        .refresh_all(concurrency, &|| pb.inc(1))
        .await
        .context("Failed to refresh rates")?;
    pb.finish_and_clear();

    println!("{}", report.display_as_table());
    Ok(report)
}
