use super::{LogKind, OutputFormat, ui};
use crate::core::audit::{CallAuditRecord, FailureRecord};
use crate::core::store::AuditStore;
use anyhow::{Context, Result, bail};
use comfy_table::Cell;

const PREVIEW_CHARS: usize = 60;

/// Shortens long bodies for the table view.
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS || text.lines().nth(1).is_some() {
        let short: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{short}…")
    } else {
        line.to_string()
    }
}

fn calls_table(records: &[CallAuditRecord]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("ID"),
        ui::header_cell("Started (UTC)"),
        ui::header_cell("Took (ms)"),
        ui::header_cell("Method"),
        ui::header_cell("URL"),
        ui::header_cell("Outcome"),
    ]);
    for record in records {
        let took = (record.finished - record.created).num_milliseconds();
        let outcome = match &record.error {
            None => Cell::new(preview(record.response_text.as_deref().unwrap_or_default())),
            Some(e) => ui::status_cell(Some(e.as_str())),
        };
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(record.created.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(took),
            Cell::new(&record.request_method),
            Cell::new(&record.request_url),
            outcome,
        ]);
    }
    table.to_string()
}

fn failures_table(records: &[FailureRecord]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("ID"),
        ui::header_cell("Created (UTC)"),
        ui::header_cell("Method"),
        ui::header_cell("URL"),
        ui::header_cell("Error"),
    ]);
    for record in records {
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(record.created.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&record.request_method),
            Cell::new(&record.request_url),
            ui::status_cell(Some(record.error.as_str())),
        ]);
    }
    table.to_string()
}

/// Renders the requested audit trail, newest first.
pub async fn render(
    audit: &dyn AuditStore,
    kind: LogKind,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    match (kind, format) {
        (_, OutputFormat::Xml) => bail!("Logs can only be shown as a table or JSON"),
        (LogKind::Api, format) => {
            let records = audit
                .calls(limit)
                .await
                .context("Failed to read API call log")?;
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&records)?),
                _ => Ok(format!(
                    "{}\n\n{}",
                    ui::style_text("API logs", ui::StyleType::Title),
                    calls_table(&records)
                )),
            }
        }
        (LogKind::Errors, format) => {
            let records = audit
                .failures(limit)
                .await
                .context("Failed to read error log")?;
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&records)?),
                _ => Ok(format!(
                    "{}\n\n{}",
                    ui::style_text("Error logs", ui::StyleType::Title),
                    failures_table(&records)
                )),
            }
        }
    }
}

/// Erases both audit trails.
pub async fn cleanup(audit: &dyn AuditStore) -> Result<()> {
    audit.clear().await.context("Failed to erase audit logs")?;
    tracing::info!("Audit logs cleaned");
    Ok(())
}
