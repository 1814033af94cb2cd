use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use heft_core::auth::UserId;
use heft_core::models::ExportData;
use heft_core::service::WeightService;

pub(crate) fn cmd_export(
    service: &WeightService,
    user: &UserId,
    csv: bool,
    output: Option<&Path>,
) -> Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create file: {}", path.display())
        })?)),
        None => Box::new(io::stdout().lock()),
    };

    let count = if csv {
        service.export_csv(user, &mut writer)?
    } else {
        let data = service.export(user)?;
        serde_json::to_writer_pretty(&mut writer, &data)?;
        writeln!(writer)?;
        data.entries.len()
    };
    writer.flush()?;

    if let Some(path) = output {
        eprintln!("Exported {count} entries to {}", path.display());
    }
    Ok(())
}

pub(crate) fn cmd_import(
    service: &WeightService,
    user: &UserId,
    path: &Path,
    csv: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    if csv {
        let summary = service.import_csv(user, file, dry_run)?;
        if json {
            println!(
                "{}",
                serde_json::json!({ "dry_run": dry_run, "summary": summary })
            );
            return Ok(());
        }
        if dry_run {
            println!("Dry run, no changes made.\n");
        } else {
            println!("Import complete.\n");
        }
        println!("  Rows parsed:      {}", summary.rows_parsed);
        println!("  Entries imported: {}", summary.entries_imported);
        if let (Some(first), Some(last)) = (summary.first_date, summary.last_date) {
            println!(
                "  Date range:       {} to {}",
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d")
            );
        }
        return Ok(());
    }

    let data: ExportData = serde_json::from_reader(io::BufReader::new(file))
        .with_context(|| format!("Invalid export file: {}", path.display()))?;

    if dry_run {
        if json {
            println!(
                "{}",
                serde_json::json!({ "dry_run": true, "entries": data.entries.len() })
            );
        } else {
            println!("Dry run, no changes made.\n");
            println!("  Entries in file: {}", data.entries.len());
        }
        return Ok(());
    }

    let summary = service.import(user, &data)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Import complete.\n");
        println!("  Entries imported: {}", summary.entries_imported);
        println!("  Entries skipped:  {}", summary.entries_skipped);
        println!("  Settings updated: {}", summary.settings_updated);
    }
    Ok(())
}
