// Entry point and high-level CLI flow.
//
// - Option [1] reads the star-schema CSV files, joins and aggregates them,
//   printing load diagnostics.
// - Option [2] writes the group breakdown, one totals table per summary
//   grouping (segment, category), the focus breakdown and a JSON summary,
//   previewing each table on the console.
// With `--batch` both steps run once and the program exits.
use anyhow::{Context, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use segment_report::config::{Args, ReportJob};
use segment_report::reports::{self, JobOutput};
use segment_report::{output, util};
use std::io::{self, Write};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

// Keep the last aggregation around so reports can be regenerated without
// reading the files again.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { output: None }));

struct AppState {
    output: Option<JobOutput>,
}

fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn handle_load(job: &ReportJob, args: &Args) -> Result<()> {
    let out = reports::run_job(job, &args.data_dir)
        .with_context(|| format!("running job over {}", args.data_dir.display()))?;
    println!(
        "Processing dataset... ({} rows read, {} joined)",
        util::format_int(out.load.rows_in_file()),
        util::format_int(out.load.joined)
    );
    if out.load.unreadable > 0 {
        println!(
            "Note: {} rows could not be read.",
            util::format_int(out.load.unreadable)
        );
    }
    if out.load.dropped() > 0 {
        println!(
            "Note: {} rows excluded ({} with an empty key, {} with an unknown key).",
            util::format_int(out.load.dropped()),
            util::format_int(out.load.dropped_null_key),
            util::format_int(out.load.dropped_unresolved)
        );
    }
    println!();
    let mut state = APP_STATE
        .lock()
        .map_err(|_| anyhow::anyhow!("application state poisoned"))?;
    state.output = Some(out);
    Ok(())
}

fn handle_generate_reports(job: &ReportJob, args: &Args) -> Result<()> {
    let out = {
        let state = APP_STATE
            .lock()
            .map_err(|_| anyhow::anyhow!("application state poisoned"))?;
        state.output.clone()
    };
    let Some(out) = out else {
        println!("Error: No data loaded. Please load the files first (option 1).\n");
        return Ok(());
    };

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let breakdown = reports::generate_group_breakdown(&out.detail_rows);
    let file1 = args.out_dir.join("report_group_breakdown.csv");
    output::write_csv(&file1, &breakdown)?;
    println!("Report 1: Breakdown by Group (sorted by total)\n");
    output::preview_table_rows(&breakdown, 10);
    println!("(Full table exported to {})\n", file1.display());

    let mut report_no = 2;
    for table in &out.summaries {
        let totals = reports::generate_group_totals(&table.rows);
        let file = args.out_dir.join(format!("report_{}_totals.csv", table.name));
        output::write_csv(&file, &totals)?;
        println!("Report {}: Totals by {}\n", report_no, table.name);
        output::preview_table_rows(&totals, 10);
        println!("(Full table exported to {})\n", file.display());
        report_no += 1;
    }

    if let Some(focus) = &job.focus {
        let focused = reports::generate_focus_breakdown(&out.detail_rows, focus);
        let file = args.out_dir.join("report_focus_breakdown.csv");
        output::write_csv(&file, &focused)?;
        println!("Report {}: Breakdown within {}\n", report_no, focus);
        output::preview_table_rows(&focused, 10);
        println!("(Full table exported to {})\n", file.display());
    }

    let summary = reports::generate_summary(&out, chrono::Utc::now());
    output::write_json(&args.out_dir.join("summary.json"), &summary)?;
    println!("Summary Stats (summary.json):");
    println!(
        "{{\"grand_total\": {}, \"distinct_entities\": {}}}\n",
        util::format_number(summary.grand_total, 2),
        util::format_int(summary.distinct_entities)
    );
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut job = match &args.job {
        Some(path) => ReportJob::from_path(path)
            .with_context(|| format!("reading job {}", path.display()))?,
        None => ReportJob::default(),
    };
    if let Some(n) = args.top_n {
        job.metrics.top_n = n;
    }

    if args.batch {
        handle_load(&job, &args)?;
        return handle_generate_reports(&job, &args);
    }

    loop {
        println!("Select an option:");
        println!("[1] Load the files");
        println!("[2] Generate Reports\n");
        match read_choice().as_str() {
            "1" => {
                if let Err(e) = handle_load(&job, &args) {
                    eprintln!("Failed to load files: {:#}\n", e);
                }
            }
            "2" => {
                println!();
                if let Err(e) = handle_generate_reports(&job, &args) {
                    eprintln!("Write error: {:#}", e);
                }
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => {
                println!("Invalid choice. Please enter 1 or 2.\n");
            }
        }
    }
    Ok(())
}
