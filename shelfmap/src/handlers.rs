use chrono::{Local, NaiveDate};
use clap::ArgMatches;
use colored::Colorize;
use shelfmap_core::config::CrawlConfig;
use shelfmap_core::crawl::execute_crawl;
use shelfmap_core::data::MetricsStore;
use shelfmap_core::report::{ReportFormat, RunSummary, generate_text_summary, render_summary, save_report};
use shelfmap_scanner::LinkCache;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Expand a leading `~` in a path argument.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

/// `{log_dir}/{dd-mm-YYYY}/shelfmap_{ddmmYYYY}.log`
pub fn log_file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir
        .join(date.format("%d-%m-%Y").to_string())
        .join(format!("shelfmap_{}.log", date.format("%d%m%Y")))
}

/// Install the global subscriber: stdout, plus a dated log file when
/// `log_dir` is given. `RUST_LOG` overrides the default level.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<PathBuf>, String> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let Some(log_dir) = log_dir else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return Ok(None);
    };

    let path = log_file_path(log_dir, Local::now().date_naive());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory {}: {}", parent.display(), e))?;
    }
    let file = File::create(&path)
        .map_err(|e| format!("Failed to create log file {}: {}", path.display(), e))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(Mutex::new(file)))
        .try_init();
    Ok(Some(path))
}

/// Map `crawl` arguments onto the default configuration.
pub fn config_from_matches(sub_matches: &ArgMatches, quiet: bool) -> CrawlConfig {
    let mut config = CrawlConfig::default();

    if let Some(depth) = sub_matches.get_one::<i64>("depth") {
        config.max_depth = *depth;
    }
    if let Some(workers) = sub_matches.get_one::<usize>("workers") {
        config.expander.workers = *workers;
    }
    if let Some(cache) = sub_matches.get_one::<PathBuf>("cache") {
        config.cache_path = expand_path(cache);
    }
    if let Some(data_dir) = sub_matches.get_one::<PathBuf>("data-dir") {
        config.data_dir = expand_path(data_dir);
    }
    if let Some(db) = sub_matches.get_one::<PathBuf>("metrics-db") {
        config.metrics_db = expand_path(db);
    }
    if let Some(sheet) = sub_matches.get_one::<String>("sheet") {
        config.metrics_sheet = sheet.clone();
    }
    config.log_dir = sub_matches
        .get_one::<PathBuf>("log-dir")
        .map(|dir| expand_path(dir));
    if let Some(timeout) = sub_matches.get_one::<u64>("timeout") {
        let timeout = Duration::from_secs(*timeout);
        config.menu.wait_timeout = timeout;
        config.resolver.wait_timeout = timeout;
    }
    config.launch.headless = !sub_matches.get_flag("headful");
    config.show_progress = !quiet;

    config
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) {
    let config = config_from_matches(sub_matches, quiet);
    let verbose = sub_matches.get_flag("verbose");
    let show_summary = sub_matches.get_flag("summary");

    match init_logging(verbose, config.log_dir.as_deref()) {
        Ok(Some(path)) => println!("{} Logging to {}", "→".blue(), path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }

    if !quiet {
        println!("\n🛒  Crawling {}", config.menu.home_url.bright_white());
        println!("Max depth: {}", config.max_depth);
        println!("Workers: {}", config.expander.workers);
        println!("Link cache: {}\n", config.cache_path.display());
    }

    let run = match execute_crawl(&config, None).await {
        Ok(run) => run,
        Err(e) => {
            error!("Program finished with failures: {}", e);
            eprintln!("{} Crawl failed: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    info!("Program finished");

    let summary = RunSummary::from_run(&run);
    if show_summary {
        print!("{}", generate_text_summary(&summary, &run.report.table));
    }
    if let Some(report_path) = sub_matches.get_one::<PathBuf>("report") {
        write_report(sub_matches, &summary, &run.report.table, &expand_path(report_path));
    }

    if let Some(ref fatal) = run.report.fatal {
        eprintln!(
            "{} Crawl aborted: {} ({} rows kept)",
            "✗".red().bold(),
            fatal,
            run.report.table.len()
        );
        std::process::exit(1);
    }

    println!(
        "\n{} Crawl complete: {} rows, depth {}, {} errors",
        "✓".green().bold(),
        run.report.table.len().to_string().cyan(),
        run.report.reached_depth.to_string().cyan(),
        run.metrics.errors.to_string().cyan()
    );
    match run.output_path {
        Some(path) => println!(
            "{} Table: {}",
            "✓".green().bold(),
            path.display().to_string().bright_white()
        ),
        None => println!("{} No rows, table not written", "→".blue()),
    }
}

fn write_report(
    sub_matches: &ArgMatches,
    summary: &RunSummary,
    table: &shelfmap_core::WideCategoryTable,
    path: &Path,
) {
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);

    let content = match render_summary(format, summary, table) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to render run report: {}", e);
            eprintln!("{} Failed to render report: {}", "✗".red().bold(), e);
            return;
        }
    };
    match save_report(&content, path) {
        Ok(()) => println!(
            "{} Report saved to {}",
            "✓".green().bold(),
            path.display().to_string().bright_white()
        ),
        Err(e) => {
            error!("Failed to save run report to {}: {}", path.display(), e);
            eprintln!("{} Failed to save report: {}", "✗".red().bold(), e);
        }
    }
}

fn load_cache_or_exit(sub_matches: &ArgMatches) -> LinkCache {
    let path = sub_matches
        .get_one::<PathBuf>("cache")
        .map(|p| expand_path(p))
        .unwrap_or_else(|| PathBuf::from(shelfmap_core::config::DEFAULT_CACHE_FILE));

    match LinkCache::load(&path) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

pub fn handle_cache_list(sub_matches: &ArgMatches) {
    let cache = load_cache_or_exit(sub_matches);

    print_divider();
    println!(
        "{}",
        format!("  LINK CACHE  {}", cache.path().display())
            .bright_white()
            .bold()
    );
    print_divider();

    for entry in cache.entries() {
        println!(
            "{} {} {}",
            entry.subcategory_link,
            "→".blue(),
            format!("{} ({})", entry.category_name, entry.category_link).bright_white()
        );
    }

    let roots: std::collections::BTreeSet<&str> = cache
        .entries()
        .iter()
        .map(|e| e.category_link.as_str())
        .collect();
    println!();
    println!(
        "{} {} links, {} root categories",
        "✓".green().bold(),
        cache.len().to_string().cyan(),
        roots.len().to_string().cyan()
    );
}

pub fn handle_cache_lookup(sub_matches: &ArgMatches) {
    let cache = load_cache_or_exit(sub_matches);
    let Some(link) = sub_matches.get_one::<String>("LINK") else {
        eprintln!("{} A link is required", "✗".red().bold());
        std::process::exit(1);
    };

    let link = shelfmap_scanner::menu::strip_query(link);
    match cache.lookup(link) {
        Some((name, canonical)) => {
            println!("{} {}", "✓".green().bold(), name.bright_white().bold());
            println!("  {}", canonical);
        }
        None => {
            eprintln!("{} {} is not in the link cache", "✗".red().bold(), link);
            std::process::exit(1);
        }
    }
}

pub fn handle_metrics(sub_matches: &ArgMatches) {
    let db_path = sub_matches
        .get_one::<PathBuf>("metrics-db")
        .map(|p| expand_path(p))
        .unwrap_or_else(|| PathBuf::from(shelfmap_core::config::DEFAULT_METRICS_DB));
    let sheet = sub_matches
        .get_one::<String>("sheet")
        .cloned()
        .unwrap_or_else(|| shelfmap_core::config::DEFAULT_METRICS_SHEET.to_string());
    let limit = *sub_matches.get_one::<usize>("limit").unwrap_or(&10);

    if !MetricsStore::exists(&db_path) {
        eprintln!(
            "{} No metrics database at {}",
            "✗".red().bold(),
            db_path.display()
        );
        std::process::exit(1);
    }

    let records = match MetricsStore::new(&db_path).and_then(|store| store.recent(&sheet, limit)) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("{} Failed to read metrics: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    print_divider();
    println!("{}", format!("  RUN METRICS  {}", sheet).bright_white().bold());
    print_divider();
    println!(
        "{:<10}  {:<8}  {:<8}  {:>8}  {:>7}  {:>9}  {:>6}  {:>5}",
        "Date", "Start", "End", "Elapsed", "Rows", "Rows/min", "Errors", "Depth"
    );
    for record in &records {
        let errors = if record.errors > 0 {
            record.errors.to_string().yellow()
        } else {
            record.errors.to_string().green()
        };
        println!(
            "{:<10}  {:<8}  {:<8}  {:>8}  {:>7}  {:>9.2}  {:>6}  {:>5}",
            record.date,
            record.start,
            record.end,
            record.elapsed,
            record.rows,
            record.rows_per_minute,
            errors,
            record.reached_depth
        );
    }
    if records.is_empty() {
        println!("{} No runs recorded yet", "→".blue());
    }
}
