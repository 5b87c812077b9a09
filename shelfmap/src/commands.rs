use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

fn cache_arg() -> clap::Arg {
    arg!(-c --"cache" <PATH>)
        .required(false)
        .help("Link cache file mapping subcategory links to root categories")
        .value_parser(clap::value_parser!(PathBuf))
        .default_value(shelfmap_core::config::DEFAULT_CACHE_FILE)
}

fn metrics_db_arg() -> clap::Arg {
    arg!(--"metrics-db" <PATH>)
        .required(false)
        .help("SQLite database the run metrics are appended to")
        .value_parser(clap::value_parser!(PathBuf))
        .default_value(shelfmap_core::config::DEFAULT_METRICS_DB)
}

fn sheet_arg() -> clap::Arg {
    arg!(--"sheet" <NAME>)
        .required(false)
        .help("Metrics sheet (table) name")
        .default_value(shelfmap_core::config::DEFAULT_METRICS_SHEET)
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("shelfmap")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("shelfmap")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl the storefront menu and listing API and materialize its category \
                tree as a wide table.",
                )
                .arg(
                    arg!(-d --"depth" <LEVELS>)
                        .required(false)
                        .help("Levels to extract, counting the root categories")
                        .value_parser(clap::value_parser!(i64))
                        .allow_negative_numbers(true)
                        .default_value("5"),
                )
                .arg(
                    arg!(-t --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("Maximum concurrent facet API calls")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(cache_arg())
                .arg(
                    arg!(-o --"data-dir" <DIR>)
                        .required(false)
                        .help("Directory the dated output tables are written under")
                        .value_parser(clap::value_parser!(PathBuf))
                        .default_value(shelfmap_core::config::DEFAULT_DATA_DIR),
                )
                .arg(metrics_db_arg())
                .arg(sheet_arg())
                .arg(
                    arg!(--"log-dir" <DIR>)
                        .required(false)
                        .help("Also write logs to {DIR}/{dd-mm-YYYY}/shelfmap_{ddmmYYYY}.log")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Browser wait timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("7"),
                )
                .arg(
                    arg!(--"headful")
                        .required(false)
                        .help("Show the browser window instead of running headless")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"summary")
                        .required(false)
                        .help("Print a run summary with the category tree when done")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-r --"report" <PATH>)
                        .required(false)
                        .help("Save the run summary to a file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-v --"verbose")
                        .required(false)
                        .help("Enable debug logging")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("cache")
                .about("Inspect the link cache")
                .subcommand_required(true)
                .subcommand(
                    command!("list")
                        .about("List every cached link resolution")
                        .arg(cache_arg()),
                )
                .subcommand(
                    command!("lookup")
                        .about("Show the root category a subcategory link resolves to")
                        .arg(arg!(<LINK>).help("Subcategory link, query string stripped"))
                        .arg(cache_arg()),
                ),
        )
        .subcommand(
            command!("metrics")
                .about("Show recent run metrics")
                .arg(metrics_db_arg())
                .arg(sheet_arg())
                .arg(
                    arg!(-n --"limit" <N>)
                        .required(false)
                        .help("Number of runs to show")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                ),
        )
}
