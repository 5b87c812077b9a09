use chrono::{Local, NaiveDate};
use shelfmap::commands::command_argument_builder;
use shelfmap::handlers::*;
use std::path::{Path, PathBuf};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn crawl_matches(args: &[&str]) -> clap::ArgMatches {
    let mut argv = vec!["shelfmap", "crawl"];
    argv.extend_from_slice(args);
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    sub.clone()
}

#[test]
fn test_config_defaults() {
    let config = config_from_matches(&crawl_matches(&[]), false);

    assert_eq!(config.max_depth, 5);
    assert_eq!(config.expander.workers, 10);
    assert_eq!(config.cache_path, PathBuf::from("category_dictionary.csv"));
    assert_eq!(config.data_dir, PathBuf::from("Data"));
    assert_eq!(config.metrics_db, PathBuf::from("metadata.db"));
    assert_eq!(config.metrics_sheet, "Categorias");
    assert!(config.log_dir.is_none());
    assert!(config.launch.headless);
    assert!(config.show_progress);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_from_arguments() {
    let sub = crawl_matches(&[
        "-d",
        "3",
        "-t",
        "4",
        "--cache",
        "/tmp/links.csv",
        "-o",
        "/tmp/out",
        "--sheet",
        "Pruebas",
        "--log-dir",
        "/tmp/logs",
        "--timeout",
        "12",
        "--headful",
    ]);
    let config = config_from_matches(&sub, true);

    assert_eq!(config.max_depth, 3);
    assert_eq!(config.expansion_levels(), 2);
    assert_eq!(config.expander.workers, 4);
    assert_eq!(config.cache_path, PathBuf::from("/tmp/links.csv"));
    assert_eq!(config.data_dir, PathBuf::from("/tmp/out"));
    assert_eq!(config.metrics_sheet, "Pruebas");
    assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
    assert_eq!(config.menu.wait_timeout, Duration::from_secs(12));
    assert_eq!(config.resolver.wait_timeout, Duration::from_secs(12));
    assert!(!config.launch.headless);
    assert!(!config.show_progress);
}

#[test]
fn test_negative_depth_parses_but_fails_validation() {
    let config = config_from_matches(&crawl_matches(&["--depth", "-1"]), false);

    assert_eq!(config.max_depth, -1);
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_report_format_rejected() {
    let result = command_argument_builder().try_get_matches_from([
        "shelfmap", "crawl", "--format", "html",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_cache_lookup_requires_link() {
    let result = command_argument_builder().try_get_matches_from(["shelfmap", "cache", "lookup"]);
    assert!(result.is_err());

    let matches = command_argument_builder()
        .try_get_matches_from(["shelfmap", "cache", "lookup", "https://s/category/1/A"])
        .unwrap();
    let (_, cache) = matches.subcommand().unwrap();
    let (name, lookup) = cache.subcommand().unwrap();
    assert_eq!(name, "lookup");
    assert_eq!(
        lookup.get_one::<String>("LINK").map(String::as_str),
        Some("https://s/category/1/A")
    );
}

#[test]
fn test_expand_path_home() {
    let expanded = expand_path(Path::new("~/shelfmap/cache.csv"));
    assert!(!expanded.to_string_lossy().starts_with('~'));
    assert!(expanded.ends_with("shelfmap/cache.csv"));
}

#[test]
fn test_expand_path_plain() {
    assert_eq!(
        expand_path(Path::new("/var/data/out")),
        PathBuf::from("/var/data/out")
    );
}

#[test]
fn test_log_file_path_layout() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
    assert_eq!(
        log_file_path(Path::new("logs"), date),
        PathBuf::from("logs/14-03-2024/shelfmap_14032024.log")
    );
}

#[test]
fn test_init_logging_creates_dated_log_file() {
    let temp = TempDir::new().unwrap();

    let path = init_logging(false, Some(temp.path())).unwrap().unwrap();

    assert_eq!(path, log_file_path(temp.path(), Local::now().date_naive()));
    assert!(path.exists());
    assert!(path.parent().unwrap().is_dir());
}

#[test]
fn test_init_logging_rejects_unusable_log_dir() {
    let temp = TempDir::new().unwrap();
    let blocked = temp.path().join("not-a-dir");
    fs::write(&blocked, "").unwrap();

    let err = init_logging(false, Some(&blocked)).unwrap_err();

    assert!(err.contains("Failed to create log directory"));
}
