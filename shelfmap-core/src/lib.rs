pub mod config;
pub mod crawl;
pub mod data;
pub mod metrics;
pub mod report;
pub mod table;

use colored::Colorize;

pub use config::CrawlConfig;
pub use crawl::{CrawlOrchestrator, CrawlReport, CrawlRun, CrawlState, execute_crawl};
pub use table::WideCategoryTable;

const BANNER: &str = r#"
     _          _  __
 ___| |__   ___| |/ _|_ __ ___   __ _ _ __
/ __| '_ \ / _ \ | |_| '_ ` _ \ / _` | '_ \
\__ \ | | |  __/ |  _| | | | | | (_| | |_) |
|___/_| |_|\___|_|_| |_| |_| |_|\__,_| .__/
                                     |_|
"#;

pub fn print_banner() {
    println!("{}", BANNER.cyan());
    println!(
        "  {} {}\n",
        "storefront category-tree crawler".dimmed(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
