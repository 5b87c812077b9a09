use shelfmap::commands::command_argument_builder;
use shelfmap::handlers::{handle_cache_list, handle_cache_lookup, handle_crawl, handle_metrics};
use shelfmap_core::print_banner;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        None => {}
        Some(("crawl", primary_command)) => handle_crawl(primary_command, quiet).await,
        Some(("cache", primary_command)) => match primary_command.subcommand() {
            Some(("list", secondary_command)) => handle_cache_list(secondary_command),
            Some(("lookup", secondary_command)) => handle_cache_lookup(secondary_command),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("metrics", primary_command)) => handle_metrics(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}
