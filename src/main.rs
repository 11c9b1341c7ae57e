use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use text_browser::config::DEFAULT_VIEWPORT_SIZE;
use text_browser::{Browser, BrowserConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "text-browser")]
#[command(about = "A text-only web browser for terminal and agent use", long_about = None)]
struct Args {
    /// Address to visit: a URL, about:blank, or search:<query>
    address: Option<String>,

    /// Viewport size in characters
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_SIZE)]
    viewport_size: usize,

    /// Save fetched resources into this directory instead of rendering them
    #[arg(long)]
    downloads_folder: Option<PathBuf>,

    /// API key for the search: scheme (falls back to SEARCH_API_KEY)
    #[arg(long)]
    search_api_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = BrowserConfig {
        viewport_size: args.viewport_size,
        downloads_folder: args.downloads_folder,
        search_api_key: args
            .search_api_key
            .or_else(|| std::env::var("SEARCH_API_KEY").ok()),
        ..BrowserConfig::default()
    };
    let mut browser = Browser::new(config)?;

    if let Some(address) = args.address {
        // Single visit mode
        println!("{}", browser.visit_page(&address)?);
        return Ok(());
    }

    // Interactive mode
    println!("text-browser (open <address>, up, down, quit)");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "exit" | "quit" => break,
            "up" => {
                browser.page_up();
                print_viewport(&browser);
            }
            "down" => {
                browser.page_down();
                print_viewport(&browser);
            }
            _ => {
                if let Some(address) = input.strip_prefix("open ") {
                    match browser.visit_page(address.trim()) {
                        Ok(_) => print_viewport(&browser),
                        Err(err) => eprintln!("Error: {err}"),
                    }
                } else {
                    println!("Unknown command. Use: open <address>, up, down, quit");
                }
            }
        }
    }

    Ok(())
}

fn print_viewport(browser: &Browser) {
    let title = browser.page_title().unwrap_or("(untitled)");
    println!(
        "{} | {} | page {}/{}",
        title,
        browser.address(),
        browser.current_page() + 1,
        browser.page_count()
    );
    println!("{}", browser.viewport());
}
