//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `brief_fetcher` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - Running the reactor until the fetch completes
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use std::cell::RefCell;
use std::process;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use brief_fetcher::config::{Opt, OutputFormat, EPOLL_BACKEND};
use brief_fetcher::initialization::init_logger_with;
use brief_fetcher::parse::{extract, links_to_json, links_to_strict_json};
use brief_fetcher::{ExtractError, FetchError, HttpClient, Reactor, Url};

/// Runs the request to completion. Returns the outcome together with the URL
/// it was served from, which differs from `url` after redirects.
fn fetch(url: &str) -> Result<(Result<String, FetchError>, Url)> {
    let reactor = Reactor::factory(EPOLL_BACKEND).context("Failed to create reactor")?;
    let client = HttpClient::new(&reactor, url).context("Failed to create HTTP client")?;

    let outcome = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);
    let weak_reactor = Rc::downgrade(&reactor);
    client.execute(move |result| {
        *sink.borrow_mut() = Some(result);
        if let Some(reactor) = weak_reactor.upgrade() {
            reactor.stop();
        }
    });

    if outcome.borrow().is_none() {
        reactor.start().context("Reactor failed")?;
    }
    let result = outcome.borrow_mut().take();
    let result = result.context("Reactor stopped before the request completed")?;
    Ok((result, client.url()))
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    init_logger_with(opt.log_level(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    info!("fetching {}", opt.url);
    let (result, final_url) = fetch(&opt.url)?;
    let body = match result {
        Ok(body) if !body.is_empty() => body,
        Ok(_) => {
            eprintln!("got empty contents. try verbose (-v) mode");
            process::exit(1);
        }
        Err(e) => {
            error!("fetch failed ({}): {e}", e.kind());
            eprintln!("got empty contents. try verbose (-v) mode");
            process::exit(1);
        }
    };

    if final_url.to_string() != opt.url {
        info!("page served from {final_url}");
    }
    let links = match extract(&body, &final_url.to_string()) {
        Ok(links) => links,
        Err(ExtractError::BriefNotFound) => {
            eprintln!("Unable to find Brief. try verbose (-v) mode");
            process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            eprintln!("Unable to extract Brief. try verbose (-v) mode");
            process::exit(1);
        }
    };

    let json = match opt.output {
        OutputFormat::Relaxed => links_to_json(&links)?,
        OutputFormat::Json => links_to_strict_json(&links)?,
    };
    println!("{json}");
    Ok(())
}
