// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use newton_roller::accounts::{load_accounts, load_proxies};
use newton_roller::api::ApiClient;
use newton_roller::config::Settings;
use newton_roller::http::{ReqwestTransport, UserAgents};
use newton_roller::portal::Portal;
use newton_roller::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(author, version, about = "Daily dice roller for Magic Newton accounts", long_about = None)]
struct Args {
    /// One account per line: sessionToken|csrfToken
    #[arg(short, long, default_value = "data.txt")]
    data: PathBuf,

    /// One proxy per line, used when USE_PROXY=true
    #[arg(short, long, default_value = "proxy.txt")]
    proxies: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn build_scheduler(args: &Args) -> Result<Scheduler> {
    let settings = Settings::from_env();

    let accounts = load_accounts(&args.data).context("no accounts to run")?;

    let proxies = if settings.use_proxy {
        let proxies = load_proxies(&args.proxies);
        if proxies.is_empty() {
            warn!(file = %args.proxies.display(), "USE_PROXY is set but no proxies were loaded, going direct");
        } else {
            info!(count = proxies.len(), "proxies loaded");
        }
        proxies
    } else {
        info!("proxies disabled");
        Vec::new()
    };

    let transport = ReqwestTransport::new(settings.request_timeout, &proxies)?;
    let api = ApiClient::new(Arc::new(transport), UserAgents::default(), settings.backoff);
    let portal = Portal::new(api, settings.endpoints.clone(), settings.max_get_retries);

    Ok(Scheduler::new(portal, settings, accounts, proxies.len()))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    println!("\n{}", "=".repeat(64));
    println!("   Magic Newton Dice Roller");
    println!("{}\n", "=".repeat(64));

    let mut scheduler = match build_scheduler(&args) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("startup failed: {e:#}");
            std::process::exit(1);
        }
    };

    if args.once {
        let summary = scheduler.run_cycle().await;
        info!(accounts = summary.accounts, all_rolled = summary.all_rolled, "single cycle finished");
        return;
    }

    info!("bot will run continuously, press Ctrl+C to stop");
    let handle = tokio::spawn(async move { scheduler.run_forever().await });
    if let Err(e) = handle.await {
        error!("fatal error in main loop: {e}");
        std::process::exit(1);
    }
}
