use std::io::Write;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use feedvault::{
    CatalogStore, DataDir, Error, FsFeed, ProgressStore, StopFlag,
    cli::{AdAction, Cli, Command, ForwardArgs, ResetArgs, SearchArgs},
    config::Settings,
    error,
    forwarder::{self, ForwarderOptions},
    indexer::{self, IndexerOptions},
    search::{self, SearchParams},
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("FEEDVAULT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Index => cmd_index(&data_dir)?,
        Command::Forward(args) => cmd_forward(&data_dir, &args)?,
        Command::Search(args) => cmd_search(&data_dir, &args)?,
        Command::Count(args) => {
            let catalog = CatalogStore::open(&data_dir.catalog_db())?;
            println!("{}", search::count(&catalog, &args.query)?);
        }
        Command::Ad { action } => cmd_ad(&data_dir, &action)?,
        Command::Status(args) => cmd_status(&data_dir, args.json)?,
        Command::Reset(args) => cmd_reset(&data_dir, &args)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

/// Run a blocking loop on a worker thread with Ctrl-C wired to its stop
/// flag, so an interrupt lets the in-flight item finish cleanly.
fn run_interruptible<T, F>(task: F) -> error::Result<T>
where
    F: FnOnce(StopFlag) -> error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let stop = StopFlag::new();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let watcher_stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupt received, finishing in-flight work...");
                watcher_stop.trigger();
            }
        });

        tokio::task::spawn_blocking(move || task(stop))
            .await
            .map_err(|err| {
                Error::Transport(format!("worker thread failed: {err}"))
            })?
    })
}

fn cmd_index(data_dir: &DataDir) -> error::Result<()> {
    let settings = Settings::from_env()?;
    let feed = FsFeed::open(&settings.source.dir, settings.source.feed_id)?;
    let catalog = CatalogStore::open(&data_dir.catalog_db())?;
    let progress = ProgressStore::open(&data_dir.progress_db())?;
    let options = IndexerOptions {
        throttle: settings.index_throttle,
        ..IndexerOptions::default()
    };

    let summary = run_interruptible(move |stop| {
        indexer::run_indexer(&feed, &catalog, &progress, &options, &stop)
    })?;

    eprintln!(
        "Indexed {} new item(s), {} duplicate(s), {} skipped{}",
        summary.inserted,
        summary.duplicates,
        summary.skipped,
        if summary.drained {
            " (feed drained)"
        } else {
            " (interrupted)"
        }
    );
    Ok(())
}

fn cmd_forward(data_dir: &DataDir, args: &ForwardArgs) -> error::Result<()> {
    let settings = Settings::from_env()?;
    let target_location = settings.target()?;
    let source =
        FsFeed::open(&settings.source.dir, settings.source.feed_id)?;
    let target =
        FsFeed::open(&target_location.dir, target_location.feed_id)?;
    let catalog = CatalogStore::open(&data_dir.catalog_db())?;
    let progress = ProgressStore::open(&data_dir.progress_db())?;
    let options = ForwarderOptions {
        max_bytes: args.max_bytes.unwrap_or(settings.max_forward_bytes),
        throttle: settings.forward_throttle,
        ..ForwarderOptions::default()
    };

    let summary = run_interruptible(move |stop| {
        forwarder::run_forwarder(
            &source, &target, &catalog, &progress, &options, &stop,
        )
    })?;

    eprintln!(
        "Forwarded {} item(s), {} skipped, {} failed{}",
        summary.forwarded,
        summary.skipped,
        summary.failed,
        if summary.completed {
            ""
        } else {
            " (interrupted)"
        }
    );
    Ok(())
}

fn cmd_search(data_dir: &DataDir, args: &SearchArgs) -> error::Result<()> {
    let catalog = CatalogStore::open(&data_dir.catalog_db())?;
    let page = search::execute_search(
        &catalog,
        &SearchParams {
            query: args.query.clone(),
            limit: args.limit,
            offset: args.offset,
        },
    )?;

    if args.json {
        println!("{}", serde_json::to_string(&page)?);
    } else {
        search::format_human(&page);
    }
    Ok(())
}

fn cmd_ad(data_dir: &DataDir, action: &AdAction) -> error::Result<()> {
    let progress = ProgressStore::open(&data_dir.progress_db())?;
    match action {
        AdAction::Get => {
            let value = progress.ad_text()?;
            if value.is_empty() {
                println!("No ad text set.");
            } else {
                println!("{value}");
            }
        }
        AdAction::Set { value } => {
            progress.set_ad_text(value)?;
            println!("Ad text updated.");
        }
    }
    Ok(())
}

fn cmd_status(data_dir: &DataDir, json: bool) -> error::Result<()> {
    let catalog = CatalogStore::open(&data_dir.catalog_db())?;
    let progress = ProgressStore::open(&data_dir.progress_db())?;

    let entries = catalog.len()?;
    let checkpoints = progress.list_checkpoints()?;
    let tallies = progress.forward_tallies()?;
    let ad_text = progress.ad_text()?;

    if json {
        let checkpoint_values: Vec<serde_json::Value> = checkpoints
            .iter()
            .map(|(feed_id, item_id, updated_at)| {
                serde_json::json!({
                    "feed_id": feed_id,
                    "last_item_id": item_id,
                    "updated_at": updated_at,
                })
            })
            .collect();
        let report = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "entries": entries,
            "checkpoints": checkpoint_values,
            "forward_records": tallies,
            "ad_text_set": !ad_text.is_empty(),
        });
        println!("{report}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Catalog entries: {entries}");
        if checkpoints.is_empty() {
            println!("Checkpoints: none");
        } else {
            println!("Checkpoints:");
            for (feed_id, item_id, _) in &checkpoints {
                println!("  feed {feed_id}: item {item_id}");
            }
        }
        println!(
            "Forward records: {} success, {} skipped, {} failed",
            tallies.success, tallies.skipped, tallies.failed
        );
        println!(
            "Ad text: {}",
            if ad_text.is_empty() { "not set" } else { "set" }
        );
    }
    Ok(())
}

fn cmd_reset(data_dir: &DataDir, args: &ResetArgs) -> error::Result<()> {
    let mut targets = Vec::new();
    if args.index_progress {
        targets.push("indexer checkpoints");
    }
    if args.forward_history {
        targets.push("forward records");
    }
    if args.catalog {
        targets.push("the whole catalog");
    }
    if targets.is_empty() {
        return Err(Error::Config(
            "nothing to reset: pass --index-progress, --forward-history \
             and/or --catalog"
                .to_string(),
        ));
    }

    if !args.yes {
        eprintln!("This permanently deletes: {}.", targets.join(", "));
        eprint!("Type 'yes' to confirm: ");
        std::io::stderr().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if answer.trim() != "yes" {
            eprintln!("Aborted.");
            return Ok(());
        }
    }

    let progress = ProgressStore::open(&data_dir.progress_db())?;
    if args.index_progress {
        progress.clear_checkpoints()?;
        eprintln!("Cleared indexer checkpoints.");
    }
    if args.forward_history {
        progress.clear_forward_records()?;
        eprintln!("Cleared forward records.");
    }
    if args.catalog {
        let catalog = CatalogStore::open(&data_dir.catalog_db())?;
        catalog.clear()?;
        eprintln!("Cleared the catalog.");
    }
    Ok(())
}
