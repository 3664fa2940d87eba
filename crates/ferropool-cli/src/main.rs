#![doc = include_str!("../README.md")]

mod command;
mod config;
mod input;
mod telemetry;

use clap::Parser;
use command::CommandHandler;
use config::{CliArgs, Mode, RunConfig};
use core::time::Duration;
use ferropool::{BatchExecutor, Handler, WorkerPool};
use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use telemetry::init_telemetry;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<ExitCode> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(run(config));

    // A read blocked on stdin cannot be interrupted; do not wait for it.
    runtime.shutdown_background();

    Ok(if outcome? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Runs the configured mode. Returns `false` if any item failed or the run
/// was interrupted.
async fn run(config: RunConfig) -> anyhow::Result<bool> {
    log_startup_info(&config);

    let ctx = CancellationToken::new();
    tokio::spawn(shutdown_signal(ctx.clone(), config.timeout));

    let handler = CommandHandler::new(
        config.program.clone(),
        config.args.clone(),
        config.placeholder.clone(),
    );

    let succeeded = match config.mode {
        Mode::Batch => run_batch(&ctx, &config, handler).await?,
        Mode::Stream => run_stream(&ctx, &config, handler).await?,
    };

    let interrupted = ctx.is_cancelled();
    // Releases the signal listener.
    ctx.cancel();

    if interrupted {
        tracing::warn!("Run interrupted before all items were processed");
    }
    Ok(succeeded && !interrupted)
}

async fn run_batch(
    ctx: &CancellationToken,
    config: &RunConfig,
    handler: CommandHandler,
) -> anyhow::Result<bool> {
    let reader = input::open(config.input.as_deref()).await?;
    let items = tokio::select! {
        () = ctx.cancelled() => return Ok(false),
        items = input::collect(reader) => items?,
    };
    tracing::info!("Dispatching {} items", items.len());

    let executor = BatchExecutor::new(config.batch);
    match executor.execute(ctx, items, handler).await {
        Ok(()) => {
            tracing::info!("All items completed");
            Ok(true)
        }
        Err(e) => {
            tracing::error!("Batch failed: {e}");
            Ok(false)
        }
    }
}

async fn run_stream(
    ctx: &CancellationToken,
    config: &RunConfig,
    handler: CommandHandler,
) -> anyhow::Result<bool> {
    let reader = input::open(config.input.as_deref()).await?;
    let concurrency = config.batch.concurrency();

    // The pool drops handler errors, so the handler keeps its own tally.
    let failures = Arc::new(AtomicUsize::new(0));
    let tally = Arc::clone(&failures);
    let handler = Arc::new(handler);
    let pool = WorkerPool::new(concurrency, move |ctx: CancellationToken, item: String| {
        let handler = Arc::clone(&handler);
        let tally = Arc::clone(&tally);
        async move {
            let result = handler.handle(ctx, item.clone()).await;
            if let Err(e) = &result {
                tally.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Item {item:?} failed: {e}");
            }
            result
        }
    });

    let (tx, rx) = mpsc::channel(concurrency.saturating_mul(2));
    let feeder = tokio::spawn(input::forward(reader, tx, ctx.clone()));

    pool.start(ctx, rx).await;

    // The pool only returns once the channel is closed or the run is
    // cancelled, and the reader observes both.
    let read = feeder.await??;
    let failed = failures.load(Ordering::Relaxed);

    if failed == 0 {
        tracing::info!("All {read} items completed");
    } else {
        tracing::error!("{failed} of {read} items failed");
    }
    Ok(failed == 0)
}

fn log_startup_info(config: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting ferropool with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting ferropool in {:?} mode with concurrency {}",
            config.mode,
            config.batch.concurrency()
        );
    }
}

/// Cancels `ctx` on Ctrl+C, SIGTERM, or once `timeout` elapses. Returns
/// early if `ctx` is cancelled by someone else.
async fn shutdown_signal(ctx: CancellationToken, timeout: Option<Duration>) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            core::future::pending::<()>().await;
        }
    };

    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => core::future::pending().await,
        }
    };

    tokio::select! {
        () = ctx.cancelled() => return,
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = deadline => tracing::info!("Timeout of {:?} elapsed", timeout.unwrap_or_default()),
    }

    tracing::info!("Shutdown signal received, cancelling outstanding work...");
    ctx.cancel();
}
