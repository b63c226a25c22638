//! preload - one-shot injection of application data into a device OS image.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use preload_cli::classify;
use preload_cli::events::EventRouter;
use preload_cli::options::{Cli, Env, Options};
use preload_cli::provision;
use preload_cli::session::{self, SessionController, SessionOutcome, TermSignal};
use preload_engine::{EventSink, Preloader};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let env = Env::from_process();
    init_tracing(&env);

    // run() owns every per-run resource; both exits happen after it has
    // dropped them.
    match run(cli, env).await {
        RunEnd::Exit(code) => std::process::exit(code),
        RunEnd::Signalled(sig) => session::redeliver(sig),
    }
}

/// How the process ends.
enum RunEnd {
    Exit(i32),
    /// The captured signal is re-delivered once all resources are dropped.
    Signalled(TermSignal),
}

async fn run(cli: Cli, env: Env) -> RunEnd {
    let options = match Options::resolve(&cli, &env) {
        Ok(options) => options,
        Err(e) => return RunEnd::Exit(classify::report(&e)),
    };

    let clients = match provision::provision(&options, &env).await {
        Ok(clients) => clients,
        Err(e) => return RunEnd::Exit(classify::report(&e)),
    };
    let provision::Clients {
        api,
        docker,
        work_dir,
    } = clients;
    // The API state store lives until the session is over.
    let _work_dir = work_dir;

    let sink: Arc<dyn EventSink> = Arc::new(EventRouter::new());
    let engine = Preloader::new(api, docker, options.engine_config(), sink);
    let controller = SessionController::new(engine);

    match controller.run(session::termination_signal()).await {
        SessionOutcome::Completed(Ok(())) => RunEnd::Exit(0),
        SessionOutcome::Completed(Err(e)) => RunEnd::Exit(classify::report(&e.into())),
        SessionOutcome::Interrupted(sig) => RunEnd::Signalled(sig),
    }
}

fn init_tracing(env: &Env) {
    let default_filter = if env.get("DEBUG").is_some_and(|v| !v.is_empty() && v != "0") {
        "preload_cli=debug,preload_api=debug,preload_docker=debug,preload_engine=debug"
    } else {
        "preload_cli=info,preload_api=info,preload_docker=info,preload_engine=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
