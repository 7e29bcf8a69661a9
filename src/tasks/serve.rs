//! `serve` and `serve-dist` tasks: the proxy servers.

use super::{TaskEnv, TaskError};
use crate::build::TaskOutput;
use crate::server::{shutdown_signal, DevServer, Reloader, ServerError, ServerOptions};
use crate::watch::{WatchError, WatchSession};
use tokio::runtime::Runtime;

impl From<ServerError> for TaskError {
    fn from(e: ServerError) -> Self {
        TaskError::Server(e.to_string())
    }
}

impl From<WatchError> for TaskError {
    fn from(e: WatchError) -> Self {
        TaskError::Server(e.to_string())
    }
}

fn runtime() -> Result<Runtime, TaskError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| TaskError::Server(format!("cannot start runtime: {}", e)))
}

/// Proxy the dev virtual host with live reload until interrupted.
///
/// The server runs on a tokio runtime while this thread watches the
/// source tree. Task runs triggered by the watcher belong to the dev
/// session, so lint problems are reported without failing the run.
pub fn run(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let context = env.context.clone().with_dev_session(true);
    let options = ServerOptions::dev(&context.config().server);
    let reloader = Reloader::new(options.reload_delay);

    let rt = runtime()?;
    let server = rt.block_on(DevServer::bind(options, reloader.clone()))?;
    for line in server.banner() {
        println!("{}", line);
    }
    let server = rt.spawn(server.serve(shutdown_signal()));

    let session = WatchSession::new(&context, env.graph, env.reporter)?;
    let handle = rt.handle().clone();
    let reload = || {
        let reloader = reloader.clone();
        handle.spawn(async move {
            reloader.reload().await;
        });
    };
    session.run(&reload, &|| server.is_finished())?;

    match rt.block_on(server) {
        Ok(result) => result?,
        Err(e) => return Err(TaskError::Server(e.to_string())),
    }
    Ok(TaskOutput::default())
}

/// Proxy the production virtual host until interrupted.
pub fn run_dist(env: &TaskEnv<'_>) -> Result<TaskOutput, TaskError> {
    let options = ServerOptions::dist(&env.context.config().server);
    let reloader = Reloader::new(options.reload_delay);

    let rt = runtime()?;
    rt.block_on(async {
        let server = DevServer::bind(options, reloader).await?;
        for line in server.banner() {
            println!("{}", line);
        }
        server.serve(shutdown_signal()).await
    })?;
    Ok(TaskOutput::default())
}
