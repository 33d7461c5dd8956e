use log::{error, info};
use std::env;
use std::process;
use std::sync::Arc;

mod controllers;
mod models;
mod utils;
mod workflows;

use controllers::kubernetes::KubeCluster;
use models::config::RunnerConfig;
use models::outcome::Outcome;
use models::task::JobTask;
use utils::error::Error;
use utils::sink::{LogWriter, ReportSink};
use workflows::lifecycle::JobLifecycle;

const USAGE: &str = "usage: kube-job-runner <task.json> | --schema";

#[tokio::main]
async fn main() {
    env_logger::init();

    let argument = match env::args().nth(1) {
        Some(argument) => argument,
        None => {
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    if argument == "--schema" {
        let schema = schemars::schema_for!(JobTask);
        match serde_json::to_string_pretty(&schema) {
            Ok(schema) => println!("{}", schema),
            Err(err) => {
                error!("{}", err);
                process::exit(1);
            }
        }
        return;
    }

    match run(&argument).await {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(outcome) => println!("{}", outcome),
            Err(err) => {
                error!("{}", err);
                process::exit(1);
            }
        },
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    }
}

/// Loads the task at `path` and runs it against the cluster. The cluster session lives for
/// exactly this call.
async fn run(path: &str) -> Result<Outcome, Error> {
    let config = RunnerConfig::from_env()?;
    let task = JobTask::from_json(&std::fs::read_to_string(path)?)?;

    let cluster = KubeCluster::connect(&task.connection, config.poll_interval).await?;
    let (sink, drain) = ReportSink::spawn(LogWriter);

    info!("running job task {} in namespace {}", path, task.namespace);
    let lifecycle = JobLifecycle::new(Arc::new(cluster), task, config, sink);
    let result = lifecycle
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("unable to listen for interrupts: {}", err);
                futures::future::pending::<()>().await;
            }
        })
        .await;

    // every sink clone is gone once the run returns; flush what is left
    if drain.await.is_err() {
        error!("report sink stopped unexpectedly");
    }

    result
}
