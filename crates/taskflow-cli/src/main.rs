//! taskflow-cli: demonstrates `GraphFlow` + `Storage` wired end to end.
//!
//! A small demo binary wiring a graph flow up with in-memory collaborators
//! and running it once: builds a two-task graph flow, drives each task
//! through `add_task -> set_result_mapping -> save -> fetch`, and prints the
//! resolved results in topological order.

use std::collections::HashSet;

use clap::Parser;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use uuid::Uuid;

use taskflow_core::{Backend, FlowDetail, FlowItem, GraphFlow, NoBackend, ResultIndex, Storage};
use taskflow_persistence::InMemoryBackend;

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum BackendKind {
    /// No backend: mutations stay in memory for the process lifetime.
    None,
    /// `taskflow-persistence`'s dashmap-backed `InMemoryBackend`.
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "taskflow-cli", about = "Run a small demo graph flow")]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Which Backend to bind the demo Storage to
    #[arg(long, value_enum, default_value = "memory")]
    backend: BackendKind,
}

#[derive(Debug, Clone)]
struct DemoTask {
    name: String,
    requires: HashSet<String>,
    provides: HashSet<String>,
}

impl DemoTask {
    fn new(name: &str, requires: &[&str], provides: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            provides: provides.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FlowItem for DemoTask {
    fn name(&self) -> &str {
        &self.name
    }
    fn requires(&self) -> &HashSet<String> {
        &self.requires
    }
    fn provides(&self) -> &HashSet<String> {
        &self.provides
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    println!("taskflow-cli");
    println!("============");

    let fetch_input = DemoTask::new("fetch_input", &[], &["raw"]);
    let transform = DemoTask::new("transform", &["raw"], &["summary", "count"]);

    let mut flow = GraphFlow::new();
    flow.add([fetch_input.clone(), transform.clone()])?;

    let order: Vec<&DemoTask> = toposort(flow.graph(), None)
        .map_err(|cycle| anyhow::anyhow!("unexpected cycle at {:?}", cycle.node_id()))?
        .into_iter()
        .map(|idx| &flow.graph()[idx])
        .collect();

    match cli.backend {
        BackendKind::None => {
            let storage = Storage::new(FlowDetail::new(Uuid::new_v4()), None::<NoBackend>);
            run_demo(&order, storage)
        }
        BackendKind::Memory => {
            let storage = Storage::new(FlowDetail::new(Uuid::new_v4()), Some(InMemoryBackend::new()));
            run_demo(&order, storage)
        }
    }
}

fn run_demo<B: Backend>(order: &[&DemoTask], mut storage: Storage<B>) -> anyhow::Result<()> {
    for task in order {
        let uuid = Uuid::new_v4();
        storage.add_task(uuid, task.name())?;

        match task.name() {
            "fetch_input" => {
                let mut mapping = IndexMap::new();
                mapping.insert("raw".to_string(), ResultIndex::Whole);
                storage.set_result_mapping(uuid, mapping);
                storage.save_success(uuid, serde_json::json!("hello from taskflow"))?;
            }
            "transform" => {
                let raw = storage.fetch("raw")?;
                let text = raw.as_str().unwrap_or_default();
                let mut mapping = IndexMap::new();
                mapping.insert("summary".to_string(), ResultIndex::Position(0));
                mapping.insert("count".to_string(), ResultIndex::Position(1));
                storage.set_result_mapping(uuid, mapping);
                storage.save_success(uuid, serde_json::json!([text.to_uppercase(), text.split_whitespace().count()]))?;
            }
            other => unreachable!("unexpected demo task {other}"),
        }
    }

    println!("summary = {}", storage.fetch("summary")?);
    println!("count   = {}", storage.fetch("count")?);

    Ok(())
}
