use itemlist::cli::{Args, Command};
use itemlist::config::ListConfig;
use itemlist::core::commit::Immediate;
use itemlist::core::defaults;
use itemlist::core::diff::{DiffResult, EditOp};
use itemlist::{BuildController, Item, ListAdapter, PropValue};

use anyhow::{Context, Result, bail};
use clap::Parser;
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One entry of a JSON item list
#[derive(Debug, Deserialize)]
struct ItemEntry {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    view_type: i32,
    #[serde(default)]
    props: IndexMap<String, PropValue>,
}

impl ItemEntry {
    fn into_item(self, index: usize) -> Result<Arc<Item>> {
        let item = Item::plain(self.view_type);
        let mut item = match (self.id, self.key) {
            (Some(id), _) => item.with_id(id),
            (None, Some(key)) => item.with_key(&key),
            (None, None) => bail!("item {} has neither \"key\" nor \"id\"", index),
        };
        for (key, value) in self.props {
            item.set_prop(key, value)?;
        }
        item.seal().with_context(|| format!("item {}", index))
    }
}

/// JSON form of an edit operation
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum OpJson {
    Insert { position: usize, count: usize },
    Remove { position: usize, count: usize },
    Move { from: usize, to: usize },
    Change { position: usize, count: usize },
}

impl From<&EditOp> for OpJson {
    fn from(op: &EditOp) -> Self {
        match *op {
            EditOp::Insert { position, count } => OpJson::Insert { position, count },
            EditOp::Remove { position, count } => OpJson::Remove { position, count },
            EditOp::Move { from, to } => OpJson::Move { from, to },
            EditOp::Change { position, count, .. } => OpJson::Change { position, count },
        }
    }
}

fn load_items(path: &Path) -> Result<Vec<Arc<Item>>> {
    let json =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries: Vec<ItemEntry> =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_item(index))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("loading {}", path.display()))
}

fn init_logger(verbosity: u8) {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn run_diff(old: &Path, new: &Path, json: bool) -> Result<()> {
    let old_items = load_items(old)?;
    let new_items = load_items(new)?;
    info!("Diffing {} -> {} items", old_items.len(), new_items.len());

    let captured: Arc<Mutex<Option<DiffResult>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&captured);
    let sink = move |result: &DiffResult| {
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
    };
    let adapter = ListAdapter::new(Arc::new(sink), Arc::new(Immediate), Arc::new(Immediate));
    adapter
        .override_items(old_items)
        .with_context(|| format!("validating {}", old.display()))?;
    adapter
        .set_items(new_items)
        .with_context(|| format!("validating {}", new.display()))?;

    let Some(result) = captured.lock().unwrap_or_else(|e| e.into_inner()).take() else {
        bail!("no diff result was dispatched");
    };
    if result.replay() != result.next().to_vec() {
        bail!("replaying the operations did not reproduce the new list");
    }

    if json {
        let ops: Vec<OpJson> = result.ops().iter().map(OpJson::from).collect();
        println!("{}", serde_json::to_string_pretty(&ops)?);
    } else {
        for op in result.ops() {
            println!("{}", op);
        }
        println!(
            "{} ops, {} -> {} items",
            result.ops().len(),
            result.previous().len(),
            result.next().len()
        );
    }
    Ok(())
}

fn run_demo(config: &ListConfig, rounds: u32, delay_ms: u64) -> Result<()> {
    if !defaults::init(config).context("starting default executors")? {
        debug!("Default executors were already installed");
    }

    let round = Arc::new(AtomicU64::new(0));
    let source = Arc::clone(&round);
    let sink = |result: &DiffResult| {
        let summary: Vec<String> = result.ops().iter().map(|op| op.to_string()).collect();
        println!("committed {} items: [{}]", result.next().len(), summary.join(", "));
    };

    let controller = BuildController::with_defaults(
        move |scope| {
            // rotating window of ids, every third item changes with the round
            let r = source.load(Ordering::SeqCst) as i64;
            for id in r..r + 6 {
                let mut item = Item::plain((id % 2) as i32).with_id(id + 1);
                if id % 3 == 0 {
                    item.set_prop("round", r)?;
                }
                scope.add(item)?;
            }
            Ok(())
        },
        Arc::new(sink),
    )
    .context("starting controller")?;

    controller.request_build()?;
    for r in 1..=rounds as u64 {
        round.store(r, Ordering::SeqCst);
        controller.request_delayed_build_ms(delay_ms)?;
        std::thread::sleep(Duration::from_millis(delay_ms / 2));
    }

    // let the last debounced pass and its diff land
    std::thread::sleep(Duration::from_millis(delay_ms * 2 + 200));

    let (scheduled, finished) = controller.adapter().differ().generations();
    println!(
        "{} requests, {} build passes, generations scheduled {} / finished {}, {} items live",
        rounds + 1,
        controller.build_count(),
        scheduled,
        finished,
        controller.adapter().len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbosity);
    debug!("Command-line args: {:?}", args);

    let config = match &args.config {
        Some(path) => ListConfig::load(path).map_err(anyhow::Error::msg)?,
        None => ListConfig::default(),
    }
    .apply_env();
    debug!("Config: {:?}", config);

    match args.command {
        Command::Diff { old, new, json } => run_diff(&old, &new, json),
        Command::Demo { rounds, delay_ms } => run_demo(&config, rounds, delay_ms),
    }
}
