use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use crossbeam::channel::bounded;
use csemutex::config::{self, Config};
use log::debug;

use crate::test::{Test, TestGroup, TestName};


#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to tester config file. Built-in defaults are used if omitted
    #[arg(short, long)]
    config_path: Option<String>,
    /// Run the given group of tests
    #[arg(long, group = "test_mode")]
    test_group: Option<TestGroup>,
    /// Run the listed, individual tests
    #[arg(long, group = "test_mode", num_args = 1..)]
    tests: Option<Vec<TestName>>,
    /// Override the number of counter threads
    #[arg(long)]
    threads: Option<usize>,
    /// Override the number of iterations per counter thread
    #[arg(long)]
    iterations: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();

    //parse args
    let args = CliArgs::parse();
    let mut tester_config = match &args.config_path {
        Some(path) => config::parse_config(path).context("failed to parse tester config")?,
        None => Config::default(),
    };
    if let Some(v) = args.threads {
        tester_config.counters.threads = v;
    }
    if let Some(v) = args.iterations {
        tester_config.counters.iterations = v;
    }
    debug!("tester config: {:?}", tester_config);

    //instantiate tests
    let selected_tests: Vec<TestName> = match (args.test_group, args.tests) {
        (Some(group), _) => group.into(),
        (None, Some(v)) => v,
        (None, None) => TestGroup::All.into(),
    };
    debug!("selected_tests: {:?}", selected_tests);

    //mapping ctrl-c to channel
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("Error setting Ctrl-C handler")?;

    let tests: Vec<Box<dyn Test>> = selected_tests
        .iter()
        .map(|t| t.instantiate(&tester_config))
        .collect();

    //runs tests
    for t in tests.into_iter() {
        if rx.try_recv().is_ok() {
            bail!("aborted before test {}", t.get_name());
        }
        println!("Running test {}: {}", t.get_name(), t.get_description());
        if let Err(e) = t.run() {
            println!("{}", "FAILED".red());
            return Err(e.context(format!("Test {} failed", t.get_name())));
        }
        println!("{}", "SUCCESS".green());
    }

    Ok(())
}
