use std::path::Path;

use anyhow::{Context as _, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;
use serde_json::Value;
use stepstack_engine::{Accumulator, Context, Stack, StackRuntime, load_config, load_config_from_path};
use stepstack_util::init_tracing;
use tracing::info;

mod samples;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => load_config_from_path(Path::new(path))?,
        None => load_config()?,
    };
    init_tracing(&config.log_filter);

    let runtime = StackRuntime::new(config);
    let stacks = runtime.load(samples::modules()).context("failed to load sample stacks")?;

    match matches.subcommand() {
        Some(("list", _)) => list_stacks(&stacks),
        Some(("run", sub)) => run_stack(&runtime, sub).await,
        _ => {
            println!("Available subcommands: list, run");
            Ok(())
        }
    }
}

fn build_cli() -> Command {
    Command::new("stepstack")
        .about("Run step-stack pipelines")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .action(ArgAction::Set)
                .help("Path to a YAML or JSON configuration file"),
        )
        .subcommand(Command::new("list").about("List the bundled stacks"))
        .subcommand(
            Command::new("run")
                .about("Execute a bundled stack and print its result")
                .arg(Arg::new("name").required(true).help("Stack name"))
                .arg(
                    Arg::new("context")
                        .long("context")
                        .action(ArgAction::Set)
                        .help("Context as a JSON object"),
                )
                .arg(
                    Arg::new("accumulator")
                        .long("accumulator")
                        .action(ArgAction::Set)
                        .help("Initial accumulator as a JSON object"),
                ),
        )
}

fn list_stacks(stacks: &IndexMap<String, Stack>) -> Result<()> {
    for (name, stack) in stacks {
        println!("{name}: {}", stack.steps().join(" -> "));
        for warning in stack.warnings() {
            println!("  warning: {warning}");
        }
    }
    Ok(())
}

async fn run_stack(runtime: &StackRuntime, matches: &ArgMatches) -> Result<()> {
    let name = matches.get_one::<String>("name").context("expected a stack name")?;
    let context = json_arg(matches, "context")?.map(Context::try_from).transpose()?;
    let accumulator = json_arg(matches, "accumulator")?.map(Accumulator::try_from).transpose()?;

    let value = runtime.execute(name, context, accumulator).await?;
    info!(stack = %name, has_value = value.is_some(), "stack finished");
    println!("{}", serde_json::to_string_pretty(&value.unwrap_or(Value::Null))?);
    Ok(())
}

fn json_arg(matches: &ArgMatches, id: &str) -> Result<Option<Value>> {
    matches
        .get_one::<String>(id)
        .map(|raw| serde_json::from_str(raw).with_context(|| format!("--{id} must be valid JSON")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_arguments() {
        let matches = build_cli()
            .try_get_matches_from(["stepstack", "run", "nine", "--accumulator", r#"{"y":"nine"}"#, "--config", "cfg.yaml"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("config").map(String::as_str), Some("cfg.yaml"));

        let (command, sub) = matches.subcommand().unwrap();
        assert_eq!(command, "run");
        assert_eq!(json_arg(sub, "accumulator").unwrap(), Some(serde_json::json!({"y": "nine"})));
        assert_eq!(json_arg(sub, "context").unwrap(), None);
    }

    #[test]
    fn rejects_invalid_json() {
        let matches = build_cli()
            .try_get_matches_from(["stepstack", "run", "nine", "--context", "{oops"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert!(json_arg(sub, "context").is_err());
    }
}
