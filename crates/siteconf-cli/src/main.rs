use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;
use siteconf_core::{ChangeClass, PipelineConfig};
use siteconf_document::DocumentFormat;
use tracing_subscriber::EnvFilter;

mod commands;

fn cli() -> Command {
    let path_arg = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help(help)
    };
    let key_env_arg = Arg::new("key-env")
        .long("key-env")
        .value_name("VAR")
        .help("Environment variable holding the signing key (default from config)");

    Command::new("siteconf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Diff, patch, migrate and sign site configuration documents")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Pipeline configuration file (TOML)"),
        )
        .arg(
            Arg::new("yaml")
                .long("yaml")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print YAML instead of JSON"),
        )
        .subcommand(
            Command::new("diff")
                .about("Print the change list from BASE to TARGET")
                .arg(path_arg("base", "Base document (JSON or YAML)"))
                .arg(path_arg("target", "Target document (JSON or YAML)")),
        )
        .subcommand(
            Command::new("patch")
                .about("Apply a change list to a document")
                .arg(path_arg("base", "Base document (JSON or YAML)"))
                .arg(path_arg("changes", "Change list produced by `diff`")),
        )
        .subcommand(
            Command::new("migrate")
                .about("Rewrite legacy document fields into the current layout")
                .arg(path_arg("document", "Document to migrate"))
                .arg(
                    Arg::new("report")
                        .long("report")
                        .action(ArgAction::SetTrue)
                        .help("Also list the rules that fired"),
                ),
        )
        .subcommand(
            Command::new("bump")
                .about("Print the next version label")
                .arg(Arg::new("version").required(true).help("Current label"))
                .arg(
                    Arg::new("class")
                        .long("class")
                        .value_parser(["major", "minor", "patch"])
                        .help("Change class (default from config)"),
                ),
        )
        .subcommand(
            Command::new("compare")
                .about("Print -1, 0 or 1 comparing two version labels")
                .arg(Arg::new("v1").required(true))
                .arg(Arg::new("v2").required(true)),
        )
        .subcommand(
            Command::new("sign")
                .about("Sign an update draft and print the update record")
                .arg(path_arg("draft", "Draft with site_id, from_version, to_version, payload, actor"))
                .arg(key_env_arg.clone()),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify an update record's signature")
                .arg(path_arg("update", "Update record"))
                .arg(key_env_arg),
        )
}

fn path<'a>(args: &'a ArgMatches, name: &str) -> &'a Path {
    args.get_one::<PathBuf>(name)
        .map_or_else(|| Path::new(""), PathBuf::as_path)
}

fn text<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    args.get_one::<String>(name).map_or("", String::as_str)
}

fn load_config(matches: &ArgMatches) -> Result<PipelineConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run(matches: &ArgMatches) -> Result<Value> {
    let config = load_config(matches)?;

    match matches.subcommand() {
        Some(("diff", args)) => commands::diff(&config, path(args, "base"), path(args, "target")),
        Some(("patch", args)) => commands::patch(path(args, "base"), path(args, "changes")),
        Some(("migrate", args)) => commands::migrate(path(args, "document"), args.get_flag("report")),
        Some(("bump", args)) => {
            let class = match args.get_one::<String>("class") {
                Some(name) => name.parse::<ChangeClass>()?,
                None => config.default_change_class,
            };
            commands::bump(text(args, "version"), class)
        }
        Some(("compare", args)) => Ok(commands::compare(text(args, "v1"), text(args, "v2"))),
        Some(("sign", args)) => {
            let signer = commands::signer(&config, args.get_one::<String>("key-env").map(String::as_str))?;
            commands::sign(&signer, path(args, "draft"))
        }
        Some(("verify", args)) => {
            let signer = commands::signer(&config, args.get_one::<String>("key-env").map(String::as_str))?;
            commands::verify(&signer, path(args, "update"))
        }
        _ => anyhow::bail!("no subcommand given"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let output = run(&matches)?;

    let format = if matches.get_flag("yaml") {
        DocumentFormat::Yaml
    } else {
        DocumentFormat::Json
    };
    println!("{}", format.render(&output)?);
    Ok(())
}
