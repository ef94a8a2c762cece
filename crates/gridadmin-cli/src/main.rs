// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use gridadmin_api::Client;
use gridadmin_app::Session;
use gridadmin_db::Store;
use runtime::HttpRuntime;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let mut config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `gridadmin --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;
    options.apply_overrides(&mut config);

    init_logging(&config)?;

    let state_path = config.state_path()?;
    let store = Store::open(&state_path).with_context(|| {
        format!(
            "open state store {} -- if this path is wrong, set [storage].state_path or GRIDADMIN_STATE_PATH",
            state_path.display()
        )
    })?;
    store.bootstrap()?;

    let client = Client::new(config.base_url(), config.backend_timeout()?).with_context(|| {
        format!(
            "invalid [backend] config in {}; fix base_url/timeout values",
            options.config_path.display()
        )
    })?;
    let unmatched = config.unmatched_names()?;
    log::info!(
        "[STARTUP] backend {}, state {}, {} unmatched name(s)",
        client.base_url(),
        state_path.display(),
        unmatched.len()
    );

    if options.check_only {
        let schema = client.ping()?;
        println!(
            "backend {} ok: {} tables, {} views",
            client.base_url(),
            schema.tables.len(),
            schema.views.len()
        );
        return Ok(());
    }

    let mut session = Session::new(config.reference_table(), unmatched, &config.export_dir());
    let mut runtime = HttpRuntime::new(client, store);
    gridadmin_tui::run_app(&mut session, &mut runtime)
}

/// Records go to a file: the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {} -- fix [log].file", path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level()))
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(|error| anyhow!("initialize logging: {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    base_url: Option<String>,
    unmatched_file: Option<String>,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

impl CliOptions {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.backend.base_url = Some(base_url.clone());
        }
        if let Some(file) = &self.unmatched_file {
            config.reconcile.unmatched_file = Some(file.clone());
        }
    }
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        base_url: None,
        unmatched_file: None,
        print_config_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--base-url" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--base-url requires a URL"))?;
                options.base_url = Some(value.as_ref().to_owned());
            }
            "--unmatched" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--unmatched requires a file path"))?;
                options.unmatched_file = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("gridadmin");
    println!("  --config <path>          Use a specific config path");
    println!("  --base-url <url>         Override [backend].base_url");
    println!("  --unmatched <path>       Override [reconcile].unmatched_file");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config + state store, ping the backend");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, Config, parse_cli_args};
    use anyhow::Result;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/gridadmin-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                base_url: None,
                unmatched_file: None,
                print_config_path: false,
                print_example: false,
                check_only: false,
                show_help: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_values() {
        for flag in ["--config", "--base-url", "--unmatched"] {
            let error = parse_cli_args(vec![flag], default_options_path())
                .expect_err("missing flag value should fail");
            assert!(error.to_string().contains(flag), "{flag}: {error}");
        }
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_sets_print_and_check_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-config-path", "--print-example-config", "--check"],
            default_options_path(),
        )?;
        assert!(options.print_config_path);
        assert!(options.print_example);
        assert!(options.check_only);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        let long = parse_cli_args(vec!["--help"], default_options_path())?;
        assert!(long.show_help);

        let short = parse_cli_args(vec!["-h"], default_options_path())?;
        assert!(short.show_help);
        Ok(())
    }

    #[test]
    fn overrides_replace_config_values() -> Result<()> {
        let options = parse_cli_args(
            vec![
                "--base-url",
                "http://stock.local:8080/api/",
                "--unmatched",
                "/tmp/names.txt",
            ],
            default_options_path(),
        )?;
        let mut config = Config::default();
        options.apply_overrides(&mut config);

        assert_eq!(config.base_url(), "http://stock.local:8080/api");
        assert_eq!(
            config.reconcile.unmatched_file.as_deref(),
            Some("/tmp/names.txt")
        );
        Ok(())
    }
}
