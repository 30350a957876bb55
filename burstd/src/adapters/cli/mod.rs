// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "burstd",
    version,
    about,
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < BURSTD_CONFIG_PATH < command-line flags.\n\
If --config is omitted, burstd tries BURSTD_CONFIG_PATH, then the default config file location; missing default config is OK.\n\
Hooks read the ClassAd on stdin and print the result on stdout; logs go to stderr."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, burstd uses BURSTD_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the SQLite ledger file. Overrides `database_path` from the config file."
    )]
    pub database_path: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging and include logs from dependencies. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Job router translate hook: route ad, `------`, job ad on stdin.
    Translate {
        #[arg(
            long,
            value_name = "NAME",
            help = "Route name to use instead of the `name` attribute of the route ad."
        )]
        route: Option<String>,
    },
    /// Job router cleanup hook: destroys the infrastructure of the job ad on stdin.
    Cleanup,
    /// One pass over recently completed jobs still in the queue.
    ProcessQueue,
    /// One pass over completed jobs in the history spool.
    ProcessHistory,
    /// One workflow discovery and progress tick.
    Workflows,
    /// Run the queue, history and workflow passes on timers until interrupted.
    Daemon,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Translate { .. } => "translate",
            Command::Cleanup => "cleanup",
            Command::ProcessQueue => "process-queue",
            Command::ProcessHistory => "process-history",
            Command::Workflows => "workflows",
            Command::Daemon => "daemon",
        }
    }
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

const HELP_TEMPLATE: &str = r#"burstd {version}

{before-help}{about-with-newline}{usage-heading} {usage}
{after-help}

{all-args}
"#;

fn apply_help_template_recursively(cmd: &mut clap::Command) {
    let mut owned = std::mem::take(cmd);
    owned = owned.help_template(HELP_TEMPLATE);
    for sub in owned.get_subcommands_mut() {
        apply_help_template_recursively(sub);
    }
    *cmd = owned;
}

pub fn cli_command() -> clap::Command {
    let mut cmd = Opts::command();
    apply_help_template_recursively(&mut cmd);
    cmd
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    let opts = Opts::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let verbose_override = opts.verbose.then_some(true);
    ParsedOpts {
        opts,
        verbose_override,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opts {
        let matches = cli_command().try_get_matches_from(args).unwrap();
        Opts::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn translate_accepts_route_override() {
        let opts = parse(&["burstd", "translate", "--route", "cloud-a"]);
        assert_eq!(
            opts.command,
            Command::Translate {
                route: Some("cloud-a".into())
            }
        );
        assert_eq!(opts.command.name(), "translate");
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let opts = parse(&["burstd", "process-history", "-v", "--config", "/etc/burstd.toml"]);
        assert_eq!(opts.command, Command::ProcessHistory);
        assert!(opts.verbose);
        assert_eq!(opts.config, Some(PathBuf::from("/etc/burstd.toml")));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(cli_command().try_get_matches_from(["burstd"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        cli_command().debug_assert();
    }
}
