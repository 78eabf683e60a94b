/*!
# Introduction

ai-pwn shows and changes who owns a Puppet module or hostgroup, as recorded by the ownership
service.

Owner names are canonicalised before they're stored: any `@REALM` suffix is dropped and the name
is lowercased. Hostgroup paths may be given with `/` between levels.

A valid Kerberos ticket is required; the tool exits with code 3 without one.
*/

#![deny(rust_2018_idioms)]

use aiclients::{PwnClient, Scope};
use aiconfig::Config;
use aienv::krb5::{self, Klist};
use argh::FromArgs;
use log::debug;
use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};
use snafu::{ensure, ResultExt};
use std::path::PathBuf;
use std::process;

use crate::error::Result;

mod error;

/// Shows and changes the owners of modules and hostgroups.
#[derive(FromArgs, Debug)]
struct Args {
    #[argh(option, default = "LevelFilter::Info")]
    /// filter level for log messages
    log_level: LevelFilter,

    #[argh(option, default = "PathBuf::from(aiconfig::DEFAULT_CONFIG_PATH)")]
    /// path to the configuration file
    config: PathBuf,

    #[argh(switch)]
    /// only log what would be changed
    dryrun: bool,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Commands {
    Show(Show),
    Add(Add),
    Remove(Remove),
    Set(Set),
    Delete(Delete),
}

/// Print the owners of an entity, one per line.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "show")]
struct Show {
    #[argh(positional)]
    /// module, hostgroup, host or hostname
    scope: Scope,

    #[argh(positional)]
    /// name of the module, hostgroup or host
    entity: String,
}

/// Append owners after the existing ones.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "add")]
struct Add {
    #[argh(positional)]
    /// module or hostgroup
    scope: Scope,

    #[argh(positional)]
    /// name of the module or hostgroup
    entity: String,

    #[argh(positional)]
    /// owners to add
    owners: Vec<String>,
}

/// Remove owners, keeping the others in order.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "remove")]
struct Remove {
    #[argh(positional)]
    /// module or hostgroup
    scope: Scope,

    #[argh(positional)]
    /// name of the module or hostgroup
    entity: String,

    #[argh(positional)]
    /// owners to remove
    owners: Vec<String>,
}

/// Replace the owners, creating the record if needed.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "set")]
struct Set {
    #[argh(positional)]
    /// module or hostgroup
    scope: Scope,

    #[argh(positional)]
    /// name of the module or hostgroup
    entity: String,

    #[argh(positional)]
    /// the new owners
    owners: Vec<String>,
}

/// Delete the ownership record.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "delete")]
struct Delete {
    #[argh(positional)]
    /// module or hostgroup
    scope: Scope,

    #[argh(positional)]
    /// name of the module or hostgroup
    entity: String,
}

fn non_empty(owners: &[String]) -> Result<()> {
    ensure!(
        owners.iter().any(|o| !o.trim().is_empty()),
        error::NoOwnersSnafu
    );
    Ok(())
}

fn execute(pwn: &PwnClient, command: Commands) -> Result<()> {
    match command {
        Commands::Show(show) => {
            let ownership = pwn
                .get_ownership(show.scope, &show.entity)
                .context(error::PwnSnafu)?;
            for owner in ownership.owners {
                println!("{}", owner);
            }
        }
        Commands::Add(add) => {
            non_empty(&add.owners)?;
            pwn.add_owners(add.scope, &add.entity, &add.owners)
                .context(error::PwnSnafu)?;
        }
        Commands::Remove(remove) => {
            non_empty(&remove.owners)?;
            pwn.remove_owners(remove.scope, &remove.entity, &remove.owners)
                .context(error::PwnSnafu)?;
        }
        Commands::Set(set) => {
            non_empty(&set.owners)?;
            pwn.update_or_create_ownership(set.scope, &set.entity, &set.owners)
                .context(error::PwnSnafu)?;
        }
        Commands::Delete(delete) => {
            pwn.delete_ownership(delete.scope, &delete.entity)
                .context(error::PwnSnafu)?;
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    // Logs go to stderr so `show` output can be piped.
    TermLogger::init(
        args.log_level,
        LogConfig::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context(error::LoggerSnafu)?;

    let config = Config::from_file(&args.config).context(error::ConfigSnafu)?;
    let ticket = krb5::verify_ticket(&Klist).context(error::KerberosSnafu)?;
    debug!("Running as {}", ticket.principal);

    let pwn = PwnClient::new(&config, args.dryrun).context(error::PwnSnafu)?;
    execute(&pwn, args.command)
}

// Returning a Result from main makes it print a Debug representation of the error, but with Snafu
// we have nice Display representations of the error, so we wrap "main" (run) and print any error.
// https://github.com/shepmaster/snafu/issues/110
fn main() {
    let args: Args = argh::from_env();
    if let Err(e) = run(args) {
        eprintln!("{}", e);
        process::exit(e.exit_code());
    }
}
