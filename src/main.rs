use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use volume_backup_lib::cli::{Action, Cli};
use volume_backup_lib::config::Config;
use volume_backup_lib::orchestrator::{BackupTarget, Context};
use volume_backup_lib::process::SystemRunner;
use volume_backup_lib::schedule;
use volume_backup_lib::util::ThreadSleep;
use volume_backup_lib::wizard::{describe_backup, describe_status, StdioPrompter, Wizard};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    if let Err(e) = env_logger.try_init() {
        eprintln!("Initializing the logger failed: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> volume_backup_lib::Result<()> {
    let config = Config::load_or_init(&cli.config)?;
    let runner = SystemRunner;
    let sleeper = ThreadSleep;
    let ctx = Context {
        config: &config,
        runner: &runner,
        sleeper: &sleeper,
        invoking_user: cli.invoking_user(),
    };

    if let Some(destination) = &cli.auto_backup {
        let record = ctx.auto_backup(destination)?;
        log::info!("Backup created: {}", record.destination_path.display());
        return Ok(());
    }

    // cron calls the same binary
    let script = schedule::current_script()?;
    let target = |destination: &Option<String>| match destination {
        Some(destination) => BackupTarget::parse(destination),
        None => BackupTarget::Local(config.backup_dir.clone()),
    };
    let wizard = || Wizard::new(&ctx, StdioPrompter, &cli.config, &script);

    let Some(action) = &cli.action else {
        return wizard().run();
    };

    match action {
        Action::Backup { destination } => {
            let record = ctx.backup(&target(destination))?;
            println!("{}", record.destination_path.display());
        }
        Action::Restore { from, archive } => {
            wizard().restore(Some(target(from)), archive.clone())?;
        }
        Action::List { from } => {
            ctx.with_backups(&target(from), |dir, backups| {
                println!("{}:", dir.display());
                for record in &backups {
                    println!("  {}", describe_backup(record));
                }
                Ok(())
            })?;
        }
        Action::Schedule {
            frequency,
            destination,
        } => {
            let entry = ctx.schedule(*frequency, &target(destination), Path::new(&script))?;
            println!("{entry}");
        }
        Action::Remote => wizard().configure_remote()?,
        Action::Check => {
            let status = ctx.status()?;
            for line in describe_status(&config, &status) {
                println!("{line}");
            }
        }
        Action::Update { backup_first } => ctx.update(*backup_first)?,
        Action::Prune { dry_run } => {
            if *dry_run {
                log::warn!("Running in dry-run mode");
            }
            for record in ctx.prune(*dry_run)? {
                println!("{}", record.destination_path.display());
            }
        }
    }

    Ok(())
}
