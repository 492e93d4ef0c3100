//! Clusternet network CLI (netctl)

use anyhow::Result;
use clap::Parser;
use clusternet_cli::cli::{Cli, Commands};
use clusternet_cli::commands::network::UpdateRequest;
use clusternet_cli::commands::{ClusterCommand, NetworkCommand};
use clusternet_cli::context::CliContext;
use clusternet_config::Settings;

async fn run(cli: &Cli) -> Result<String> {
    let settings = Settings::load(cli.config.as_deref())?;
    let context = CliContext::bootstrap(settings, cli.dry_run).await?;

    let networks = NetworkCommand::new(context.clone(), cli.project.clone(), cli.format);
    let cluster = ClusterCommand::new(context.clone(), cli.format);

    match &cli.command {
        Commands::Define(args) => networks.define(args.clone()).await,
        Commands::Create(args) => networks.create(args.clone()).await,
        Commands::Start { name } => networks.start(name).await,
        Commands::Stop { name } => networks.stop(name).await,
        Commands::Update {
            name,
            set,
            unset,
            description,
            target,
        } => {
            let request = UpdateRequest {
                set: set.clone(),
                unset: unset.clone(),
                description: description.clone(),
                target: target.clone(),
            };
            networks.update(name, request).await
        }
        Commands::Delete { name } => networks.delete(name).await,
        Commands::Rename { name, new_name } => networks.rename(name, new_name).await,
        Commands::List { all_projects } => networks.list(*all_projects).await,
        Commands::Show { name } => networks.show(name).await,
        Commands::Startup => cluster.startup().await,
        Commands::Shutdown => cluster.shutdown().await,
        Commands::Warnings => cluster.warnings().await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    match run(&cli).await {
        Ok(output) => {
            if !cli.quiet {
                println!("{}", output);
                if cli.dry_run {
                    println!("(dry run, nothing was changed)");
                }
            }
            log::info!("Command completed successfully");
        }
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {}", e);

                // Print error chain if in verbose mode
                if cli.verbose || cli.debug {
                    for cause in e.chain().skip(1) {
                        eprintln!("  Caused by: {}", cause);
                    }
                }
            }
            std::process::exit(1);
        }
    }
}
