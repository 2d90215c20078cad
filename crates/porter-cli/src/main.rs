//! Forum Porter CLI - Main entry point

use clap::Parser;
use porter_cli::{Cli, Commands};
use porter_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    // Ensure a command is provided
    if cli.command.is_none() {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    }

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("porter".to_string())
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env().unwrap_or_else(|_| LogConfig::builder().level(level).build());

    // The CLI works without logging
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> porter_cli::Result<()> {
    let Some(ref command) = cli.command else {
        return Ok(());
    };

    match command {
        Commands::Export {
            plan,
            source,
            prefix,
            output_dir,
            output,
            no_compress,
            tables,
            skip_blobs,
            skip_conversations,
            time_limit,
        } => {
            let args = porter_cli::commands::export::ExportArgs {
                plan: plan.clone(),
                source: source.clone(),
                prefix: prefix.clone(),
                output_dir: output_dir.clone(),
                output: output.clone(),
                compress: !no_compress,
                tables: tables.clone(),
                blobs: !skip_blobs,
                conversations: !skip_conversations,
                time_limit: *time_limit,
            };
            porter_cli::commands::export::run(args).await
        },

        Commands::Verify { plan, source, prefix } => {
            porter_cli::commands::verify::run(plan.clone(), source.clone(), prefix.clone()).await
        },

        Commands::Schema { table, json } => porter_cli::commands::schema::run(table.as_deref(), *json),

        Commands::Inspect { file, table, limit } => {
            porter_cli::commands::inspect::run(file.clone(), table.as_deref(), *limit)
        },
    }
}
