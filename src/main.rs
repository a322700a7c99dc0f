//! Boardwalk CLI - render swimlane diagrams onto collaboration boards.

use std::process;

use boardwalk::cli::{Cli, Commands, PlanCommands};
use boardwalk::commands::{self, Output};
use clap::Parser;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    if let Err(e) = run_command(cli.command, human) {
        if human {
            eprintln!("Error: {e}");
        } else {
            // json! escapes the multi-line plan validation messages
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn run_command(command: Commands, human: bool) -> Result<(), boardwalk::Error> {
    match command {
        Commands::Generate {
            plan,
            run_id,
            output_dir,
        } => {
            let result = commands::generate(&plan, run_id, &output_dir)?;
            output(&result, human);
        }

        Commands::Validate { ledger, plan } => {
            let result = commands::validate_run(&ledger, plan.as_deref())?;
            output(&result, human);
        }

        Commands::Cleanup { ledger, force } => {
            let result = commands::cleanup_run(&ledger, force)?;
            output(&result, human);
        }

        Commands::Plan { command } => match command {
            PlanCommands::Check { plan } => {
                let result = commands::plan_check(&plan)?;
                output(&result, human);
            }

            PlanCommands::Patch {
                plan,
                patch,
                in_place,
                out,
            } => {
                let result = commands::plan_patch(&plan, &patch, in_place, out.as_deref())?;
                output(&result, human);
            }
        },
    }
    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
