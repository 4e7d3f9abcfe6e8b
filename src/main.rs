use clap::{Parser, Subcommand};
use std::path::PathBuf;

use siteinspect_lib::{InspectionOrchestrator, ProjectContext, Settings};

#[derive(Parser)]
#[command(name = "siteinspect", about = "Analyze inspection photos for building-code violations")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, env = "SITEINSPECT_CONFIG", default_value = "siteinspect.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one photo and print the result as JSON.
    Analyze {
        image: PathBuf,
        #[arg(long)]
        project_type: Option<String>,
        #[arg(long)]
        jurisdiction: Option<String>,
        /// Treat the photo as a plan/material upload (single attempt, no fallback).
        #[arg(long)]
        plan: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?.with_env_overrides();
    let orchestrator = InspectionOrchestrator::from_settings(&settings);

    match cli.command {
        Command::Analyze {
            image,
            project_type,
            jurisdiction,
            plan,
        } => {
            let defaults = settings.project_context();
            let project = ProjectContext {
                project_type: project_type.unwrap_or(defaults.project_type),
                jurisdiction: jurisdiction.unwrap_or(defaults.jurisdiction),
            };

            let analysis = if plan {
                orchestrator.analyze_plan(&image, project).await?
            } else {
                orchestrator.analyze(&image, project).await
            };

            if analysis.has_urgent_violation() {
                log::warn!("{}", analysis.narration);
            } else {
                log::info!("{}", analysis.narration);
            }
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
    }
    Ok(())
}
