//! CLI front-end for the diff application engine.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use patchwerk::{DiffEngine, EngineConfig, HunkStatus, PatchTool, PipelineStatus};
use tracing::error;

#[derive(Parser)]
#[command(name = "patchwerk", version, about = "Apply messy unified diffs without guessing wrong")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a patch file to a target file.
    Apply {
        /// File to patch.
        file: PathBuf,
        /// Path to the unified diff; reads stdin when omitted.
        #[arg(long)]
        patch: Option<PathBuf>,
        /// Apply the patch's reverse instead of its forward effect.
        #[arg(long)]
        reverse: bool,
        /// Emit the full PipelineResult as JSON instead of a text summary.
        #[arg(long)]
        json: bool,
    },
    /// Apply a combined multi-file patch rooted at a directory.
    ApplyAll {
        /// Directory the patch's paths are relative to.
        base_dir: PathBuf,
        #[arg(long)]
        patch: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Print the tool-calling seam's name/description/input schema as JSON.
    ToolSchema,
}

fn read_patch(patch: Option<PathBuf>) -> anyhow::Result<String> {
    match patch {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn print_summary(result: &patchwerk::PipelineResult) {
    println!("{}: {:?}", result.file_path.display(), result.status());
    for (id, tracker) in &result.hunks {
        let marker = match tracker.status {
            HunkStatus::Succeeded => "✓",
            HunkStatus::AlreadyApplied => "=",
            HunkStatus::Failed => "✗",
            HunkStatus::Skipped => "-",
            HunkStatus::Pending => "?",
        };
        print!("  {marker} hunk #{id} [{:?}]", tracker.status);
        if let Some(err) = &tracker.error_details {
            print!(" — {err}");
        }
        println!();
    }
}

fn main() -> ExitCode {
    patchwerk::init_tracing();
    let cli = Cli::parse();
    let engine = DiffEngine::new(EngineConfig::from_env());

    let results = match cli.command {
        Command::ToolSchema => {
            let tool = PatchTool::new(engine);
            let schema = tool.input_schema();
            let doc = serde_json::json!({
                "name": tool.name(),
                "description": tool.description(),
                "input_schema": {
                    "type": schema.schema_type,
                    "properties": schema.properties,
                    "required": schema.required,
                },
            });
            println!("{}", serde_json::to_string_pretty(&doc).unwrap());
            return ExitCode::SUCCESS;
        }
        Command::Apply { file, patch, reverse, json } => {
            let diff_text = match read_patch(patch) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "failed to read patch");
                    return ExitCode::FAILURE;
                }
            };
            let result = if reverse {
                engine.apply_reverse(&file, &diff_text)
            } else {
                engine.apply(&file, &diff_text)
            };
            if json {
                print_json(&result);
            } else {
                print_summary(&result);
            }
            vec![result]
        }
        Command::ApplyAll { base_dir, patch, json } => {
            let diff_text = match read_patch(patch) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "failed to read patch");
                    return ExitCode::FAILURE;
                }
            };
            let results = engine.apply_combined(&base_dir, &diff_text);
            for result in &results {
                if json {
                    print_json(result);
                } else {
                    print_summary(result);
                }
            }
            results
        }
    };

    let any_error = results.iter().any(|r| r.status() == PipelineStatus::Error);
    if any_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_json(result: &patchwerk::PipelineResult) {
    let summary = serde_json::json!({
        "file": result.file_path.display().to_string(),
        "status": format!("{:?}", result.status()),
        "changes_written": result.changes_written,
        "succeeded": result.succeeded(),
        "failed": result.failed(),
        "already_applied": result.already_applied(),
        "error": result.error,
    });
    println!("{}", serde_json::to_string_pretty(&summary).unwrap());
}
