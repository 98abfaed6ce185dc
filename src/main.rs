mod cli;

use photoforge::{clean, config};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use pf_core::events::ChannelSink;
use pf_core::{Device, ProfileId};
use pf_pipeline::{PipelineOrchestrator, ProfileStore, RunContext, RunRequest, Step};
use pf_tools::ToolRegistry;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct RunArgs {
    dataset: PathBuf,
    result: PathBuf,
    profile: Option<String>,
    device: Option<Device>,
    clean: bool,
    json: bool,
}

async fn run_reconstruction(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let profile = args
        .profile
        .as_deref()
        .map(ProfileId::parse_or_default)
        .unwrap_or(config.pipeline.profile);
    let device = args.device.unwrap_or(config.pipeline.device);

    let orchestrator = PipelineOrchestrator::from_config(&config)?;

    // Tool output goes to stdout, or to stderr when stdout carries JSON.
    let (sink, mut rx) = ChannelSink::new();
    let to_stderr = args.json;
    let printer = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if to_stderr {
                let mut err = std::io::stderr().lock();
                let _ = err.write_all(chunk.as_bytes());
            } else {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(chunk.as_bytes());
                let _ = out.flush();
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling pipeline");
            on_interrupt.cancel();
        }
    });

    let request = RunRequest::new(&args.dataset, &args.result)
        .with_profile(profile)
        .with_device(device);
    let ctx = RunContext::new(Arc::new(sink)).with_cancellation(cancel);

    let report = orchestrator.run(&request, &ctx).await;

    // Dropping the context closes the channel so the printer drains and exits.
    drop(ctx);
    printer.await?;

    if report.succeeded() && args.clean {
        let summary = clean::clean_result_dir(&report.result_dir)?;
        if !args.json {
            println!(
                "Cleaned {}: removed {} entries, kept {} files",
                report.result_dir.display(),
                summary.removed.len(),
                summary.kept.len()
            );
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("Run {} ({})", report.run_id, report.profile);
        println!(
            "  Stages executed: {}, skipped: {}",
            report.executed.len(),
            report.skipped.len()
        );
        if let Some(ref mesh) = report.result_mesh_path {
            println!("  Result: {}", mesh.display());
        }
    }

    if !report.succeeded() {
        let tail = report.output_tail();
        if !tail.is_empty() {
            eprintln!("\nLast output:");
            for line in tail {
                eprintln!("  {line}");
            }
        }
        let stage = report
            .failed_stage
            .map(|s| format!(" at {s}"))
            .unwrap_or_default();
        match report.error {
            Some(ref e) => anyhow::bail!("Pipeline {:?}{stage}: {e}", report.status),
            None => anyhow::bail!("Pipeline {:?}{stage}", report.status),
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "photoforge=debug,pf_pipeline=debug,pf_tools=debug,pf_core=debug".to_string()
        } else {
            "photoforge=info,pf_pipeline=info,pf_tools=warn,pf_core=warn".to_string()
        }
    });

    // Logs go to stderr; stdout is reserved for tool output and reports.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            dataset,
            result,
            profile,
            device,
            clean,
            json,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let args = RunArgs {
                dataset,
                result,
                profile,
                device,
                clean,
                json,
            };
            rt.block_on(run_reconstruction(args, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Profile { name, json } => show_profile(name.as_deref(), json, cli.config.as_deref()),
        Commands::Clean { result_dir } => clean_dir(&result_dir),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("photoforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        println!(" - {}", tool.path.display());
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Set [tools] in the config or add them to PATH.");
    }

    Ok(())
}

fn show_profile(name: Option<&str>, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let store = ProfileStore::builtin().with_overrides(&config.profiles)?;

    let profiles: Vec<ProfileId> = match name {
        Some(n) => vec![ProfileId::parse_or_default(n)],
        None => ProfileId::ALL.to_vec(),
    };

    if json {
        let mut out = serde_json::Map::new();
        for profile in &profiles {
            let mut steps = serde_json::Map::new();
            for step in Step::ALL {
                steps.insert(
                    step.as_str().to_string(),
                    serde_json::to_value(store.params(*profile, step))?,
                );
            }
            out.insert(
                profile.to_string(),
                serde_json::json!({
                    "skip_refine": store.skip_refine(*profile),
                    "steps": steps,
                }),
            );
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for profile in profiles {
        println!("{profile} (skip refine: {})", store.skip_refine(profile));
        for step in Step::ALL {
            let params = store.params(profile, step);
            let rendered: Vec<String> = params
                .iter()
                .map(|p| format!("{} {}", p.flag, p.value))
                .collect();
            println!("  {:<20} {}", step.as_str(), rendered.join(" "));
        }
        println!();
    }

    Ok(())
}

fn clean_dir(result_dir: &Path) -> Result<()> {
    let summary = clean::clean_result_dir(result_dir)?;
    for path in &summary.removed {
        println!("removed {}", path.display());
    }
    println!(
        "Removed {} entries, kept {} result files",
        summary.removed.len(),
        summary.kept.len()
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
            for warning in config.validate() {
                println!("  warning: {warning}");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            print_config(&config::Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    let show = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(PATH)".to_string())
    };
    println!("  COLMAP: {}", show(&config.tools.colmap_path));
    println!("  OpenMVS: {}", show(&config.tools.openmvs_bin_dir));
    println!(
        "  Profile: {}, device: {}",
        config.pipeline.profile, config.pipeline.device
    );
    println!("  Camera model: {}", config.pipeline.camera_model);
    println!("  Profile overrides: {}", config.profiles.len());
}
