mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use smv_av::ToolRegistry;
use smv_core::config::Config;
use smv_core::{BackgroundKind, BackgroundSpec, JobRequest, JobState, OutputOptions, SpeedSpec};
use smv_server::context::AppContext;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "spedup_mv=trace,smv_server=debug,smv_pipeline=trace,smv_av=debug,smv_core=debug,tower_http=debug"
                .to_string()
        } else {
            "spedup_mv=info,smv_server=info,smv_pipeline=info,smv_av=info,smv_core=info,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(smv_server::start(config))?;
            Ok(())
        }
        Commands::Run {
            source,
            background,
            looping,
            speed,
            title,
            overlay,
            manifest,
            output_dir,
            json,
        } => {
            let kind = if looping {
                BackgroundKind::Looping
            } else {
                BackgroundKind::Static
            };
            let request = JobRequest {
                source_locator: source,
                title,
                background: BackgroundSpec {
                    kind,
                    locator: background,
                },
                speed: SpeedSpec::parse(&speed)?,
                output_options: OutputOptions {
                    overlay_text: overlay,
                    keep_manifest: manifest,
                    output_dir,
                    ..OutputOptions::default()
                },
            };
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_job(config, request, json))
        }
        Commands::Capabilities { json } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(show_capabilities(config, json))
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref());
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

async fn run_job(config: Config, request: JobRequest, json: bool) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let ctx = AppContext::initialize(config).await?;
    let status = ctx.executor.run(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    match status.state {
        JobState::Complete => {
            if !json {
                let output = status.output_path.unwrap_or_default();
                println!("Output: {}", output.display());
            }
            Ok(())
        }
        _ => anyhow::bail!("{}", status.message),
    }
}

async fn show_capabilities(config: Config, json: bool) -> Result<()> {
    let ctx = AppContext::initialize(config).await?;
    let pipeline = ctx.pipeline();

    if json {
        let value = serde_json::json!({
            "hwAccel": pipeline.encoding.hw_accel,
            "capabilities": pipeline.capabilities,
            "encoders": pipeline.encoders,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Policy: {}", pipeline.encoding.hw_accel);
    println!("\nHardware acceleration methods: {}", pipeline.capabilities.hwaccels.len());
    for method in &pipeline.capabilities.hwaccels {
        println!("  {method}");
    }
    println!("\nEncoder ladder:");
    for (i, profile) in pipeline.encoders.iter().enumerate() {
        print!("  {}. {} ({})", i + 1, profile.id, profile.encoder);
        if let Some(ref hwaccel) = profile.hwaccel {
            print!(" -hwaccel {hwaccel}");
        }
        println!();
    }
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let timeout = Duration::from_secs(config.encoding.tool_timeout_secs);
    let tools = ToolRegistry::discover(&config.tools, timeout);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Hardware acceleration: {}", config.encoding.hw_accel);
    println!("  Output dir: {}", display_dir(&config.output.dir));
    for warning in config.validate() {
        println!("  warning: {warning}");
    }
    Ok(())
}

fn display_dir(dir: &Path) -> String {
    if dir.as_os_str().is_empty() {
        ".".into()
    } else {
        dir.display().to_string()
    }
}
