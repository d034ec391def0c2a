use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process;

use usage_overlay::engine::{OverlayEngine, ProcessFlag};
use usage_overlay::logging::init_logging;
use usage_overlay::models::{ModelUsage, UsageSnapshot};
use usage_overlay::overlay::BarColor;
use usage_overlay::testkit::{sample_page, sample_remote_config, ScriptedBackground};

#[derive(Parser)]
#[command(name = "usage-overlay")]
#[command(about = "Per-model token usage overlay engine with a scripted page simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a scripted page and print overlay frames
    Simulate {
        /// Number of poll ticks to simulate
        #[arg(long, default_value_t = 6)]
        ticks: u32,
        /// Tokens added to the active model per tick
        #[arg(long, default_value_t = 20_000)]
        step: u64,
        /// Simulate a portrait (mobile) viewport
        #[arg(long)]
        mobile: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Simulate {
        ticks: 6,
        step: 20_000,
        mobile: false,
    }) {
        Commands::Simulate { ticks, step, mobile } => match simulate(ticks, step, mobile).await {
            Ok(_) => Ok(()),
            Err(e) => {
                eprintln!("Failed to initialize usage overlay: {e:#}");
                process::exit(1);
            }
        },
    }
}

async fn simulate(ticks: u32, step: u64, mobile: bool) -> Result<()> {
    println!("Starting usage overlay simulation ({ticks} ticks)");
    println!();

    let page = sample_page();
    // The override selector resolves detection on its first probe, keeping
    // simulated ticks from spending the full picker wait budget.
    page.set_selected_option("#model-override", "Claude Opus 4");
    if mobile {
        page.set_viewport(400, 800);
    }

    let background = ScriptedBackground::new(sample_remote_config());
    background.set_data(UsageSnapshot::default());

    let flag = ProcessFlag::new();
    let Some(mut engine) = OverlayEngine::bootstrap(page.clone(), background.clone(), &flag).await?
    else {
        println!("Duplicate instance detected, nothing to do");
        return Ok(());
    };

    if let Some(notice) = engine.version_notice() {
        match &notice.previous {
            Some(previous) => println!("Updated from v{} to v{}", previous, notice.current),
            None => println!("Welcome to the usage tracker! You're on v{}", notice.current),
        }
        println!();
    }

    let mut total = 0u64;
    for tick in 1..=ticks {
        // Halfway through, the scripted user opens a conversation.
        if tick == ticks / 2 + 1 {
            page.set_path("/chat/demo-conversation");
        }
        total += step;
        background.set_conversation_data(
            "demo-conversation",
            UsageSnapshot {
                conversation_length: Some(step),
                model_data: std::collections::HashMap::from([(
                    "opus".to_string(),
                    ModelUsage {
                        total,
                        message_count: tick as u64,
                        reset_timestamp: None,
                    },
                )]),
            },
        );

        engine.poll_tick().await?;
        print_frame(tick, &engine);
    }

    println!("Simulation complete.");
    Ok(())
}

fn print_frame<P, B>(tick: u32, engine: &OverlayEngine<P, B>)
where
    P: usage_overlay::page::HostPage,
    B: usage_overlay::background::BackgroundChannel,
{
    let pipeline = engine.pipeline();
    let location = match engine.current_conversation() {
        Some(id) => format!("conversation {id}"),
        None => "home".to_string(),
    };

    println!("--- tick {tick} ({location}) ---");
    println!("{}", pipeline.header().estimate_text);
    println!("{}", pipeline.header().cost_text);

    for section in pipeline.sections_ordered() {
        if !section.visible {
            continue;
        }
        let dot = if section.is_active { "*" } else { " " };
        let name = format!("{dot} {}", section.model);
        if section.is_collapsed {
            println!("{name} (collapsed)");
            continue;
        }

        let filled = (section.bar_width_pct / 10.0).round() as usize;
        let bar: String = "#".repeat(filled) + &"-".repeat(10usize.saturating_sub(filled));
        let bar = match section.bar_color {
            BarColor::Warning => bar.as_str().red().to_string(),
            BarColor::Normal => bar.as_str().blue().to_string(),
        };
        println!("{name} [{bar}] {}", section.last_tooltip);
        println!("    {} | {}", section.counter_text, section.reset_text);
    }
    println!();
}
