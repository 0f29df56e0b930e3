use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vibe_core::credential::{clear_credential, resolve_credential, save_credential};
use vibe_core::{CameraMode, RarityTable, StreakTracker};
use vibe_hw::export::parse_hex_color;
use vibe_hw::save_card;

mod config;
mod generator;
mod session;
mod store;
mod terminal;

use config::Config;
use session::{SessionOptions, SessionOutcome};
use store::SqliteStore;

#[derive(Parser)]
#[command(name = "vibe", about = "Vibe booth: capture, staged reveal, streaks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one capture-and-reveal session
    Session {
        /// Camera mode: solo requires a framed face, friends does not
        #[arg(short, long, default_value = "solo")]
        mode: CameraMode,
        /// Image file to use as the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Landmark script (JSON) driving the face gate
        #[arg(short, long)]
        landmarks: Option<PathBuf>,
        /// Pretend a centred face is in frame
        #[arg(long)]
        assume_face: bool,
        /// Do not speak the verdict
        #[arg(long)]
        mute: bool,
        /// No cue sounds
        #[arg(long)]
        quiet: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Save the photo with its verdict underneath as a PNG
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,
    },
    /// Record a visit and print the current streak
    Streak,
    /// Draw a rarity tier
    Rarity {
        /// Fixed draw in [0, 1) instead of a random one
        #[arg(long)]
        draw: Option<f64>,
    },
    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Show configuration and stored state
    Status,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store an API key
    Set { key: String },
    /// Remove the stored API key
    Clear,
    /// Show which key is in effect (masked)
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Session {
            mode,
            image,
            landmarks,
            assume_face,
            mute,
            quiet,
            json,
            save,
        } => {
            let mut store = SqliteStore::open(&config.db_path)?;
            let opts = SessionOptions {
                mode,
                image,
                landmarks,
                assume_face,
                mute,
                quiet,
            };
            match session::run(&config, opts, &mut store).await? {
                SessionOutcome::Revealed(result) => {
                    if let Some(path) = save {
                        let accent = parse_hex_color(result.rarity.color);
                        save_card(&path, &result.image.data, &result.description, accent)?;
                        println!("Saved {}", path.display());
                    }
                    if json {
                        let out = serde_json::json!({
                            "id": result.id.to_string(),
                            "mode": result.mode,
                            "rarity": result.rarity,
                            "description": result.description,
                        });
                        println!("{}", serde_json::to_string_pretty(&out)?);
                    }
                }
                SessionOutcome::Rejected => std::process::exit(2),
                SessionOutcome::Discarded => println!("Discarded."),
            }
        }
        Commands::Streak => {
            let store = SqliteStore::open(&config.db_path)?;
            let update = StreakTracker::new(store).record_visit(&chrono::Local::now());
            if update.is_new_day {
                println!("Streak: {} (visit recorded)", update.count);
            } else {
                println!("Streak: {} (already visited today)", update.count);
            }
        }
        Commands::Rarity { draw } => {
            let table = RarityTable::standard();
            let tier = match draw {
                Some(d) if !(0.0..1.0).contains(&d) => bail!("draw must be in [0, 1), got {d}"),
                Some(d) => table.select(d),
                None => table.roll(&mut rand::thread_rng()),
            };
            println!("{} ({}, p={})", tier.label, tier.id, tier.probability);
        }
        Commands::Key { action } => {
            let mut store = SqliteStore::open(&config.db_path)?;
            match action {
                KeyAction::Set { key } => {
                    if key.trim().is_empty() {
                        bail!("API key must not be empty");
                    }
                    save_credential(&mut store, &key)?;
                    println!("API key stored.");
                }
                KeyAction::Clear => {
                    clear_credential(&mut store)?;
                    println!("API key cleared.");
                }
                KeyAction::Show => match resolve_credential(config.api_key.clone(), &store) {
                    Some(cred) => println!("{} (from {:?})", cred.masked(), cred.source()),
                    None => println!("No API key; canned compliments will be used."),
                },
            }
        }
        Commands::Status => {
            let store = SqliteStore::open(&config.db_path)?;
            let credential = resolve_credential(config.api_key.clone(), &store);
            let keys = store.keys()?;
            let streak = StreakTracker::new(store).load();
            let out = serde_json::json!({
                "config": config,
                "stored_keys": keys,
                "streak": streak.map(|s| serde_json::json!({
                    "count": s.count,
                    "last_visit": s.last_visit.to_rfc3339(),
                })),
                "api_key": credential.map(|c| serde_json::json!({
                    "masked": c.masked(),
                    "source": format!("{:?}", c.source()),
                })),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
