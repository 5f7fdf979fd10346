use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use log::{info, warn};

use engine::{Engine, StageOutcome};
use gateway::fallback::MergeOutcome;
use gateway::{GatewayConfig, HttpGateway};
use store::Library;
use workflow::{AiModel, Effect, MusicTrack, Step};

#[derive(Parser)]
#[command(name = "mangaflow-cli")]
#[command(about = "MangaFlow CLI - Turn manga pages into animated clips")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding projects.json and music_tracks.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project
    New {
        /// Project name
        name: String,
    },

    /// List all projects
    List,

    /// Show one project's workflow state
    Show {
        /// Project id
        project: String,
    },

    /// Delete a project
    Delete {
        /// Project id
        project: String,
    },

    /// Upload a manga page image into a project
    Upload {
        /// Project id
        project: String,

        /// Page image file (PNG or JPEG)
        file: PathBuf,
    },

    /// Detect panels on the uploaded page
    Detect {
        /// Project id
        project: String,
    },

    /// Select a detected panel by index
    Select {
        /// Project id
        project: String,

        /// Panel index (0-based)
        index: usize,
    },

    /// Colorize the selected panel
    Colorize {
        /// Project id
        project: String,

        /// Carry the panel forward without colorizing
        #[arg(long)]
        skip: bool,
    },

    /// Generate a fixed-effect animation (zoom, shake, reveal)
    Animate {
        /// Project id
        project: String,

        /// Effect name
        effect: String,
    },

    /// Generate an AI animation from a prompt
    AnimateAi {
        /// Project id
        project: String,

        /// Motion prompt
        prompt: String,

        /// Model (vidu, wan, cogvideox)
        #[arg(long, default_value = "vidu")]
        model: String,
    },

    /// List a project's saved animations
    Feed {
        /// Project id
        project: String,
    },

    /// Remove a saved animation
    DeleteClip {
        /// Project id
        project: String,

        /// Animation id
        animation: String,
    },

    /// Go back to an earlier workflow step
    Back {
        /// Project id
        project: String,

        /// Target step (upload, crop, colorize)
        step: String,
    },

    /// Merge a project's clips into one video
    Merge {
        /// Project id
        project: String,

        /// Music track id from the library
        #[arg(long)]
        music: Option<String>,

        /// Merge settings as inline JSON
        #[arg(long, default_value = "{}")]
        settings: String,
    },

    /// Manage the music track library
    Music {
        #[command(subcommand)]
        command: MusicCommands,
    },
}

#[derive(Subcommand)]
enum MusicCommands {
    /// Add a track to the library
    Add {
        /// Track name
        name: String,

        /// Track URL
        url: String,

        /// Artist name
        #[arg(long)]
        artist: Option<String>,

        /// Genre tag
        #[arg(long)]
        genre: Option<String>,
    },

    /// List library tracks
    List,

    /// Remove a track by id
    Remove {
        /// Track id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let data_dir = cli.data_dir.unwrap_or_else(store::default_data_dir);
    let api = Arc::new(HttpGateway::new(GatewayConfig::default())?);
    let mut engine = Engine::new(api, Library::open(&data_dir));

    match cli.command {
        Commands::New { name } => new_command(&mut engine, name),
        Commands::List => list_command(&engine),
        Commands::Show { project } => show_command(&engine, project),
        Commands::Delete { project } => {
            engine.delete_project(&project)?;
            info!("Deleted project {project}");
            Ok(())
        }
        Commands::Upload { project, file } => upload_command(&mut engine, project, file),
        Commands::Detect { project } => detect_command(&mut engine, project).await,
        Commands::Select { project, index } => {
            engine.select_panel(&project, index)?;
            info!("Selected panel {index}");
            Ok(())
        }
        Commands::Colorize { project, skip } => colorize_command(&mut engine, project, skip).await,
        Commands::Animate { project, effect } => {
            animate_command(&mut engine, project, effect).await
        }
        Commands::AnimateAi {
            project,
            prompt,
            model,
        } => animate_ai_command(&mut engine, project, prompt, model).await,
        Commands::Feed { project } => feed_command(&engine, project),
        Commands::DeleteClip { project, animation } => {
            if engine.delete_animation(&project, &animation)? {
                info!("Deleted animation {animation}");
            } else {
                warn!("No animation with id {animation}");
            }
            Ok(())
        }
        Commands::Back { project, step } => {
            engine.go_back(&project, parse_step(&step)?)?;
            info!("Went back to {step}");
            Ok(())
        }
        Commands::Merge {
            project,
            music,
            settings,
        } => merge_command(&mut engine, project, music, settings).await,
        Commands::Music { command } => music_command(&mut engine, command),
    }
}

fn parse_step(raw: &str) -> Result<Step> {
    match raw {
        "upload" => Ok(Step::Upload),
        "crop" => Ok(Step::Crop),
        "colorize" => Ok(Step::Colorize),
        "animate" => Ok(Step::Animate),
        other => Err(anyhow!("unknown step: {other}")),
    }
}

fn parse_effect(raw: &str) -> Result<Effect> {
    match raw {
        "zoom" => Ok(Effect::Zoom),
        "shake" => Ok(Effect::Shake),
        "reveal" => Ok(Effect::Reveal),
        other => Err(anyhow!(
            "unknown effect: {other} (expected zoom, shake or reveal)"
        )),
    }
}

fn parse_model(raw: &str) -> Result<AiModel> {
    match raw {
        "vidu" => Ok(AiModel::Vidu),
        "wan" => Ok(AiModel::Wan),
        "cogvideox" => Ok(AiModel::Cogvideox),
        other => Err(anyhow!(
            "unknown model: {other} (expected vidu, wan or cogvideox)"
        )),
    }
}

fn report_warning<T>(outcome: &StageOutcome<T>) {
    if let Some(warning) = &outcome.warning {
        warn!("{warning}");
    }
}

fn new_command(engine: &mut Engine, name: String) -> Result<()> {
    let project = engine.create_project(&name)?;
    info!("Created project '{}'", project.name);
    println!("{}", project.id);
    Ok(())
}

fn list_command(engine: &Engine) -> Result<()> {
    let projects = engine.library().projects();
    if projects.is_empty() {
        println!("No projects yet. Create one with `mangaflow-cli new <name>`.");
        return Ok(());
    }
    for project in projects {
        println!(
            "{}  {}  [{}]  {} clip(s)",
            project.id,
            project.name,
            project.current_step,
            project.animations.len()
        );
    }
    Ok(())
}

fn show_command(engine: &Engine, project: String) -> Result<()> {
    let project = engine
        .library()
        .get_project(&project)
        .ok_or_else(|| anyhow!("project not found: {project}"))?;
    println!("{} ({})", project.name, project.id);
    println!("  step:      {}", project.current_step);
    println!("  image:     {}", describe(project.image.as_ref()));
    println!("  panels:    {}", project.panels.len());
    println!("  selected:  {}", describe(project.selected_panel.as_ref()));
    println!("  colorized: {}", describe(project.colorized_panel.as_ref()));
    println!("  clips:     {}", project.animations.len());
    Ok(())
}

fn describe(artifact: Option<&workflow::Artifact>) -> String {
    match artifact {
        None => "-".to_string(),
        Some(a) if a.is_data_uri() => format!("data URI ({:?})", a.origin),
        Some(a) => format!("{} ({:?})", a.uri, a.origin),
    }
}

fn upload_command(engine: &mut Engine, project: String, file: PathBuf) -> Result<()> {
    let bytes =
        std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let mime = match file.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    };
    let data_uri = format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    );
    engine.upload_image(&project, data_uri)?;
    info!("Uploaded {} into project {project}", file.display());
    Ok(())
}

async fn detect_command(engine: &mut Engine, project: String) -> Result<()> {
    info!("Detecting panels...");
    let outcome = engine.detect_panels(&project).await?;
    report_warning(&outcome);
    println!("{} panel(s) available:", outcome.value.len());
    for (index, panel) in outcome.value.iter().enumerate() {
        println!("  [{index}] {}", describe(Some(panel)));
    }
    Ok(())
}

async fn colorize_command(engine: &mut Engine, project: String, skip: bool) -> Result<()> {
    if skip {
        engine.skip_colorize(&project)?;
        info!("Skipped colorization; panel carried forward");
        return Ok(());
    }
    info!("Colorizing selected panel...");
    let outcome = engine.colorize(&project).await?;
    report_warning(&outcome);
    println!("colorized: {}", describe(Some(&outcome.value)));
    Ok(())
}

async fn animate_command(engine: &mut Engine, project: String, effect: String) -> Result<()> {
    let effect = parse_effect(&effect)?;
    info!("Generating {effect} animation...");
    let outcome = engine.animate_manual(&project, effect).await?;
    report_warning(&outcome);
    let animation = outcome.value;
    println!("{}  {}", animation.id, clip_url(&animation));
    engine.save_animation(&project, animation)?;
    Ok(())
}

async fn animate_ai_command(
    engine: &mut Engine,
    project: String,
    prompt: String,
    model: String,
) -> Result<()> {
    let model = parse_model(&model)?;
    info!("Generating AI animation with {model}...");
    let outcome = engine
        .animate_ai(&project, &prompt, model, |percent, message| {
            info!("[{percent:3}%] {message}");
        })
        .await?;
    report_warning(&outcome);
    let animation = outcome.value;
    println!("{}  {}", animation.id, clip_url(&animation));
    engine.save_animation(&project, animation)?;
    Ok(())
}

fn clip_url(animation: &workflow::Animation) -> String {
    animation
        .settings
        .video_url
        .as_ref()
        .map(|v| v.uri.clone())
        .unwrap_or_else(|| "-".to_string())
}

fn feed_command(engine: &Engine, project: String) -> Result<()> {
    let project = engine
        .library()
        .get_project(&project)
        .ok_or_else(|| anyhow!("project not found: {project}"))?;
    if project.animations.is_empty() {
        println!("No clips yet.");
        return Ok(());
    }
    for animation in &project.animations {
        println!(
            "{}  {}  {}  {}",
            animation.id,
            animation.effect,
            animation.created_at.to_rfc3339(),
            clip_url(animation)
        );
    }
    Ok(())
}

async fn merge_command(
    engine: &mut Engine,
    project: String,
    music: Option<String>,
    settings: String,
) -> Result<()> {
    let settings: serde_json::Value =
        serde_json::from_str(&settings).context("invalid --settings JSON")?;
    let videos = engine.clip_urls(&project)?;
    if videos.is_empty() {
        return Err(anyhow!("project has no clips to merge"));
    }
    let music_url = match music {
        Some(id) => Some(
            engine
                .library()
                .get_track(&id)
                .ok_or_else(|| anyhow!("music track not found: {id}"))?
                .url
                .clone(),
        ),
        None => None,
    };

    info!("Merging {} clip(s)...", videos.len());
    let outcome = engine
        .merge_videos(&videos, music_url.as_deref(), settings)
        .await?;
    report_warning(&outcome);
    match outcome.value {
        MergeOutcome::Merged {
            file_url,
            file_name,
        } => println!("{file_name}  {file_url}"),
        MergeOutcome::Preview { videos, .. } => {
            println!("Preview mode: play the clips in order.");
            for video in videos {
                println!("  {video}");
            }
        }
    }
    Ok(())
}

fn music_command(engine: &mut Engine, command: MusicCommands) -> Result<()> {
    match command {
        MusicCommands::Add {
            name,
            url,
            artist,
            genre,
        } => {
            let mut track = MusicTrack::new(name, url);
            track.artist = artist;
            track.genre = genre;
            println!("{}", track.id);
            engine.add_track(track)?;
        }
        MusicCommands::List => {
            for track in engine.library().tracks() {
                println!(
                    "{}  {}  {}  {}",
                    track.id,
                    track.name,
                    track.artist.as_deref().unwrap_or("-"),
                    track.url
                );
            }
        }
        MusicCommands::Remove { id } => {
            engine.remove_track(&id)?;
            info!("Removed track {id}");
        }
    }
    Ok(())
}
