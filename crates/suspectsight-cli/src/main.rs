use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dashboard::password::hash_password;
use dashboard::store::{Role, UserStore, UserSummary};
use std::path::PathBuf;
use std::sync::Arc;
use suspectsight_core::{
    default_model_dir, AnalyzerPool, Gallery, LabelFont, MatchPolicy, MatchSettings, ModelPaths, OnnxAnalyzer,
    DEFAULT_MATCH_THRESHOLD,
};

#[derive(Parser)]
#[command(name = "suspectsight", about = "SuspectSight face recognition tools")]
struct Cli {
    /// Directory containing the ONNX model files
    #[arg(long, global = true, env = "SUSPECTSIGHT_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label every face in a photo and write the annotated JPEG
    Recognize {
        /// Photo to analyze
        image: PathBuf,
        /// Directory of reference photos, one person per file
        #[arg(short, long, default_value = "images")]
        gallery: PathBuf,
        /// Where to write the annotated JPEG
        #[arg(short, long, default_value = "recognized.jpg")]
        output: PathBuf,
        /// Minimum cosine similarity for a match
        #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
        threshold: f32,
        /// Match policy: "first-match" or "closest"
        #[arg(long, default_value = "first-match")]
        policy: MatchPolicy,
        /// TrueType font for labels
        #[arg(long, env = "RECOGNIZE_FONT_PATH")]
        font: Option<PathBuf>,
    },
    /// List the labels a gallery directory produces
    Gallery {
        /// Directory of reference photos
        dir: PathBuf,
    },
    /// Manage dashboard users
    Users {
        /// Dashboard database (defaults to the dashboard's own)
        #[arg(long, env = "DASHBOARD_DB_PATH")]
        db: Option<PathBuf>,

        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// List users and their roles
    List,
    /// Add a user
    Add {
        username: String,
        #[arg(short, long)]
        password: String,
        /// Officer, Admin or Administrator
        #[arg(short, long)]
        role: Role,
    },
    /// Remove a user and every photo they uploaded
    Remove { username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let model_dir = cli.model_dir.unwrap_or_else(default_model_dir);

    match cli.command {
        Commands::Recognize {
            image,
            gallery,
            output,
            threshold,
            policy,
            font,
        } => {
            let font = font
                .map(|path| LabelFont::load(&path).with_context(|| format!("failed to load font {}", path.display())))
                .transpose()?;
            let pool = start_pool(&model_dir, font)?;
            let gallery = load_gallery(&gallery, &pool).await?;
            tracing::debug!(known_faces = gallery.len(), ?policy, threshold, "matching photo");
            println!("Gallery: {} known face(s)", gallery.len());

            let bytes = std::fs::read(&image).with_context(|| format!("failed to read {}", image.display()))?;
            let settings = MatchSettings { threshold, policy };
            let result = pool.recognize(bytes, Arc::new(gallery), settings).await?;

            for face in &result.faces {
                match face.similarity {
                    Some(similarity) => println!("  {} (similarity {similarity:.3})", face.label),
                    None => println!("  {}", face.label),
                }
            }
            std::fs::write(&output, &result.jpeg).with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(
                faces = result.faces.len(),
                known = result.faces.iter().filter(|f| f.is_known()).count(),
                output = %output.display(),
                "annotated photo written"
            );
            println!("{} face(s) labelled, written to {}", result.faces.len(), output.display());
        }
        Commands::Gallery { dir } => {
            let pool = start_pool(&model_dir, None)?;
            let gallery = load_gallery(&dir, &pool).await?;
            if gallery.is_empty() {
                println!("No usable reference photos in {}", dir.display());
            }
            for face in gallery.faces() {
                println!("{}", face.label);
            }
        }
        Commands::Users { db, action } => {
            let db = db.unwrap_or_else(|| dashboard::Config::from_env().db_path);
            let store = UserStore::open(&db)
                .await
                .with_context(|| format!("failed to open {}", db.display()))?;
            tracing::debug!(db = %db.display(), "user store opened");
            run_user_action(&store, action).await?;
        }
    }

    Ok(())
}

fn start_pool(model_dir: &std::path::Path, font: Option<LabelFont>) -> Result<AnalyzerPool> {
    let paths = ModelPaths::in_dir(model_dir);
    AnalyzerPool::spawn(1, font, |_| OnnxAnalyzer::load(&paths))
        .with_context(|| format!("failed to load models from {}", model_dir.display()))
}

async fn load_gallery(dir: &std::path::Path, pool: &AnalyzerPool) -> Result<Gallery> {
    Gallery::load_dir(dir, pool)
        .await
        .with_context(|| format!("failed to load gallery {}", dir.display()))
}

async fn run_user_action(store: &UserStore, action: UserAction) -> Result<()> {
    match action {
        UserAction::List => {
            let users = store.list_users().await?;
            if users.is_empty() {
                println!("No users");
            }
            for user in &users {
                println!("{}", user_row(user));
            }
        }
        UserAction::Add {
            username,
            password,
            role,
        } => {
            if username.trim().is_empty() || password.is_empty() {
                bail!("username and password must not be empty");
            }
            let username = username.trim();
            if !store.insert_user(username, &hash_password(&password)?, role).await? {
                bail!("Username already exists!");
            }
            tracing::info!(username, role = role.as_str(), "user added");
            println!("User added successfully!");
        }
        UserAction::Remove { username } => {
            if !store.remove_user(&username).await? {
                bail!("Username not found!");
            }
            tracing::info!(%username, "user removed");
            println!("User {username} removed successfully!");
        }
    }
    Ok(())
}

fn user_row(user: &UserSummary) -> String {
    format!(
        "{:<20} {:<14} {:>4} image(s)  since {}",
        user.username,
        user.role.as_str(),
        user.image_count,
        user.created_at.format("%Y-%m-%d")
    )
}
