use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};

use ez_qr::browser::MemoryBrowser;
use ez_qr::qr;
use ez_qr::{Config, FileStore, Session, SurfaceRole};

#[derive(Parser)]
#[command(name = "ez-qr")]
#[command(about = "QR code generator and decoder sharing one session between popup and full page")]
struct Cli {
    /// Surface to act as; inferred from EZQR_VIEWPORT when omitted
    #[arg(long, value_enum, global = true)]
    role: Option<SurfaceRole>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount a surface and log every change it applies until Ctrl-C
    Watch,
    Theme {
        #[command(subcommand)]
        action: Toggle,
    },
    Language {
        #[command(subcommand)]
        action: Toggle,
    },
    /// Switch the active tab ("1" generate, "2" decode)
    Tab { id: String },
    /// Replace this surface's draft
    Draft {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        url: String,
    },
    Favorites {
        #[command(subcommand)]
        action: FavoritesCommand,
    },
    /// Write a QR code for TEXT as PNG
    Encode {
        text: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = qr::PREVIEW_SIZE)]
        size: u32,
    },
    /// Decode a QR image and publish the result
    Decode { file: PathBuf },
    /// Focus or open the full-page view
    OpenFullView,
}

#[derive(Subcommand)]
enum Toggle {
    Toggle,
}

#[derive(Subcommand)]
enum FavoritesCommand {
    List {
        #[arg(long)]
        search: Option<String>,
    },
    Add { name: String, url: String },
    Update { id: i64, name: String, url: String },
    Delete { id: i64 },
    /// Save the current draft
    SaveDraft,
}

fn init_logger(config: &Config) {
    env_logger::Builder::from_default_env()
        .filter_level(config.log_level)
        .init();
}

async fn watch(session: &mut Session<FileStore, MemoryBrowser>) -> Result<()> {
    info!("Watching {:?} as {:?}", session.view(), session.role());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.unmount();
                return Ok(());
            }
            change = session.next_change() => match change {
                Ok(Some(fields)) if !fields.is_empty() => {
                    info!("changed {:?} -> {:?} (mode {:?})", fields, session.view(), session.theme_mode());
                }
                Ok(Some(_)) => {}
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!("watch error: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Config::from_env();
    init_logger(&config);

    let cli = Cli::parse();
    let role = config.role(cli.role);

    match cli.command {
        Command::Encode { text, out, size } => {
            let image = qr::render_rgba(&text, size)?;
            image.save(&out)?;
            info!("Wrote {:?}", out);
            Ok(())
        }
        command => {
            let store = FileStore::open(&config.store_dir).await?;
            let mut session =
                Session::mount(store, config.browser(), role, config.prefers_dark).await?;
            run(&mut session, command, &config).await?;

            if let Some(notice) = session.take_notice() {
                info!("{:?}: {}", notice.level, notice.message);
            }
            Ok(())
        }
    }
}

async fn run(
    session: &mut Session<FileStore, MemoryBrowser>,
    command: Command,
    config: &Config,
) -> Result<()> {
    match command {
        Command::Watch => watch(session).await?,
        Command::Theme { action: Toggle::Toggle } => {
            let theme = session.toggle_theme().await?;
            println!("{:?}", theme);
        }
        Command::Language { action: Toggle::Toggle } => {
            let language = session.toggle_language().await?;
            println!("{:?}", language);
        }
        Command::Tab { id } => session.select_tab(&id).await?,
        Command::Draft { name, url } => session.edit_draft(&name, &url).await?,
        Command::Favorites { action } => match action {
            FavoritesCommand::List { search } => {
                let query = search.unwrap_or_default();
                for f in session.search_favorites(&query) {
                    println!("{}\t{}\t{}", f.id, f.name, f.url);
                }
            }
            FavoritesCommand::Add { name, url } => {
                let f = session.save_favorite(&name, &url).await?;
                println!("{}", f.id);
            }
            FavoritesCommand::Update { id, name, url } => {
                session.update_favorite(id, &name, &url).await?
            }
            FavoritesCommand::Delete { id } => session.delete_favorite(id).await?,
            FavoritesCommand::SaveDraft => {
                let f = session.save_draft().await?;
                println!("{}", f.id);
            }
        },
        Command::Decode { file } => {
            let bytes = tokio::fs::read(&file).await?;
            println!("{}", session.decode_image(bytes).await?);
        }
        Command::OpenFullView => {
            let outcome = session.open_full_view(&config.full_view_url).await?;
            println!("{:?}", outcome);
        }
        // Needs no session; handled in main.
        Command::Encode { .. } => {}
    }
    Ok(())
}
