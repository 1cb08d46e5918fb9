use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reelsync::app::AppContext;
use reelsync::catalog::MovieQuery;
use reelsync::cli::{commands, Cli, Commands};
use reelsync::config::Config;
use reelsync::domain::ListKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::new(config, cli.db)?;

    match cli.command {
        Commands::Login { no_browser } => commands::login(&ctx, no_browser).await?,
        Commands::Approve => commands::approve(&ctx).await?,
        Commands::Logout => commands::logout(&ctx).await?,
        Commands::Status => commands::status(&ctx).await?,
        Commands::Movies {
            category,
            genre,
            search,
            page,
        } => {
            let query = match (category, genre, search) {
                (_, _, Some(text)) => MovieQuery::Search(text),
                (_, Some(id), None) => MovieQuery::Genre(id),
                (Some(category), None, None) => MovieQuery::Category(category),
                (None, None, None) => MovieQuery::default(),
            };
            commands::movies(&ctx, query, page).await?;
        }
        Commands::Movie { id } => commands::movie(&ctx, id).await?,
        Commands::Person { id, page } => commands::person(&ctx, id, page).await?,
        Commands::Genres => commands::genres(&ctx).await?,
        Commands::Favorites { page } => {
            commands::account_list(&ctx, ListKind::Favorite, page).await?
        }
        Commands::Watchlist { page } => {
            commands::account_list(&ctx, ListKind::Watchlist, page).await?
        }
        Commands::ToggleFavorite { id } => commands::toggle(&ctx, id, ListKind::Favorite).await?,
        Commands::ToggleWatchlist { id } => {
            commands::toggle(&ctx, id, ListKind::Watchlist).await?
        }
        Commands::Rate { id, value } => commands::rate(&ctx, id, value).await?,
        Commands::Unrate { id } => commands::unrate(&ctx, id).await?,
    }

    Ok(())
}
