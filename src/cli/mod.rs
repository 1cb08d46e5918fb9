pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::catalog::MovieCategory;

#[derive(Parser)]
#[command(name = "reelsync")]
#[command(about = "Browse movies and keep your TMDB lists in sync", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/reelsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database holding the session
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request a token and open the approval page
    Login {
        /// Only print the approval URL
        #[arg(long)]
        no_browser: bool,
    },
    /// Finish logging in once the token is approved
    Approve,
    /// Sign out and forget the session
    Logout,
    /// Show the login state
    Status,
    /// Browse movies by category, genre or search text
    Movies {
        /// popular, top_rated or upcoming
        #[arg(long, conflicts_with_all = ["genre", "search"])]
        category: Option<MovieCategory>,

        /// Genre id, see `reelsync genres`
        #[arg(long, conflicts_with = "search")]
        genre: Option<u64>,

        #[arg(long)]
        search: Option<String>,

        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Show one movie and its recommendations
    Movie { id: u64 },
    /// Show a person and the movies they appear in
    Person {
        id: u64,

        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// List movie genres
    Genres,
    /// List your favorite movies
    Favorites {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// List your watchlist
    Watchlist {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Add or remove a movie from your favorites
    ToggleFavorite { id: u64 },
    /// Add or remove a movie from your watchlist
    ToggleWatchlist { id: u64 },
    /// Rate a movie from 0.5 to 10
    Rate { id: u64, value: f64 },
    /// Remove your rating of a movie
    Unrate { id: u64 },
}
