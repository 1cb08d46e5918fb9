use crate::app::{AppContext, Result};
use crate::auth::AuthState;
use crate::catalog::MovieQuery;
use crate::domain::{ListKind, Movie, Page, RatingState, TriState};
use crate::pagination::{self, PageNav};

pub async fn login(ctx: &AppContext, no_browser: bool) -> Result<()> {
    if ctx.auth.state() == AuthState::SessionEstablished {
        println!("Already signed in. Run `reelsync logout` first to switch accounts.");
        return Ok(());
    }

    let ticket = ctx.auth.begin_login().await?;
    println!("Approve this login in your browser:\n  {}", ticket.approval_url);

    if ctx.config.auth.open_browser && !no_browser {
        if let Err(e) = open::that(&ticket.approval_url) {
            tracing::warn!("Could not open browser: {}", e);
        }
    }

    println!("Then run `reelsync approve`.");
    Ok(())
}

pub async fn approve(ctx: &AppContext) -> Result<()> {
    ctx.auth.complete_login().await?;
    match ctx.auth.account().await {
        Ok(account) => println!("Signed in as {}", account.display_name()),
        Err(_) => println!("Signed in"),
    }
    Ok(())
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    ctx.auth.logout().await?;
    println!("Signed out");
    Ok(())
}

pub async fn status(ctx: &AppContext) -> Result<()> {
    let state = ctx.auth.state();
    println!("State: {}", state);

    if let Some(fp) = ctx.auth.credentials().session_fingerprint() {
        println!("Session: {}", fp);
    }
    if let Some(kind) = ctx.auth.last_failure() {
        println!("Last failure: {}", kind);
    }
    if state == AuthState::SessionEstablished {
        match ctx.auth.account().await {
            Ok(account) => println!("Account: {} ({})", account.display_name(), account.id),
            Err(e) => eprintln!("Account unavailable: {}", e),
        }
    }
    Ok(())
}

pub async fn movies(ctx: &AppContext, query: MovieQuery, page: u32) -> Result<()> {
    let page = clamp_page(ctx, page);
    let listing = ctx.catalog.movies(&query, page).await.into_result()?;
    print_movies(ctx, &listing);
    Ok(())
}

pub async fn movie(ctx: &AppContext, id: u64) -> Result<()> {
    let movie = ctx.catalog.movie(id).await.into_result()?;
    println!("{} ({})", movie.display_title(), movie.id);
    println!("  Rating: {:.1}", movie.vote_average);

    if ctx.auth.is_established() {
        let state = ctx.sync.membership(id).await?;
        println!("  Favorite: {}", describe(state.favorited));
        println!("  Watchlist: {}", describe(state.watchlisted));
        match ctx.sync.get_rating(id).await? {
            RatingState::Rated(v) => println!("  Your rating: {:.1}", v),
            RatingState::Unrated => println!("  Your rating: none"),
            RatingState::Unknown => {}
        }
    }

    // Recommendations are optional extra context.
    match ctx.catalog.recommendations(id, 1).await.into_result() {
        Ok(recs) if !recs.results.is_empty() => {
            println!("\nRecommended:");
            for m in recs.results.iter().take(10) {
                println!("  {:>8}  {}", m.id, m.display_title());
            }
        }
        Ok(_) => {}
        Err(e) => tracing::debug!("No recommendations for {}: {}", id, e),
    }
    Ok(())
}

pub async fn person(ctx: &AppContext, id: u64, page: u32) -> Result<()> {
    let person = ctx.catalog.person(id).await.into_result()?;
    println!("{}", person.name.as_deref().unwrap_or("(Unknown)"));

    let page = clamp_page(ctx, page);
    let listing = ctx.catalog.movies_by_person(id, page).await.into_result()?;
    print_movies(ctx, &listing);
    Ok(())
}

pub async fn genres(ctx: &AppContext) -> Result<()> {
    let list = ctx.catalog.genres().await.into_result()?;
    for genre in &list.genres {
        println!("{:>6}  {}", genre.id, genre.name);
    }
    Ok(())
}

pub async fn account_list(ctx: &AppContext, list: ListKind, page: u32) -> Result<()> {
    ctx.auth.account_id().await?;
    let credentials = ctx.auth.require_session()?;
    let page = clamp_page(ctx, page);

    let listing = ctx
        .catalog
        .account_list(&credentials, list, page)
        .await?
        .into_result()?;
    if listing.results.is_empty() {
        println!("Your {} list is empty", list);
        return Ok(());
    }
    print_movies(ctx, &listing);
    Ok(())
}

pub async fn toggle(ctx: &AppContext, id: u64, list: ListKind) -> Result<()> {
    let member = ctx.sync.toggle(id, list).await?;
    if member {
        println!("Added {} to {}", id, list);
    } else {
        println!("Removed {} from {}", id, list);
    }
    Ok(())
}

pub async fn rate(ctx: &AppContext, id: u64, value: f64) -> Result<()> {
    ctx.sync.set_rating(id, value).await?;
    println!("Rated {} {:.1}", id, value);
    Ok(())
}

pub async fn unrate(ctx: &AppContext, id: u64) -> Result<()> {
    ctx.sync.clear_rating(id).await?;
    println!("Removed rating of {}", id);
    Ok(())
}

fn clamp_page(ctx: &AppContext, page: u32) -> u32 {
    page.clamp(1, ctx.config.pagination.page_cap.max(1))
}

fn describe(flag: TriState) -> &'static str {
    match flag {
        TriState::True => "yes",
        TriState::False => "no",
        TriState::Unknown => "unknown",
    }
}

fn print_movies(ctx: &AppContext, listing: &Page<Movie>) {
    if listing.results.is_empty() {
        println!("No movies");
        return;
    }

    for movie in &listing.results {
        println!(
            "{:>8}  {:>4.1}  {}",
            movie.id,
            movie.vote_average,
            movie.display_title()
        );
    }

    let cap = ctx.config.pagination.page_cap;
    let tokens = pagination::compute(listing.page, listing.total_pages, cap);
    if tokens.len() > 1 {
        println!("\nPage {}", pagination::render(&tokens, listing.page));
        if let Some(nav) = PageNav::new(listing.page, listing.total_pages, cap) {
            if nav.has_next {
                println!("Next: --page {}", nav.next);
            }
        }
    }
}
