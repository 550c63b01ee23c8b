use anyhow::{Context, Result};
use chrono::Utc;
use reel_feed::config::Config;
use reel_feed::engine::{HeadlessElement, LoadOutcome};
use reel_feed::feed::fixture::{sample_items, FixtureBackend};
use reel_feed::feed::rest::RestBackend;
use reel_feed::session::FeedSession;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Line commands read from stdin.
#[derive(Debug, PartialEq)]
enum Command {
    More,
    Refresh,
    Next,
    Prev,
    Goto(usize),
    Like,
    Dislike,
    Bookmark,
    Done,
    Broken,
    List,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let cmd = match parts.next()? {
        "more" | "m" => Command::More,
        "refresh" | "r" => Command::Refresh,
        "next" | "n" => Command::Next,
        "prev" | "p" => Command::Prev,
        "goto" | "g" => Command::Goto(parts.next()?.parse().ok()?),
        "like" => Command::Like,
        "dislike" => Command::Dislike,
        "bookmark" | "b" => Command::Bookmark,
        "done" => Command::Done,
        "broken" => Command::Broken,
        "list" | "ls" => Command::List,
        "quit" | "q" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(cmd)
}

/// Fixture data for `--demo`: source i gets 2, 5, 7, 2, 5, 7, ... items.
fn demo_backend(config: &Config) -> FixtureBackend {
    let sizes = [2usize, 5, 7];
    let now = Utc::now();
    config
        .sources
        .iter()
        .enumerate()
        .fold(FixtureBackend::new(), |backend, (i, source)| {
            let newest = now - chrono::Duration::seconds(17 * i as i64);
            backend.with_source(&source.id, sample_items(&source.id, sizes[i % sizes.len()], newest))
        })
}

/// Give every newly loaded item a stand-in element, as a renderer would on mount.
fn mount_new_items(session: &FeedSession, mounted: &mut HashSet<String>) {
    for item in session.items() {
        if mounted.insert(item.id.clone()) {
            session.register_item_element(&item.id, Arc::new(HeadlessElement::new(&item.id)));
        }
    }
}

fn print_outcome(outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Skipped => println!("  (nothing to load)"),
        LoadOutcome::Loaded { appended, failed } if failed.is_empty() => {
            println!("  +{} items", appended)
        }
        LoadOutcome::Loaded { appended, failed } => {
            println!("  +{} items, failed: {}", appended, failed.join(", "))
        }
        LoadOutcome::Discarded => println!("  (superseded)"),
    }
}

fn print_status(session: &FeedSession) {
    let current = session
        .current_item()
        .map(|i| format!("{} [{}]", i.title, i.id))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {}/{} playable of {} loaded, total {}, more: {}, breaker: {:?}",
        session.current_index() + usize::from(session.playable_count() > 0),
        session.playable_count(),
        session.loaded_count(),
        session.total_count(),
        session.has_more(),
        session.breaker_phase(),
    );
    println!("  now: {}", current);
}

fn print_list(session: &FeedSession) {
    let current = session.current_item().map(|i| i.id);
    for item in session.items() {
        let state = session.item_state(&item.id);
        let marker = if current.as_deref() == Some(item.id.as_str()) { ">" } else { " " };
        let mut flags = String::new();
        for (on, c) in [
            (state.liked, 'L'),
            (state.disliked, 'D'),
            (state.bookmarked, 'B'),
            (state.completed, 'C'),
            (state.broken, 'X'),
        ] {
            flags.push(if on { c } else { '.' });
        }
        println!(
            "  {} {} {:<14} {:<10} {}",
            marker,
            flags,
            item.id,
            item.source_id,
            item.created_at.format("%H:%M:%S")
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let log_file = std::fs::File::create("reel-feed.log")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reel_feed=info")),
        )
        .with_writer(log_file)
        .init();

    let demo_mode = std::env::args().any(|arg| arg == "--demo");

    let config = Config::load(Path::new("config.toml"))?;

    // Load saved token from .env (real env vars take precedence)
    Config::load_env_file();

    println!();
    println!("  reel-feed v0.1.0");
    println!("  ================");
    if demo_mode {
        println!("  ** DEMO MODE ** (in-memory fixture backend)");
    }
    println!();

    let session = if demo_mode {
        FeedSession::from_config(&config, Arc::new(demo_backend(&config)))
    } else {
        let backend = RestBackend::new(
            &config.backend.base_url,
            config.backend.request_timeout_ms,
            Config::api_token(),
        )
        .context("failed to set up backend")?;
        FeedSession::from_config(&config, Arc::new(backend))
    };
    tracing::info!(sources = session.sources().len(), demo = demo_mode, "session started");

    let mut mounted = HashSet::new();
    print_outcome(&session.refresh().await);
    mount_new_items(&session, &mut mounted);
    print_status(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(cmd) = parse_command(&line) else {
            if !line.trim().is_empty() {
                println!("  commands: more refresh next prev goto N like dislike bookmark done broken list quit");
            }
            continue;
        };
        let current = session.current_item().map(|i| i.id);

        match cmd {
            Command::Quit => break,
            Command::More => print_outcome(&session.load_more().await),
            Command::Refresh => {
                mounted.clear();
                print_outcome(&session.refresh().await);
            }
            Command::Next => session.set_current_index(session.current_index() + 1),
            Command::Prev => session.set_current_index(session.current_index().saturating_sub(1)),
            Command::Goto(n) => session.set_current_index(n),
            Command::List => print_list(&session),
            Command::Like | Command::Dislike | Command::Done | Command::Bookmark | Command::Broken => {
                let Some(id) = current else {
                    println!("  no current item");
                    continue;
                };
                let result = match cmd {
                    Command::Like => session.like(&id).await,
                    Command::Dislike => session.dislike(&id).await,
                    Command::Done => session.mark_complete(&id).await,
                    Command::Bookmark => session.toggle_bookmark(&id).await.map(|on| {
                        println!("  bookmarked: {}", on);
                    }),
                    _ => {
                        session.on_media_error(&id, "simulated decode error");
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    println!("  {} (kept locally)", e);
                }
            }
        }

        mount_new_items(&session, &mut mounted);
        print_status(&session);
    }

    session.end_session();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("more"), Some(Command::More));
        assert_eq!(parse_command("  goto 3 "), Some(Command::Goto(3)));
        assert_eq!(parse_command("goto x"), None);
        assert_eq!(parse_command("goto"), None);
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command("dance"), None);
    }
}
