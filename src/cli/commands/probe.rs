//! URL classification and metadata lookup.

use tokio::runtime::Runtime;

use crate::config::Config;
use crate::source::{self, TrackFactory};
use crate::track::TrackCallbacks;

/// Show what a URL would enqueue
pub fn cmd_probe(rt: &Runtime, config: &Config, url: &str) -> anyhow::Result<()> {
    let (kind, parsed) = source::classify(url)?;
    println!("Source: {}", kind);
    println!("URL:    {}", parsed);

    let factory = TrackFactory::new(config);
    let request = rt.block_on(factory.tracks_from_url(url, TrackCallbacks::new()))?;

    if let Some(title) = &request.title {
        println!("Title:  {}", title);
    }
    if let Some(thumbnail) = &request.thumbnail_url {
        println!("Thumb:  {}", thumbnail);
    }
    println!();
    println!("{} track(s) would be enqueued:", request.tracks.len());
    for (i, track) in request.tracks.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, track.display_title());
        if track.metadata().title.is_some() {
            println!("       {}", track.url());
        }
    }
    Ok(())
}
