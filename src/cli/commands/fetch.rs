//! Resolve one track and save its audio.

use std::path::Path;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::error::ResultExt;
use crate::source::TrackFactory;
use crate::track::TrackCallbacks;

/// Resolve a URL's first track and write the audio stream to a file
pub fn cmd_fetch(rt: &Runtime, config: &Config, url: &str, output: &Path) -> anyhow::Result<()> {
    rt.block_on(async {
        let factory = TrackFactory::new(config);
        let request = factory.tracks_from_url(url, TrackCallbacks::new()).await?;
        let Some(track) = request.tracks.first() else {
            anyhow::bail!("{} produced no tracks", url);
        };

        println!("Resolving: {}", track.display_title());
        let source = track.resolve().await.with_context("while resolving track")?;
        let format = source.format();

        let mut stream = source.into_stream();
        let mut file = tokio::fs::File::create(output)
            .await
            .with_context(format!("while creating {}", output.display()))?;
        let bytes = tokio::io::copy(&mut stream, &mut file).await?;

        println!("✓ Wrote {} bytes ({:?}) to {}", bytes, format, output.display());
        Ok(())
    })
}
