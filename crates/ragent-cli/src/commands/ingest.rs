use anyhow::Result;
use cliclack::spinner;
use console::style;
use ragent::errors::RagError;
use ragent::retrieval::{IndexSource, SplitterConfig, VectorStore};
use std::path::PathBuf;

use super::load_settings;

pub async fn execute(document: Option<PathBuf>) -> Result<()> {
    let settings = load_settings()?;
    let document = match document {
        Some(path) => path,
        None => settings.document().map_err(RagError::from)?.to_path_buf(),
    };

    let mut store = VectorStore::new(
        settings.embedder()?,
        IndexSource::Pdf {
            path: document.clone(),
            splitter: SplitterConfig::default(),
        },
    )
    .persist_to(&settings.store.persist_directory, &settings.store.collection);

    let spin = spinner();
    spin.start(format!("indexing {}", document.display()));
    let result = store.rebuild().await;
    spin.stop("");
    let chunks = result?;

    println!(
        "{} {} chunks into {}",
        style("indexed").green().bold(),
        chunks,
        store
            .index_path()
            .map(|path| path.display().to_string())
            .unwrap_or_default()
    );
    Ok(())
}
