use anyhow::Result;
use ragent::retrieval::RetrieverTool;
use std::sync::Arc;

use super::load_settings;
use crate::render;

pub async fn execute(query: &str) -> Result<()> {
    let settings = load_settings()?;
    let retriever = RetrieverTool::new(
        settings.retriever.name.clone(),
        settings.retriever.description.clone(),
        Arc::new(settings.vector_store()?),
    );
    let passages = retriever.simple_query(query).await?;
    render::passages(&passages)
}
