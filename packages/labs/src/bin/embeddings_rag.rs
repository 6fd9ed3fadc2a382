//! Lab 5: retrieval-augmented prompting with embeddings.
//!
//! Product model descriptions are embedded once and cached in
//! `embeddings.json`. Each question is embedded, ranked against the
//! corpus by dot product, and the top matches are pasted into the
//! system prompt for a one-shot completion.

use anyhow::{Context, Result};
use labs::config::Config;
use labs::console;
use labs::store::{ProductModel, SalesStore};
use openai_chat::{ChatRequest, EmbeddingIndex, Embedder, OpenAIClient, Turn};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

const CACHE_PATH: &str = "embeddings.json";
const TOP_K: usize = 5;

const INSTRUCTIONS: &str = "You are an assistant helping customers of the Adventure Works bike \
    shop pick a product. Base your recommendations only on the product models listed below. \
    If none of them fit the question, say so.";

const CANNED_QUERIES: &[&str] = &[
    "I need new pedals for my bike.",
    "What clothes do you sell for bike rides?",
];

#[tokio::main]
async fn main() -> Result<()> {
    labs::init_tracing();
    let config = Config::from_env()?;
    let client = OpenAIClient::new(&config.openai_api_key);
    let embedder = client.embeddings(&config.embeddings_model);

    let store = SalesStore::connect(&config.database_url).await?;
    store.migrate().await?;
    store.seed_demo_data().await?;
    let models = store.get_product_models().await?;

    let corpus: Vec<(i64, String)> = models
        .iter()
        .map(|model| (model.product_model_id, corpus_text(model)))
        .collect();
    let index = EmbeddingIndex::load_or_build(Path::new(CACHE_PATH), &embedder, &corpus).await?;
    info!(items = index.len(), "embedding index ready");

    println!("Ask for a product recommendation. A number picks a canned query.");
    while let Some(line) = console::pick_or_free_text(CANNED_QUERIES)? {
        let query_vector = embedder.embed(&line).await?;
        let ranked = index.rank(&query_vector, TOP_K);

        let mut prompt = format!("{INSTRUCTIONS}\n\n=== PRODUCT MODELS\n");
        for (item_id, score) in &ranked {
            let model = models
                .iter()
                .find(|m| m.product_model_id == *item_id)
                .context("ranked item missing from corpus")?;
            info!(item_id, score, name = %model.name, "retrieved");
            writeln!(prompt, "\n{}", corpus_text(model))?;
        }

        let request = ChatRequest::new(&config.model)
            .message(Turn::system(prompt))
            .message(Turn::user(&line));
        let reply = client.chat_completion(&request).await?;
        console::print_assistant(reply.content.as_deref().unwrap_or("(no answer)"));
    }

    Ok(())
}

/// The text embedded and shown to the model for one product model.
fn corpus_text(model: &ProductModel) -> String {
    format!(
        "Name: {}\nCategory: {}\nDescription: {}",
        model.name, model.category, model.description
    )
}
