//! Lab 4: the assistants API with server-side threads.
//!
//! The transcript lives on OpenAI's side; this lab creates (or updates)
//! the "Revenue Analyzer" assistant, opens a thread, and polls each run
//! to completion, answering tool calls from the local sales database.

use anyhow::Result;
use labs::config::Config;
use labs::store::SalesStore;
use labs::{console, tools};
use openai_chat::{
    create_or_update_assistant, run_to_completion, AssistantSpec, OpenAIClient, PollPolicy,
    TokioSleeper,
};
use tracing::info;

const INSTRUCTIONS: &str = "You are an assistant answering questions about customers, products \
    and revenue of the Adventure Works company. Use the provided functions to query the sales \
    database. Present revenue amounts in dollars.";

const CANNED_QUERIES: &[&str] = &[
    "What was the total revenue from Orlando Gee, broken down by year and month?",
    "Which products did Orlando Gee buy?",
    "Who bought mountain pedals?",
];

#[tokio::main]
async fn main() -> Result<()> {
    labs::init_tracing();
    let config = Config::from_env()?;
    let client = OpenAIClient::new(&config.openai_api_key);

    let store = SalesStore::connect(&config.database_url).await?;
    store.migrate().await?;
    store.seed_demo_data().await?;
    let registry = tools::sales_registry(store)?;

    let spec = AssistantSpec {
        name: "Revenue Analyzer".to_string(),
        description: "Answers questions about Adventure Works revenue".to_string(),
        instructions: INSTRUCTIONS.to_string(),
        model: config.model.clone(),
        tools: registry.definitions(),
    };
    let assistant = create_or_update_assistant(&client, &spec).await?;
    let thread = client.create_thread().await?;
    info!(assistant_id = %assistant.id, thread_id = %thread.id, "assistant ready");

    println!("Ask about Adventure Works revenue. A number picks a canned query.");
    while let Some(line) = console::pick_or_free_text(CANNED_QUERIES)? {
        let answer = run_to_completion(
            &client,
            &thread.id,
            &assistant.id,
            &line,
            &registry,
            &PollPolicy::default(),
            &TokioSleeper,
        )
        .await?;
        console::print_assistant(&answer);
    }

    Ok(())
}
