//! Lab 3: function calling over the sales database.
//!
//! The model is given three query tools; the dispatch loop in
//! [`Conversation`] runs the requested queries and feeds the results
//! back until the model produces a final answer.

use anyhow::Result;
use labs::config::Config;
use labs::store::SalesStore;
use labs::{console, tools};
use openai_chat::{Conversation, OpenAIClient};

const INSTRUCTIONS: &str = "You are an assistant answering questions about customers, products \
    and revenue of the Adventure Works company. Use the provided functions to query the sales \
    database. Ask follow-up questions when a query needs filters you do not have yet. \
    Present revenue amounts in dollars.";

const GREETING: &str = "Hi! I can help you with questions about customer and product revenue \
    of the Adventure Works company. What would you like to know?";

#[tokio::main]
async fn main() -> Result<()> {
    labs::init_tracing();
    let config = Config::from_env()?;
    let client = OpenAIClient::new(&config.openai_api_key);

    let store = SalesStore::connect(&config.database_url).await?;
    store.migrate().await?;
    store.seed_demo_data().await?;

    let mut conversation = Conversation::new(&client, &config.model)
        .with_system(INSTRUCTIONS)
        .with_greeting(GREETING)
        .with_tools(tools::sales_registry(store)?);

    console::print_assistant(GREETING);
    while let Some(line) =
        console::read_user_line("You (just press enter to exit the conversation): ")?
    {
        let answer = conversation.advance(&line).await?;
        console::print_assistant(&answer);
    }

    Ok(())
}
