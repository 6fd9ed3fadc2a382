//! Lab 1: multi-turn chat against the completions API.
//!
//! The API is stateless; the [`Conversation`] keeps the transcript and
//! resends it whole on every turn. Press enter on an empty line to
//! exit.

use anyhow::Result;
use labs::config::Config;
use labs::console;
use openai_chat::{Conversation, OpenAIClient};

#[tokio::main]
async fn main() -> Result<()> {
    labs::init_tracing();
    let config = Config::from_env()?;
    let client = OpenAIClient::new(&config.openai_api_key);

    let mut conversation = Conversation::new(&client, &config.model)
        .with_system("You are a friendly assistant for a bike shop called Adventure Works.");

    println!("Chat with the model. Press enter on an empty line to exit.");
    while let Some(line) =
        console::read_user_line("\nYou (just press enter to exit the conversation): ")?
    {
        let answer = conversation.advance(&line).await?;
        console::print_assistant(&answer);
    }

    Ok(())
}
