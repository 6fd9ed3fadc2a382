//! Lab 2: streamed chat completions.
//!
//! Same conversation loop as the basic chat lab, but fragments are
//! printed as they arrive instead of waiting for the whole reply.

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

    println!("Chat with the model. Replies stream in. Press enter on an empty line to exit.");
    while let Some(line) =
        console::read_user_line("\nYou (just press enter to exit the conversation): ")?
    {
        println!();
        conversation
            .advance_streaming(&line, console::print_fragment)
            .await?;
        println!();
    }

    Ok(())
}
