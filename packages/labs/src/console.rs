//! Line-based console helpers shared by the labs.
//!
//! Conventions: an empty line ends the session; a number picks one of
//! the canned queries when a quick-pick list is shown.

use anyhow::Result;
use colored::Colorize;
use std::io::{self, Write};

/// Prompt and read one line. Returns `None` on an empty line (the exit
/// signal) or end of input.
pub fn read_user_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt.cyan());
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let line = line.trim().to_string();
    Ok(if line.is_empty() { None } else { Some(line) })
}

/// Show a numbered list of canned queries, then read a line. A valid
/// number selects the canned query; anything else is free text; empty
/// exits.
pub fn pick_or_free_text(options: &[&str]) -> Result<Option<String>> {
    println!();
    for (i, option) in options.iter().enumerate() {
        println!("{}: {}", (i + 1).to_string().bold(), option);
    }

    let Some(line) = read_user_line("\nYou (just press enter to exit the conversation): ")?
    else {
        return Ok(None);
    };

    if let Ok(selection) = line.parse::<usize>() {
        if (1..=options.len()).contains(&selection) {
            return Ok(Some(options[selection - 1].to_string()));
        }
    }

    Ok(Some(line))
}

/// Print an assistant reply.
pub fn print_assistant(text: &str) {
    println!("\n{} {}\n", "assistant:".green().bold(), text);
}

/// Print one streamed fragment without a newline.
pub fn print_fragment(text: &str) {
    print!("{text}");
    let _ = io::stdout().flush();
}
