//! `loremaster history`: Print the conversation log.

use loremaster_core::turn::{Role, Turn};

use super::load_config;

pub async fn run(limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let log = loremaster_log::open(&config.log).await?;

    let turns = log.read_recent(limit).await?;
    if turns.is_empty() {
        println!("📜 The log is empty. Start a session with `loremaster serve`.");
        return Ok(());
    }

    let total = log.count().await?;
    println!("📜 Showing {} of {} turns\n", turns.len(), total);
    for turn in &turns {
        println!("{}\n", format_turn(turn));
    }

    Ok(())
}

fn format_turn(turn: &Turn) -> String {
    let speaker = match turn.role {
        Role::User => "Player",
        Role::Assistant => "DM",
        Role::Directive => "System",
    };
    format!(
        "[{}] {}: {}",
        turn.created_at.format("%Y-%m-%d %H:%M:%S"),
        speaker,
        turn.content
    )
}
