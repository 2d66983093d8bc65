use anyhow::Result;
use cliclack::{input, spinner};
use console::style;
use ragent::conversation::ConversationState;

use super::{build_agent, load_settings};
use crate::render;

pub async fn execute() -> Result<()> {
    let settings = load_settings()?;
    let agent = build_agent(&settings)?;

    println!(
        "{} {}",
        style("ragent chat").bold().green(),
        style("- type \"exit\" to end the session").dim()
    );
    println!();

    loop {
        let question: String = input("Question:").placeholder("").interact()?;
        if question.trim().eq_ignore_ascii_case("exit") {
            break;
        }

        let mut state = match ConversationState::new(question) {
            Ok(state) => state,
            Err(e) => {
                println!("{}", style(e).yellow());
                continue;
            }
        };

        let spin = spinner();
        spin.start("awaiting reply");
        let result = agent.run_turn(&mut state).await;
        spin.stop("");

        // a failed turn ends that question only; the session continues
        match result {
            Ok(report) => {
                if let Some(answer) = state.last_assistant() {
                    render::message(answer)?;
                }
                render::trace(&report);
            }
            Err(e) => println!("{} {}", style("turn failed:").red().bold(), e),
        }
        println!();
    }
    Ok(())
}
