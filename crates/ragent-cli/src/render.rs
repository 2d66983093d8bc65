use anyhow::{anyhow, Result};
use bat::WrappingMode;
use console::style;
use ragent::agent::TurnReport;
use ragent::models::message::{Message, MessageContent};
use ragent::retrieval::RetrievedPassage;

const THEME: &str = "zenburn";

fn print(content: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(THEME)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .map_err(|e| anyhow!("failed to render output: {}", e))?;
    println!();
    Ok(())
}

fn print_titled(content: &str, title: String, language: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()).name(title))
        .theme(THEME)
        .language(language)
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print()
        .map_err(|e| anyhow!("failed to render output: {}", e))?;
    Ok(())
}

/// Render every part of a message
pub fn message(message: &Message) -> Result<()> {
    for content in &message.content {
        match content {
            MessageContent::Text(text) => print(&text.text)?,
            MessageContent::ToolRequest(request) => match &request.tool_call {
                Ok(call) => print_titled(
                    &serde_json::to_string_pretty(&call.arguments)?,
                    format!("Tool Request: {}", call.name),
                    "JSON",
                )?,
                Err(e) => print(&e.to_string())?,
            },
            MessageContent::ToolResponse(response) => match &response.tool_result {
                Ok(output) => print_titled(output, "Tool Response:".to_string(), "Markdown")?,
                Err(e) => print(&e.to_string())?,
            },
        }
    }
    Ok(())
}

pub fn trace(report: &TurnReport) {
    let path = report
        .visited
        .iter()
        .map(|node| node.to_string())
        .collect::<Vec<_>>()
        .join(" → ");
    println!(
        "{} {} {}",
        style("trace:").dim(),
        style(path).dim(),
        style(format!("({} rewrites)", report.rewrites)).dim()
    );
}

pub fn passages(passages: &[RetrievedPassage]) -> Result<()> {
    if passages.is_empty() {
        println!("{}", style("No matching passages.").yellow());
        return Ok(());
    }
    for (rank, passage) in passages.iter().enumerate() {
        let page = passage
            .metadata
            .get("page")
            .map(|page| format!(", page {}", page))
            .unwrap_or_default();
        print_titled(
            &passage.text,
            format!("#{} score {:.3}{}", rank + 1, passage.score, page),
            "Markdown",
        )?;
    }
    Ok(())
}
