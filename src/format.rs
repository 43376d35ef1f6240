//! Terminal rendering of pipeline responses

use crate::agent::PipelineResponse;
use nu_ansi_term::{Color, Style};

fn heading(text: &str, use_color: bool) -> String {
    if use_color {
        Color::Cyan.bold().paint(text).to_string()
    } else {
        text.to_string()
    }
}

fn indent(text: &str) -> String {
    text.trim_end()
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Human-readable response: SQL, result and answer sections, or the error
pub fn format_response(response: &PipelineResponse, use_color: bool) -> String {
    if let Some(error) = &response.error {
        let label = if use_color {
            Color::Red.bold().paint("Error:").to_string()
        } else {
            "Error:".to_string()
        };
        return format!("{label} {error}\n");
    }

    let mut out = String::new();
    out.push_str(&format!("{}\n{}\n\n", heading("SQL:", use_color), indent(&response.sql)));

    let result = if use_color {
        Style::new().dimmed().paint(indent(&response.result)).to_string()
    } else {
        indent(&response.result)
    };
    out.push_str(&format!("{}\n{}\n", heading("Result:", use_color), result));
    if response.truncated {
        let note = "(result truncated; raise --max-rows to see more)";
        if use_color {
            out.push_str(&format!("  {}\n", Color::Yellow.paint(note)));
        } else {
            out.push_str(&format!("  {note}\n"));
        }
    }

    out.push_str(&format!("\n{}\n{}\n", heading("Answer:", use_color), indent(&response.answer)));
    out
}

/// Pretty-printed JSON response
pub fn format_json(response: &PipelineResponse) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(response)
}
