//! Terminal rendering for the conversation loop.

use console::style;
use std::io::{self, Write};

pub fn banner() {
    println!("{}", style("fundrec — conversational fund advisor").cyan().bold());
    println!("{}", style("type \"exit\" to quit, \"restart\" to start over").dim());
    println!();
}

pub fn print_advisor(text: &str) {
    println!("{} {}", style("advisor>").green().bold(), text);
    println!();
}

pub fn print_notice(text: &str) {
    println!("{}", style(text).yellow());
}

/// Reads one line of user input; `None` on EOF.
pub fn read_input() -> io::Result<Option<String>> {
    print!("{} ", style("you>").blue().bold());
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

pub fn status_line(label: &str, value: &str, ok: bool) {
    let mark = if ok {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!("  {mark} {}: {value}", style(label).bold());
}
