//! Tools listing command

use colored::Colorize;

/// Show available tools
pub fn tools_command() {
    println!("{}\n", "Available Tools".bold());

    for (name, description) in eventdesk_core::tools::catalog() {
        println!("{}", name.cyan());
        let first_line = description.lines().next().unwrap_or(description);
        println!("   {}\n", first_line);
    }
}
