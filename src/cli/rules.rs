//! `hookwise rules`: load and summarize the configured rules.

use std::path::Path;

use anyhow::Result;

use hookwise::config;

pub fn run(rules_path: Option<&Path>) -> Result<()> {
    let rules = config::load_rules(rules_path);

    if rules.is_empty() {
        println!("No rules loaded.");
        return Ok(());
    }

    println!("{} rule(s):", rules.len());
    for rule in &rules {
        let mut events: Vec<&str> = rule.triggers.keys().map(|e| e.as_str()).collect();
        events.sort_unstable();
        println!(
            "  {:<28} {:<8} {:<16} [{}]",
            rule.name,
            rule.priority.as_str(),
            rule.action.kind(),
            events.join(", ")
        );
    }

    Ok(())
}
