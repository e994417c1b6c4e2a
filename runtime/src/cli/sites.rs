//! List the built-in sites and their configuration schema.

use crate::adapters::{self, SiteAdapter};
use anyhow::Result;
use serde_json::{json, Value};

fn describe(adapter: &dyn SiteAdapter) -> Value {
    json!({
        "name": adapter.name(),
        "display_name": adapter.display_name(),
        "domains": adapter.base_domains(),
        "default_rss_links": adapter.default_rss_links(),
        "requires_scrolling": adapter.requires_scrolling(),
        "options": adapter.config_options(),
    })
}

pub fn run(as_json: bool) -> Result<()> {
    let sites = adapters::all();
    if as_json {
        let listing: Vec<Value> = sites.iter().map(|a| describe(a.as_ref())).collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for adapter in &sites {
        println!(
            "{} ({})  {}",
            adapter.display_name(),
            adapter.name(),
            adapter.base_domains().join(", ")
        );
        for option in adapter.config_options() {
            let marker = if option.required { "*" } else { " " };
            println!("  {marker} {:<26} {}", option.key, option.description);
        }
        println!();
    }
    println!("* required");
    Ok(())
}
