use anyhow::{Context, Result};
use repokit::repository::{explain, Criteria};

pub fn execute(query: &str, compact: bool) -> Result<()> {
    println!("{}", render(query, compact)?);
    Ok(())
}

fn render(query: &str, compact: bool) -> Result<String> {
    let criteria = Criteria::from_query(query)
        .with_context(|| format!("Failed to parse query string: {}", query))?;
    let explained = explain(&criteria);

    let json = if compact {
        serde_json::to_string(&explained)?
    } else {
        serde_json::to_string_pretty(&explained)?
    };
    Ok(json)
}
