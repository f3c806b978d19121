//! Search command handler.

use anyhow::Result;
use digest_hub::search::{SearchEngine, SearchHit, SearchRequest};

use super::{AppContext, print_json};
use crate::cli::SearchArgs;

pub async fn run_search_command(ctx: &AppContext, args: &SearchArgs) -> Result<()> {
    let engine = SearchEngine::new(ctx.store()).with_weights(ctx.settings.weights)?;
    let threshold = args
        .threshold
        .unwrap_or(ctx.settings.similarity_threshold);
    let request = SearchRequest::hybrid(args.query.clone(), threshold)
        .with_mode(args.mode)
        .with_limit(args.limit);

    let hits = engine.search(&request).await?;
    if args.json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No results for \"{}\" ({} search).", args.query, args.mode);
        return Ok(());
    }
    for hit in &hits {
        println!("{}", render_hit(hit));
    }
    Ok(())
}

fn render_hit(hit: &SearchHit) -> String {
    let title = if hit.item.title.is_empty() {
        "(untitled)"
    } else {
        hit.item.title.as_str()
    };
    let mut rendered = format!(
        "{:.3}  {}  [{}]  {}",
        hit.score, title, hit.item.source_id, hit.item.id
    );
    if let Some(url) = &hit.item.url {
        rendered.push_str("\n       ");
        rendered.push_str(url);
    }
    if !hit.excerpt.is_empty() {
        rendered.push_str("\n       ");
        rendered.push_str(&hit.excerpt.replace('\n', " "));
    }
    rendered
}
