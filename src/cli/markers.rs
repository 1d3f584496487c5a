use anyhow::Result;
use feedwarden_core_types::ItemId;
use serde::Serialize;

use crate::cli::context::CliContext;
use crate::cli::output::render;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkerListing {
    not_interested: Vec<ItemId>,
    warning: Vec<ItemId>,
}

pub async fn cmd_markers(ctx: &CliContext) -> Result<()> {
    let markers = ctx.open_markers()?;
    let listing = MarkerListing {
        not_interested: markers.not_interested.ids(),
        warning: markers.warning.ids(),
    };
    if let Some(text) = render(ctx.output(), &listing)? {
        println!("{text}");
        return Ok(());
    }

    println!("Marked not interested ({}):", listing.not_interested.len());
    for id in &listing.not_interested {
        println!("- {id}");
    }
    println!("Warning applied ({}):", listing.warning.len());
    for id in &listing.warning {
        println!("- {id}");
    }
    Ok(())
}
