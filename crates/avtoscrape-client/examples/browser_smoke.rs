/// Smoke test for `BrowserRenderer` against the live avto.net results page.
///
/// Renders the first car results page, parses it with the site layout and
/// prints how many listings were found.
///
/// Run with:
///   cargo run -p avtoscrape-client --example browser_smoke --features browser
use avtoscrape_client::{BrowserRenderer, HtmlListingParser};
use avtoscrape_core::models::VehicleCategory;
use avtoscrape_core::site::SiteId;
use avtoscrape_core::traits::{ListingParser, Renderer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let site = SiteId::AvtoNet.config();
    let layout = site
        .layout
        .ok_or_else(|| anyhow::anyhow!("{} has no results layout", site.name))?;
    let url = site
        .category_url(VehicleCategory::Car)
        .ok_or_else(|| anyhow::anyhow!("{} has no car results page", site.name))?;

    println!("Launching headless browser…");
    let renderer = BrowserRenderer::new().await?;

    let page = renderer.render(url, layout.ready).await?;
    println!("Final URL: {}", page.final_url);
    println!("Got {} bytes of rendered HTML", page.html.len());

    let listings = HtmlListingParser::new().parse(&page, &layout)?;
    println!("Parsed {} listings", listings.len());
    if let Some(first) = listings.first() {
        println!("First: {:?} -> {:?}", first.name_parts, first.link);
    }
    Ok(())
}
