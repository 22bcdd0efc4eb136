pub mod fetcher;
pub mod parser;

#[cfg(feature = "browser")]
pub mod browser_renderer;

pub use fetcher::ReqwestFetcher;
pub use parser::HtmlListingParser;

#[cfg(feature = "browser")]
pub use browser_renderer::BrowserRenderer;
