//! Page discovery for documentation sites.
//!
//! Before pages are fetched, docscrawl works out which URLs make up the
//! documentation set:
//! - [`find_sitemap`] locates an XML sitemap via robots.txt or common paths
//! - [`parse_sitemap_locs`] reads the `<loc>` entries of a sitemap
//! - [`discover_html_links`] follows links when no sitemap exists
//! - [`RelevanceFilter`] keeps URLs on the right domain, path and language
//! - [`RobotsRules`] applies the site's robots.txt allow/deny rules
//! - [`Fetcher`] is the retrying HTTP client shared by all of the above

mod filter;
mod http;
mod links;
mod robots;
mod sitemap;

pub use filter::RelevanceFilter;
pub use http::Fetcher;
pub use links::{discover_html_links, extract_links};
pub use robots::RobotsRules;
pub use sitemap::{
    SitemapSource, find_sitemap, is_xml_location, list_entries, parse_sitemap_locs,
    sitemap_from_robots,
};
