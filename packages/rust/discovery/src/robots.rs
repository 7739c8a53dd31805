//! robots.txt allow/deny rules for the crawl domain.

use robotstxt_rs::RobotsTxt;
use tracing::{debug, info, instrument};
use url::Url;

use docscrawl_shared::url::origin;

use crate::http::Fetcher;

/// The robots.txt of one site, evaluated for a fixed user agent.
pub struct RobotsRules {
    robots: Option<RobotsTxt>,
    user_agent: String,
}

impl std::fmt::Debug for RobotsRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotsRules")
            .field("present", &self.robots.is_some())
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RobotsRules {
    /// Rules that allow every URL.
    pub fn allow_all(user_agent: &str) -> Self {
        Self {
            robots: None,
            user_agent: user_agent.to_string(),
        }
    }

    pub fn parse(body: &str, user_agent: &str) -> Self {
        Self {
            robots: Some(RobotsTxt::parse(body)),
            user_agent: user_agent.to_string(),
        }
    }

    /// Load `<origin>/robots.txt` for `base`.
    ///
    /// Anything but a `200 OK` (missing file, server error, network failure)
    /// allows everything.
    #[instrument(skip_all, fields(base = %base))]
    pub async fn fetch(fetcher: &Fetcher, base: &Url, user_agent: &str) -> Self {
        let robots_url = format!("{}/robots.txt", origin(base));
        match fetcher.try_get(&robots_url).await {
            Some(body) => {
                info!(robots = %robots_url, "loaded robots.txt rules");
                Self::parse(&body, user_agent)
            }
            None => {
                debug!(robots = %robots_url, "no robots.txt, allowing all");
                Self::allow_all(user_agent)
            }
        }
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        match &self.robots {
            Some(robots) => robots.can_fetch(&self.user_agent, url),
            None => true,
        }
    }
}
