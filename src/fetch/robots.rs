use log::{debug, warn};
use reqwest::Client;
use url::Url;

/// Robots-exclusion rules applicable to our crawler (the `*` agent group).
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    rules: Vec<RobotsRule>,
}

#[derive(Debug, Clone)]
struct RobotsRule {
    allow: bool,
    path: String,
}

impl RobotsPolicy {
    /// Parse a robots.txt body, keeping only rules from groups addressed to
    /// `*`. Unknown directives are ignored.
    pub fn parse(content: &str) -> Self {
        let mut rules = Vec::new();
        let mut in_wildcard_group = false;
        let mut last_line_was_agent = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines extend the same group; a
                    // user-agent line after rules starts a new group.
                    if !last_line_was_agent {
                        in_wildcard_group = false;
                    }
                    if value == "*" {
                        in_wildcard_group = true;
                    }
                    last_line_was_agent = true;
                }
                "allow" | "disallow" => {
                    if in_wildcard_group && !value.is_empty() {
                        rules.push(RobotsRule {
                            allow: directive == "allow",
                            path: value.to_string(),
                        });
                    }
                    last_line_was_agent = false;
                }
                _ => {
                    last_line_was_agent = false;
                }
            }
        }

        Self { rules }
    }

    /// Whether fetching `path` is permitted. Longest matching rule wins;
    /// no matching rule means allowed.
    pub fn allows(&self, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        self.rules
            .iter()
            .filter(|rule| path.starts_with(rule.path.as_str()))
            .max_by_key(|rule| rule.path.len())
            .map(|rule| rule.allow)
            .unwrap_or(true)
    }
}

/// Resolve the robots policy for `url`'s host and decide whether a direct
/// fetch of `url` is allowed. Any infrastructure failure (unreachable host,
/// non-success status, undecodable body) fails open: scraping is only ever
/// blocked by an actual policy.
pub async fn direct_fetch_allowed(client: &Client, url: &Url) -> bool {
    let robots_url = match url.join("/robots.txt") {
        Ok(robots_url) => robots_url,
        Err(e) => {
            warn!("Could not derive robots.txt URL for {url}: {e}");
            return true;
        }
    };

    let response = match client.get(robots_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Could not fetch {robots_url}: {e}, assuming allowed");
            return true;
        }
    };

    if !response.status().is_success() {
        debug!(
            "robots.txt for {} returned {}, assuming allowed",
            url.host_str().unwrap_or("unknown"),
            response.status()
        );
        return true;
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Could not read robots.txt body for {robots_url}: {e}, assuming allowed");
            return true;
        }
    };

    let policy = RobotsPolicy::parse(&body);
    policy.allows(url.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn empty_policy_allows_everything() {
        let policy = RobotsPolicy::parse("");
        assert!(policy.allows("/"));
        assert!(policy.allows("/deals"));
    }

    #[test]
    fn disallow_applies_to_wildcard_group_only() {
        let policy = RobotsPolicy::parse(
            "User-agent: googlebot\nDisallow: /\n\nUser-agent: *\nDisallow: /private\n",
        );
        assert!(policy.allows("/"));
        assert!(policy.allows("/deals"));
        assert!(!policy.allows("/private"));
        assert!(!policy.allows("/private/sale"));
    }

    #[test]
    fn longest_match_wins() {
        let policy =
            RobotsPolicy::parse("User-agent: *\nDisallow: /shop\nAllow: /shop/public\n");
        assert!(!policy.allows("/shop"));
        assert!(!policy.allows("/shop/secret"));
        assert!(policy.allows("/shop/public/offers"));
    }

    #[test]
    fn disallow_all() {
        let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /\n");
        assert!(!policy.allows("/"));
        assert!(!policy.allows("/anything"));
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let policy = RobotsPolicy::parse("<<<not robots>>>\nUser-agent: *\nDisallow: /x\nnoise");
        assert!(!policy.allows("/x"));
        assert!(policy.allows("/y"));
    }

    #[tokio::test]
    async fn unreachable_robots_fails_open() {
        let client = Client::new();
        // Nothing listens here; resolution must still allow the fetch.
        let url = Url::parse("http://127.0.0.1:9/page").unwrap();
        assert!(direct_fetch_allowed(&client, &url).await);
    }

    #[tokio::test]
    async fn missing_robots_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let url = Url::parse(&server.uri()).unwrap().join("/deals").unwrap();
        assert!(direct_fetch_allowed(&client, &url).await);
    }

    #[tokio::test]
    async fn served_policy_is_honored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /deals\n"),
            )
            .mount(&server)
            .await;

        let client = Client::new();
        let base = Url::parse(&server.uri()).unwrap();
        assert!(!direct_fetch_allowed(&client, &base.join("/deals").unwrap()).await);
        assert!(direct_fetch_allowed(&client, &base.join("/home").unwrap()).await);
    }
}
