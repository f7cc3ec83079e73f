use std::fmt::Write as _;

/// A single `User-Agent` block of a robots.txt file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsRule {
    pub user_agent: String,
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    pub crawl_delay: Option<u32>,
}

impl RobotsRule {
    pub fn for_all_agents() -> Self {
        Self {
            user_agent: "*".to_string(),
            allow: Vec::new(),
            disallow: Vec::new(),
            crawl_delay: None,
        }
    }
}

/// Crawler directives served at `/robots.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Robots {
    pub rules: Vec<RobotsRule>,
    pub host: Option<String>,
    pub sitemaps: Vec<String>,
}

impl Robots {
    /// Builds the directives for a site rooted at `public_origin`.
    ///
    /// Indexable sites expose everything except the API and auth surfaces;
    /// anything else asks crawlers to stay away entirely.
    pub fn for_site(public_origin: &str, indexable: bool) -> Self {
        let origin = public_origin.trim_end_matches('/');
        if !indexable {
            let mut rule = RobotsRule::for_all_agents();
            rule.disallow.push("/".to_string());
            return Self {
                rules: vec![rule],
                host: None,
                sitemaps: Vec::new(),
            };
        }

        let mut rule = RobotsRule::for_all_agents();
        rule.allow.push("/".to_string());
        rule.disallow.extend(["/api/".to_string(), "/auth/".to_string()]);
        Self {
            rules: vec![rule],
            host: Some(origin.to_string()),
            sitemaps: vec![format!("{origin}/sitemap.xml")],
        }
    }

    /// Renders the robots.txt body.
    pub fn render(&self) -> String {
        let mut body = String::new();
        for rule in &self.rules {
            let _ = writeln!(body, "User-Agent: {}", rule.user_agent);
            for path in &rule.allow {
                let _ = writeln!(body, "Allow: {path}");
            }
            for path in &rule.disallow {
                let _ = writeln!(body, "Disallow: {path}");
            }
            if let Some(delay) = rule.crawl_delay {
                let _ = writeln!(body, "Crawl-delay: {delay}");
            }
            body.push('\n');
        }
        if let Some(host) = &self.host {
            let _ = writeln!(body, "Host: {host}");
        }
        for sitemap in &self.sitemaps {
            let _ = writeln!(body, "Sitemap: {sitemap}");
        }
        body
    }
}
