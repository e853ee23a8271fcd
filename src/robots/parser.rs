use robotstxt::DefaultMatcher;

/// Parsed robots.txt directives for one host
///
/// Wraps the robotstxt crate's matcher with a permissive fallback for hosts
/// whose robots.txt could not be fetched. Crawl-delay is not part of the
/// matcher's surface, so it is parsed by hand.
#[derive(Debug, Clone)]
pub struct RobotsRules {
    content: String,
    permissive: bool,
}

impl RobotsRules {
    /// Parses raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            permissive: false,
        }
    }

    /// A permissive rule set used when robots.txt is absent or unreachable
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            permissive: true,
        }
    }

    /// Checks whether a URL is allowed for the given user agent
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.permissive || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Crawl-delay in seconds for the given user agent, if declared
    ///
    /// A delay declared for the agent's own group takes precedence over one
    /// declared for `*`.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.permissive || self.content.is_empty() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_directives = false;
        let mut wildcard_delay = None;
        let mut agent_delay = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // A user-agent line after directives starts a new group
                    if in_directives {
                        group_agents.clear();
                        in_directives = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_directives = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group_agents.iter().any(|ua| agent.contains(ua.as_str())) {
                        agent_delay = Some(delay);
                    } else if group_agents.iter().any(|ua| ua == "*") {
                        wildcard_delay = Some(delay);
                    }
                }
                _ => {
                    in_directives = true;
                }
            }
        }

        agent_delay.or(wildcard_delay)
    }
}
