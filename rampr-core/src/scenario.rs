use std::time::Duration;

use async_trait::async_trait;

use crate::checks::login_status_checks;
use crate::config::DEFAULT_LOGIN_URL;
use crate::error::*;
use crate::payload::generate_payload;
use crate::vu::VuContext;

/// The body one VU runs on every iteration.
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    async fn iteration(&self, ctx: &VuContext) -> Result<()>;
}

/// Posts a randomized login, records both status checks, then pauses.
#[derive(Debug, Clone)]
pub struct LoginScenario {
    url: String,
    pause: Duration,
}

impl Default for LoginScenario {
    fn default() -> Self {
        Self {
            url: DEFAULT_LOGIN_URL.to_owned(),
            pause: Duration::from_secs(1),
        }
    }
}

impl LoginScenario {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }
}

#[async_trait]
impl Scenario for LoginScenario {
    async fn iteration(&self, ctx: &VuContext) -> Result<()> {
        let body = {
            let mut rng = rand::thread_rng();
            generate_payload(&mut rng).to_json()?
        };

        // Transport errors are already counted by the context; both checks then fail.
        let status = ctx.post_json(&self.url, body).await.ok().map(|r| r.status());
        for (name, ok) in login_status_checks(status) {
            ctx.check(name, ok);
        }

        ctx.pause(self.pause).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_fixed_login_url_with_one_second_pause() {
        let scenario = LoginScenario::default();
        assert_eq!(scenario.url(), "http://192.168.1.34:8082/login");
        assert_eq!(scenario.pause(), Duration::from_secs(1));
    }

    #[test]
    fn builder_overrides() {
        let scenario = LoginScenario::new("http://127.0.0.1:9/login").with_pause(Duration::ZERO);
        assert_eq!(scenario.url(), "http://127.0.0.1:9/login");
        assert_eq!(scenario.pause(), Duration::ZERO);
    }
}
