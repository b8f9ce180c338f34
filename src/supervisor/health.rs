//! HTTP health probes against running workers.

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::time::Duration;

use super::error::SupervisorError;

/// Health check settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Probe every Nth reconcile pass
    pub every_cycles: u32,
    /// Request path, starting with `/`
    pub path: String,
    /// Whole-request timeout (connect + response)
    pub timeout: Duration,
    /// Processes younger than this are not probed
    pub grace: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            every_cycles: 5,
            path: "/".to_string(),
            timeout: Duration::from_secs(2),
            grace: Duration::from_secs(10),
        }
    }
}

/// Issues `GET http://127.0.0.1:<port><path>` with a short timeout.
///
/// Redirects are not followed, so a 3xx answer counts as healthy.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: Client,
    path: String,
}

impl HealthChecker {
    pub fn new(config: &HealthConfig) -> Result<Self, SupervisorError> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .redirect(Policy::none())
            .user_agent(concat!("keeper-health/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SupervisorError::HealthClient)?;
        Ok(Self {
            client,
            path: config.path.clone(),
        })
    }

    /// Probe one site. `Ok(())` means a 2xx or 3xx answer arrived in time.
    pub fn probe(&self, site: &str, port: u16) -> Result<(), SupervisorError> {
        let url = format!("http://127.0.0.1:{port}{}", self.path);
        match self.client.get(&url).send() {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    Ok(())
                } else {
                    Err(SupervisorError::Unhealthy {
                        site: site.to_string(),
                        reason: format!("HTTP {}", status.as_u16()),
                    })
                }
            }
            Err(e) if e.is_timeout() => Err(SupervisorError::HealthCheckTimeout {
                site: site.to_string(),
                port,
            }),
            Err(e) => Err(SupervisorError::Unhealthy {
                site: site.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
