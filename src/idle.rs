use anyhow::Result;
use std::time::Duration;

/// Average utilisation (percent) of the host that runs conversion jobs.
pub trait UtilizationSource {
    /// `Ok(None)` when the source has no samples for the window.
    fn average_utilization(&self, window: Duration) -> Result<Option<f64>>;
}

/// Decides whether a worker host can be stopped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdlePolicy {
    pub threshold_percent: f64,
    pub window: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self { threshold_percent: 5.0, window: Duration::from_secs(60 * 60) }
    }
}

impl IdlePolicy {
    /// Idle when the window average is strictly below the threshold. A window without
    /// samples counts as idle.
    pub fn is_idle(&self, source: &dyn UtilizationSource) -> Result<bool> {
        match source.average_utilization(self.window)? {
            None => {
                tracing::info!(window_secs = self.window.as_secs(), "no utilisation samples; treating host as idle");
                Ok(true)
            }
            Some(avg) => {
                tracing::info!(average = avg, threshold = self.threshold_percent, "utilisation");
                Ok(avg < self.threshold_percent)
            }
        }
    }
}

/// Fixed samples; averages whatever it holds regardless of the window.
#[derive(Clone, Debug, Default)]
pub struct StaticSamples(pub Vec<f64>);

impl UtilizationSource for StaticSamples {
    fn average_utilization(&self, _window: Duration) -> Result<Option<f64>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.0.iter().sum::<f64>() / self.0.len() as f64))
    }
}
