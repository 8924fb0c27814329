use super::Config;
use crate::error::ConfigError;

/// Kubernetes object names: lowercase alphanumerics and `-`, at most 63
/// characters, alphanumeric at both ends.
fn is_dns1123_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        for (field, value) in [
            ("namespace", self.namespace.as_str()),
            ("release", self.release.as_str()),
            ("sample_app.name", self.sample_app.name.as_str()),
        ] {
            if !is_dns1123_label(value) {
                return invalid(format!(
                    "{field} '{value}' is not a valid DNS-1123 label"
                ));
            }
        }
        if let Some(ns) = &self.sample_app.namespace
            && !is_dns1123_label(ns)
        {
            return invalid(format!(
                "sample_app.namespace '{ns}' is not a valid DNS-1123 label"
            ));
        }

        if self.timeout_secs == 0 {
            return invalid("timeout_secs must be greater than 0".into());
        }
        if self.run_timeout_secs == Some(0) {
            return invalid("run_timeout_secs must be greater than 0".into());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return invalid(format!(
                "retry.jitter must be within [0, 1], got {}",
                self.retry.jitter
            ));
        }

        match url::Url::parse(&self.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            Ok(url) => {
                return invalid(format!(
                    "endpoint '{}' must be an http(s) URL, got scheme '{}'",
                    self.endpoint,
                    url.scheme()
                ));
            }
            Err(e) => return invalid(format!("endpoint '{}' is not a URL: {e}", self.endpoint)),
        }

        Ok(())
    }
}
