use super::traits::ProbeResponse;
use crate::error::ResourceError;
use std::time::Duration;

/// Response bodies beyond this are cut before being handed to checks.
const MAX_BODY_BYTES: usize = 65_536;

/// Single GET against `url`; any status other than `expected_status` is a probe error.
pub async fn http_probe(
    client: &reqwest::Client,
    url: &str,
    expected_status: u16,
    timeout: Duration,
) -> Result<ProbeResponse, ResourceError> {
    let probe_error = |message: String, status: Option<u16>| ResourceError::Probe {
        url: url.to_string(),
        status,
        message,
    };

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                probe_error(format!("no response within {}s", timeout.as_secs()), None)
            } else {
                probe_error(e.to_string(), None)
            }
        })?;

    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_BODY_BYTES {
        body.truncate(body.floor_char_boundary(MAX_BODY_BYTES));
    }

    if status != expected_status {
        return Err(probe_error(
            format!("unexpected status {status}, expected {expected_status}"),
            Some(status),
        ));
    }

    Ok(ProbeResponse { status, body })
}
