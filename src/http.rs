use std::time::Duration;

/// Issues a single GET without retries. Failures come back as readable
/// strings for the log.
pub(crate) fn get_text(
    url: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<String, String> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(read_timeout)
        .timeout_write(read_timeout)
        .build();

    match agent.get(url).set("Accept", "application/json").call() {
        Ok(response) => response
            .into_string()
            .map_err(|err| format!("request failed: response decode failed: {err}")),
        Err(ureq::Error::Status(status, response)) => {
            let response_body = response.into_string().ok().unwrap_or_default();
            let body = response_body.trim();
            if body.is_empty() {
                Err(format!("request failed: HTTP status {status}"))
            } else {
                let truncated = body.chars().take(240).collect::<String>();
                Err(format!("request failed: HTTP status {status} ({truncated})"))
            }
        }
        Err(ureq::Error::Transport(err)) => Err(format!("request failed: transport error: {err}")),
    }
}
