use reqwest::header::{HeaderValue, InvalidHeaderValue};
use secrecy::{ExposeSecret, SecretString};

/// The avatar service takes its key as an already encoded Basic credential.
pub fn basic_authorization(api_key: &SecretString) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Basic {}", api_key.expose_secret()))?;
    value.set_sensitive(true);
    Ok(value)
}

pub fn stream_url(base_url: &str, stream_id: Option<&str>, suffix: Option<&str>) -> String {
    let mut url = format!("{}{}", base_url, crate::consts::STREAMS_PATH);
    if let Some(id) = stream_id {
        url.push('/');
        url.push_str(id);
    }
    if let Some(suffix) = suffix {
        url.push('/');
        url.push_str(suffix);
    }
    url
}
