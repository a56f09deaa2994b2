use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use tracing::debug;

use crate::channel::{ReportSession, ReportSource};
use crate::dashboard::{self, Locator, Step};
use crate::domain::{ReportLevel, UnitOfWork};
use crate::error::{ChannelError, ChannelErrorKind, HarvestError};
use crate::store::ArtifactStore;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct WebDriverSettings {
    pub driver_url: String,
    pub dashboard_url: String,
    pub headless: bool,
    pub element_timeout: Duration,
    pub download_timeout: Duration,
}

/// Report source backed by a W3C WebDriver endpoint (chromedriver or compatible).
#[derive(Clone)]
pub struct WebDriverSource {
    client: Client,
    settings: WebDriverSettings,
}

impl WebDriverSource {
    pub fn new(settings: WebDriverSettings) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("vahan-harvest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::InvalidConfig(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| ChannelError::channel(err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn start_session(
        &self,
        download_dir: Option<&Utf8Path>,
    ) -> Result<WebDriverSession, ChannelError> {
        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
        if self.settings.headless {
            args.push("--headless");
        }
        let mut prefs = json!({
            "credentials_enable_service": false,
            "profile.password_manager_enabled": false,
        });
        if let Some(dir) = download_dir {
            prefs["download.default_directory"] = Value::String(dir.to_string());
            prefs["download.prompt_for_download"] = Value::Bool(false);
        }
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": prefs,
                        "excludeSwitches": ["enable-automation", "enable-logging"],
                    }
                }
            }
        });

        let base = self.settings.driver_url.trim_end_matches('/').to_string();
        let value = send(self.client.post(format!("{base}/session")).json(&body))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::channel("webdriver returned no session id"))?
            .to_string();
        debug!(session = %session_id, "webdriver session opened");

        Ok(WebDriverSession {
            client: self.client.clone(),
            base: format!("{base}/session/{session_id}"),
            settings: self.settings.clone(),
            download_dir: download_dir.map(Utf8Path::to_path_buf),
        })
    }
}

impl ReportSource for WebDriverSource {
    type Session = WebDriverSession;

    fn open(&self, download_dir: &Utf8Path) -> Result<Self::Session, ChannelError> {
        self.start_session(Some(download_dir))
    }

    fn list_children(
        &self,
        level: ReportLevel,
        parent: &str,
    ) -> Result<Vec<String>, ChannelError> {
        let Some(script) = dashboard::listing_script(level, parent) else {
            return Ok(Vec::new());
        };
        let session = self.start_session(None)?;
        let result: Result<Vec<String>, ChannelError> = (|| {
            session.run_steps(&script.steps)?;
            let container = session.wait_for(&script.container)?;
            let items = session.find_all_within(&container, &script.item)?;
            let mut children = Vec::new();
            for item in items {
                let text = session.text(&item)?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if script.exclude.is_some_and(|exclude| text.contains(exclude)) {
                    continue;
                }
                children.push(text.to_string());
            }
            Ok(children)
        })();
        session.close();
        result
    }
}

pub struct WebDriverSession {
    client: Client,
    base: String,
    settings: WebDriverSettings,
    download_dir: Option<Utf8PathBuf>,
}

impl WebDriverSession {
    fn run_steps(&self, steps: &[Step]) -> Result<(), ChannelError> {
        for step in steps {
            match step {
                Step::Navigate => {
                    send(
                        self.client
                            .post(format!("{}/url", self.base))
                            .json(&json!({ "url": self.settings.dashboard_url })),
                    )?;
                }
                Step::Click(locator) => self.click(locator)?,
                Step::Pause(duration) => thread::sleep(*duration),
            }
        }
        Ok(())
    }

    fn find(&self, locator: &Locator) -> Result<String, ChannelError> {
        let (using, value) = locator.strategy();
        let value = send(
            self.client
                .post(format!("{}/element", self.base))
                .json(&json!({ "using": using, "value": value })),
        )?;
        element_id(&value)
    }

    /// Polls until `locator` resolves or the element timeout passes.
    fn wait_for(&self, locator: &Locator) -> Result<String, ChannelError> {
        let deadline = Instant::now() + self.settings.element_timeout;
        loop {
            match self.find(locator) {
                Ok(id) => return Ok(id),
                Err(err) if err.kind == ChannelErrorKind::Timeout && Instant::now() < deadline => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    return Err(ChannelError::new(
                        err.kind,
                        format!("element {locator:?}: {}", err.message),
                    ));
                }
            }
        }
    }

    /// Waits for `locator` to be clickable, then clicks it.
    fn click(&self, locator: &Locator) -> Result<(), ChannelError> {
        let deadline = Instant::now() + self.settings.element_timeout;
        loop {
            let attempt = self.wait_for(locator).and_then(|id| {
                send(
                    self.client
                        .post(format!("{}/element/{id}/click", self.base))
                        .json(&json!({})),
                )
                .map(|_| ())
            });
            match attempt {
                Ok(()) => return Ok(()),
                Err(err) if err.kind == ChannelErrorKind::Timeout && Instant::now() < deadline => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn find_all_within(
        &self,
        parent: &str,
        locator: &Locator,
    ) -> Result<Vec<String>, ChannelError> {
        let (using, value) = locator.strategy();
        let value = send(
            self.client
                .post(format!("{}/element/{parent}/elements", self.base))
                .json(&json!({ "using": using, "value": value })),
        )?;
        value
            .as_array()
            .ok_or_else(|| ChannelError::channel("webdriver returned no element list"))?
            .iter()
            .map(element_id)
            .collect()
    }

    fn text(&self, element: &str) -> Result<String, ChannelError> {
        let value = send(self.client.get(format!("{}/element/{element}/text", self.base)))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn wait_for_download(&self) -> Result<(), ChannelError> {
        let Some(dir) = &self.download_dir else {
            return Ok(());
        };
        let deadline = Instant::now() + self.settings.download_timeout;
        loop {
            let settled = ArtifactStore::settle_download(dir)
                .map_err(|err| ChannelError::fatal(err.to_string()))?;
            if settled.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ChannelError::timeout(format!("no report downloaded into {dir}")));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ReportSession for WebDriverSession {
    fn perform(&mut self, unit: &UnitOfWork) -> Result<(), ChannelError> {
        let steps = dashboard::report_script(unit)
            .map_err(|err| ChannelError::fatal(err.to_string()))?;
        self.run_steps(&steps)?;
        self.wait_for_download()
    }

    fn close(self) {
        if let Err(err) = send(self.client.delete(&self.base)) {
            debug!(error = %err, "failed to close webdriver session");
        }
    }
}

fn element_id(value: &Value) -> Result<String, ChannelError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChannelError::channel("webdriver returned no element reference"))
}

/// Sends a WebDriver command and unwraps the `value` member of the reply.
fn send(request: reqwest::blocking::RequestBuilder) -> Result<Value, ChannelError> {
    let response = request
        .send()
        .map_err(|err| ChannelError::channel(err.to_string()))?;
    let status = response.status();
    let body: Value = response
        .json()
        .map_err(|err| ChannelError::channel(format!("status {status}: {err}")))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Err(ChannelError::new(classify(code), format!("{code}: {message}")))
}

/// Maps a WebDriver error code onto a channel failure class.
pub fn classify(code: &str) -> ChannelErrorKind {
    match code {
        "timeout" | "script timeout" | "no such element" | "element not interactable"
        | "element click intercepted" => ChannelErrorKind::Timeout,
        "stale element reference" => ChannelErrorKind::StaleElement,
        "unknown error" | "session not created" | "invalid session id" | "no such window"
        | "unable to set cookie" => ChannelErrorKind::Channel,
        _ => ChannelErrorKind::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_webdriver_codes() {
        assert_eq!(classify("no such element"), ChannelErrorKind::Timeout);
        assert_eq!(classify("stale element reference"), ChannelErrorKind::StaleElement);
        assert_eq!(classify("invalid session id"), ChannelErrorKind::Channel);
        assert_eq!(classify("invalid selector"), ChannelErrorKind::Fatal);
    }

    #[test]
    fn element_id_reads_w3c_key() {
        let value = json!({ ELEMENT_KEY: "abc" });
        assert_eq!(element_id(&value).unwrap(), "abc");
        assert!(element_id(&json!({})).is_err());
    }
}
