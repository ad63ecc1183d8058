use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::COOKIE;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::logger::{TrafficLogMode, TrafficLogger};
use crate::markup;
use crate::protocol::{
    self, CSRF_HEADER, DEFAULT_BASE_URL, LOGIN_PATH, ROOT_PATH, SESSION_PATH, SetpointPayload,
};
use crate::session::{CookieJar, FileSessionStore, MemorySessionStore, Session, SessionStore};
use crate::types::*;
use crate::{Error, Result};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Forced re-logins allowed while fetching the climate page.
const MAX_SESSION_RENEWALS: usize = 1;

struct Credentials {
    login: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct NexiaClientBuilder {
    house_id: u64,
    credentials: Credentials,
    base_url: String,
    session_ttl: Duration,
    connect_timeout: Duration,
    store: Option<Box<dyn SessionStore>>,
    log_mode: Option<TrafficLogMode>,
    log_path: Option<String>,
}

impl NexiaClientBuilder {
    pub fn new(house_id: u64, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            house_id,
            credentials: Credentials {
                login: login.into(),
                password: password.into(),
            },
            base_url: DEFAULT_BASE_URL.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            store: None,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Maximum idle age of a stored session before a full re-login.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn session_store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Persist the session as JSON at `path`.
    pub fn session_file(self, path: impl Into<PathBuf>) -> Self {
        self.session_store(FileSessionStore::new(path))
    }

    pub fn traffic_log(mut self, mode: TrafficLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<NexiaClient> {
        let http = reqwest::Client::builder()
            .default_headers(protocol::default_headers())
            .connect_timeout(self.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(TrafficLogger::new(mode, &path)?),
            _ => None,
        };

        Ok(NexiaClient {
            http,
            base_url: self.base_url,
            house_id: self.house_id,
            credentials: self.credentials,
            session_ttl: self.session_ttl,
            store: self
                .store
                .unwrap_or_else(|| Box::new(MemorySessionStore::new())),
            session: None,
            jar: CookieJar::default(),
            logger,
        })
    }
}

/// Client for one house on the portal.
///
/// Every operation lazily establishes a session, fetches fresh thermostat
/// state, and then either derives a value from it or writes setpoints back.
/// Nothing is cached between operations except the session itself.
pub struct NexiaClient {
    http: reqwest::Client,
    base_url: String,
    house_id: u64,
    credentials: Credentials,
    session_ttl: Duration,
    store: Box<dyn SessionStore>,
    session: Option<Session>,
    jar: CookieJar,
    logger: Option<TrafficLogger>,
}

impl NexiaClient {
    pub fn builder(
        house_id: u64,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> NexiaClientBuilder {
        NexiaClientBuilder::new(house_id, login, password)
    }

    pub fn house_id(&self) -> u64 {
        self.house_id
    }

    /// The current in-memory session, if one has been established or restored.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    // -- Session lifecycle --

    /// Return a verified session, logging in when none is stored, when the
    /// stored one is older than the TTL, or when `force_new` is set.
    ///
    /// The portal root is fetched on every call, including when a session is
    /// reused, because a stored cookie may have been revoked server-side.
    pub async fn ensure_session(&mut self, force_new: bool) -> Result<&Session> {
        if self.session.is_none()
            && let Some(stored) = self.store.load()?
        {
            debug!("restored persisted session");
            self.jar = stored.cookies.clone();
            self.session = Some(stored);
        }

        if self.session.is_some() {
            if force_new {
                debug!("discarding session: renewal forced");
                self.discard_session()?;
            } else if self.session_expired()? {
                debug!(ttl_secs = self.session_ttl.as_secs(), "discarding session: expired");
                self.discard_session()?;
            }
        }

        let reused = self.session.is_some();
        if !reused {
            self.login().await?;
        }

        let req = self.request(Method::GET, ROOT_PATH);
        let resp = self.execute(req, None).await?;
        let status = resp.status();
        if !status.is_success() {
            if reused {
                warn!(status = status.as_u16(), "stored session revoked by portal");
                self.discard_session()?;
            }
            return Err(Error::Authentication {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        let csrf_token = markup::extract_csrf_token(&body)?;
        let found = markup::extract_house_id(&body)?;
        if found != self.house_id {
            return Err(Error::HouseMismatch {
                expected: self.house_id,
                found,
            });
        }

        let session = Session {
            cookies: self.jar.clone(),
            csrf_token,
            refreshed_at: Utc::now(),
        };
        self.store.save(&session)?;
        trace!("session verified");
        Ok(&*self.session.insert(session))
    }

    /// Forget the session, in memory and in the store. The next operation
    /// performs a full login.
    pub fn clear_session(&mut self) -> Result<()> {
        self.discard_session()
    }

    // -- Thermostat state --

    pub async fn thermostats(&mut self) -> Result<Vec<Thermostat>> {
        self.fetch_thermostats().await
    }

    pub async fn thermostat(&mut self, selector: impl Into<Selector>) -> Result<Thermostat> {
        let selector = selector.into();
        let thermostats = self.fetch_thermostats().await?;
        find_thermostat(&thermostats, &selector).cloned()
    }

    pub async fn thermostat_ids(&mut self) -> Result<Vec<u64>> {
        Ok(self.fetch_thermostats().await?.iter().map(|t| t.id).collect())
    }

    pub async fn current_temperature(&mut self, selector: impl Into<Selector>) -> Result<f64> {
        let thermostat = self.thermostat(selector).await?;
        Ok(thermostat.require_zone()?.temperature)
    }

    /// Setpoint of the active mode. Fails with `UnsupportedMode` when the
    /// thermostat is neither cooling nor heating.
    pub async fn current_setpoint(&mut self, selector: impl Into<Selector>) -> Result<f64> {
        let thermostat = self.thermostat(selector).await?;
        thermostat.require_zone()?;
        thermostat
            .setpoint()
            .ok_or_else(|| Error::UnsupportedMode(thermostat.operating_mode.clone()))
    }

    pub async fn operating_mode(&mut self, selector: impl Into<Selector>) -> Result<OperatingMode> {
        Ok(self.thermostat(selector).await?.operating_mode)
    }

    // -- Command methods --

    /// Set the setpoint of the thermostat's active mode, keeping the other
    /// setpoint unchanged. Returns `false` when the portal does not accept
    /// the write.
    pub async fn set_temperature(
        &mut self,
        selector: impl Into<Selector>,
        temperature: f64,
    ) -> Result<bool> {
        let thermostat = self.thermostat(selector).await?;
        let zone = thermostat.require_zone()?;
        let payload = SetpointPayload::for_mode(&thermostat.operating_mode, zone, temperature)?;
        self.write_setpoints(&thermostat, &payload).await
    }

    /// Set both setpoints regardless of mode. Rejects a heating setpoint
    /// above the cooling setpoint before touching the network.
    pub async fn set_setpoints(
        &mut self,
        selector: impl Into<Selector>,
        cooling: f64,
        heating: f64,
    ) -> Result<bool> {
        if heating > cooling {
            return Err(Error::InvalidSetpoints { cooling, heating });
        }
        let thermostat = self.thermostat(selector).await?;
        let payload = SetpointPayload::new(cooling, heating);
        self.write_setpoints(&thermostat, &payload).await
    }

    /// Daily history, or monthly history when `annual` is set.
    pub async fn history(
        &mut self,
        selector: impl Into<Selector>,
        annual: bool,
    ) -> Result<Vec<HistoryRecord>> {
        let thermostat = self.thermostat(selector).await?;
        let path = protocol::history_path(thermostat.id, HistoryPeriod::from_annual(annual));
        let req = self.request(Method::GET, &path);
        let resp = self.execute(req, None).await?;
        let status = resp.status();

        if protocol::is_permanent_redirect(status) {
            return Err(Error::EndpointMoved {
                url: self.url(&path),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(Error::Request {
                url: self.url(&path),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        protocol::parse_history_csv(&body)
    }

    // -- Helpers --

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_expired(&self) -> Result<bool> {
        let Some(written) = self.store.last_write()? else {
            return Ok(true);
        };
        let age = Utc::now().signed_duration_since(written);
        Ok(age.to_std().is_ok_and(|age| age > self.session_ttl))
    }

    fn discard_session(&mut self) -> Result<()> {
        self.session = None;
        self.jar.clear();
        self.store.clear()
    }

    async fn login(&mut self) -> Result<()> {
        debug!(house_id = self.house_id, "logging in");
        self.jar.clear();

        let req = self.request(Method::GET, LOGIN_PATH);
        let body = self.execute(req, None).await?.text().await?;
        if !markup::has_login_form(&body) {
            return Err(Error::Connectivity(
                "login page did not contain the login form".into(),
            ));
        }
        let token = markup::extract_authenticity_token(&body)?;

        let form = protocol::login_form(
            &self.credentials.login,
            &self.credentials.password,
            &token,
        );
        let req = self.request(Method::POST, SESSION_PATH).form(&form[..]);
        let log_body = json!({ "login": self.credentials.login.as_str() });
        let resp = self.execute(req, Some(&log_body)).await?;
        debug!(status = resp.status().as_u16(), "credentials submitted");
        Ok(())
    }

    async fn fetch_thermostats(&mut self) -> Result<Vec<Thermostat>> {
        self.ensure_session(false).await?;

        let path = protocol::climate_path(self.house_id);
        let mut renewals = 0;
        let body = loop {
            let req = self.request(Method::GET, &path);
            let resp = self.execute(req, None).await?;
            let status = resp.status();

            if protocol::is_permanent_redirect(status) {
                return Err(Error::EndpointMoved {
                    url: self.url(&path),
                    status: status.as_u16(),
                });
            }
            if status.is_success() {
                break resp.text().await?;
            }
            if renewals >= MAX_SESSION_RENEWALS {
                return Err(Error::Request {
                    url: self.url(&path),
                    status: status.as_u16(),
                });
            }

            renewals += 1;
            warn!(status = status.as_u16(), "climate page rejected, renewing session");
            self.ensure_session(true).await?;
        };

        let raw = markup::extract_embedded_array(&body, &self.house_id.to_string())?;
        let (thermostats, snapshot) = protocol::decode_thermostats(raw)?;
        if let Some(ref mut logger) = self.logger {
            logger.log_snapshot(self.house_id, &snapshot);
        }
        debug!(count = thermostats.len(), "fetched thermostats");
        Ok(thermostats)
    }

    async fn write_setpoints(
        &mut self,
        thermostat: &Thermostat,
        payload: &SetpointPayload,
    ) -> Result<bool> {
        let zone_id = thermostat.require_zone()?.id.ok_or_else(|| {
            Error::MarkupChanged(format!("zone of thermostat {} has no id", thermostat.id))
        })?;
        let csrf_token = match self.session.as_ref().map(|s| s.csrf_token.clone()) {
            Some(token) => token,
            None => self.ensure_session(false).await?.csrf_token.clone(),
        };

        let path = protocol::setpoints_path(self.house_id, zone_id);
        let req = self
            .request(Method::PUT, &path)
            .header(CSRF_HEADER, csrf_token)
            .json(payload);
        let log_body = serde_json::to_value(payload)?;
        let resp = self.execute(req, Some(&log_body)).await?;
        let status = resp.status();

        if !status.is_success() {
            warn!(
                thermostat = thermostat.id,
                status = status.as_u16(),
                "setpoint write rejected"
            );
        }
        Ok(status.is_success())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, self.url(path));
        match self.jar.header_value() {
            Some(cookies) => req.header(COOKIE, cookies),
            None => req,
        }
    }

    async fn execute(&mut self, req: RequestBuilder, log_body: Option<&Value>) -> Result<Response> {
        let req = req.build()?;
        let method = req.method().clone();
        let path = req.url().path().to_string();
        debug!(%method, path = %path, "portal request");
        if let Some(ref mut logger) = self.logger {
            logger.log_request(method.as_str(), &path, log_body);
        }

        let resp = self.http.execute(req).await?;
        self.jar.absorb(resp.headers());

        let status = resp.status().as_u16();
        trace!(%method, path = %path, status, "portal response");
        if let Some(ref mut logger) = self.logger {
            logger.log_response(method.as_str(), &path, status);
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let builder = NexiaClient::builder(1, "me", "pw");
        assert_eq!(builder.base_url, DEFAULT_BASE_URL);
        assert_eq!(builder.session_ttl, Duration::from_secs(600));
        assert_eq!(builder.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = NexiaClient::builder(1, "me", "pw")
            .base_url("http://127.0.0.1:8080/")
            .build()
            .unwrap();
        assert_eq!(client.url("/login"), "http://127.0.0.1:8080/login");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            login: "me".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("me"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn fresh_client_has_no_session() {
        let client = NexiaClient::builder(1, "me", "pw").build().unwrap();
        assert!(client.session().is_none());
        assert_eq!(client.house_id(), 1);
    }
}
