//! reqwest client for the HELO parameter API.
//!
//! Everything on the wire is a `GET`; writes are `action=set` query strings.
//! That is the vendor's design and the device rejects anything else.

use crate::adapters::helo::retry::RetryPolicy;
use crate::domain::param::{Descriptor, DescriptorCache, ParamReading};
use crate::ports::device::{DeviceControl, DeviceError, DeviceFactory, LogEntry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

fn transport_error(err: reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout
    } else {
        DeviceError::Connect(err.to_string())
    }
}

/// One HELO, addressed by base URL.
pub struct HeloDevice {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    probe_timeout: Duration,
    retry: RetryPolicy,
    // Descriptors are firmware-static, fetched once per paramid
    descriptors: Mutex<DescriptorCache>,
}

impl HeloDevice {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(
            reqwest::Client::new(),
            base_url,
            DEFAULT_REQUEST_TIMEOUT,
            DEFAULT_PROBE_TIMEOUT,
            RetryPolicy::default(),
        )
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        request_timeout: Duration,
        probe_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            request_timeout,
            probe_timeout,
            retry,
            descriptors: Mutex::new(DescriptorCache::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // reqwest's query serializer percent-encodes every value, which the
    // device needs for filename prefixes with spaces and reserved characters.
    async fn request_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, DeviceError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status {
                code: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| DeviceError::Decode(e.to_string()))
    }

    async fn get_once(&self, paramid: &str) -> Result<ParamReading, DeviceError> {
        let body = self
            .request_json(
                "config",
                &[("action", "get"), ("paramid", paramid)],
                self.request_timeout,
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn set_once(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError> {
        let body = self
            .request_json(
                "config",
                &[("action", "set"), ("paramid", paramid), ("value", value)],
                self.request_timeout,
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn fetch_descriptor(&self, paramid: &str) -> Result<Descriptor, DeviceError> {
        let body = self
            .request_json("descriptors", &[("paramid", paramid)], self.request_timeout)
            .await?;
        let mut list: Vec<Descriptor> = serde_json::from_value(body)?;
        if list.len() != 1 {
            return Err(DeviceError::Protocol(format!(
                "descriptor response for {} held {} entries, expected 1",
                paramid,
                list.len()
            )));
        }
        Ok(list.remove(0))
    }
}

#[async_trait]
impl DeviceControl for HeloDevice {
    async fn get_param(&self, paramid: &str) -> Result<ParamReading, DeviceError> {
        self.retry.run(|| self.get_once(paramid)).await
    }

    async fn set_param(&self, paramid: &str, value: &str) -> Result<ParamReading, DeviceError> {
        self.retry.run(|| self.set_once(paramid, value)).await
    }

    async fn descriptor(&self, paramid: &str) -> Result<Descriptor, DeviceError> {
        if let Some(cached) = self.descriptors.lock().unwrap().get(paramid) {
            return Ok(cached.clone());
        }
        let descriptor = self.retry.run(|| self.fetch_descriptor(paramid)).await?;
        self.descriptors
            .lock()
            .unwrap()
            .insert(paramid, descriptor.clone());
        Ok(descriptor)
    }

    async fn fetch_logs(&self) -> Result<Vec<LogEntry>, DeviceError> {
        let body = self
            .retry
            .run(|| self.request_json("logwatch.tmpl", &[], self.request_timeout))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn probe(&self) -> Result<(), DeviceError> {
        // Single attempt on purpose: discovery sweeps many dead addresses
        self.request_json("config", &[], self.probe_timeout)
            .await
            .map(|_| ())
    }
}

/// Opens [`HeloDevice`] handles that share one connection pool.
#[derive(Clone)]
pub struct HeloConnector {
    http: reqwest::Client,
    request_timeout: Duration,
    probe_timeout: Duration,
    retry: RetryPolicy,
}

impl HeloConnector {
    pub fn new(request_timeout: Duration, probe_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            request_timeout,
            probe_timeout,
            retry,
        }
    }
}

impl Default for HeloConnector {
    fn default() -> Self {
        Self::new(
            DEFAULT_REQUEST_TIMEOUT,
            DEFAULT_PROBE_TIMEOUT,
            RetryPolicy::default(),
        )
    }
}

impl DeviceFactory for HeloConnector {
    type Device = HeloDevice;

    fn connect(&self, base_url: &str) -> HeloDevice {
        HeloDevice::with_client(
            self.http.clone(),
            base_url,
            self.request_timeout,
            self.probe_timeout,
            self.retry.clone(),
        )
    }
}
