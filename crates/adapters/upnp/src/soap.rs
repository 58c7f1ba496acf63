//! SOAP calls against a device's `basicevent1` and `deviceevent1` services.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use crate::error::UpnpError;
use crate::parser::{self, AttributeList, BinaryState};

const BASIC_EVENT: Service = Service {
    urn: "urn:Belkin:service:basicevent:1",
    control: "/upnp/control/basicevent1",
};

const DEVICE_EVENT: Service = Service {
    urn: "urn:Belkin:service:deviceevent:1",
    control: "/upnp/control/deviceevent1",
};

struct Service {
    urn: &'static str,
    control: &'static str,
}

/// Polling and control capability consumed by the consumer and adapter.
///
/// `address` is the device base URL, e.g. `http://192.168.1.20:49153`.
pub trait DeviceClient: Send + Sync + 'static {
    fn fetch_attributes(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<AttributeList, UpnpError>> + Send;

    fn fetch_binary_state(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<BinaryState, UpnpError>> + Send;

    fn set_binary_state(
        &self,
        address: &str,
        on: bool,
    ) -> impl Future<Output = Result<(), UpnpError>> + Send;
}

/// [`DeviceClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct SoapClient {
    client: Client,
}

impl SoapClient {
    /// # Errors
    ///
    /// Returns [`UpnpError::Http`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, UpnpError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn call(
        &self,
        address: &str,
        service: &Service,
        action: &'static str,
        arguments: &str,
    ) -> Result<String, UpnpError> {
        let body = envelope(service.urn, action, arguments);
        let response = self
            .client
            .post(format!("{}{}", address.trim_end_matches('/'), service.control))
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPACTION", format!("\"{}#{action}\"", service.urn))
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UpnpError::Status {
                action,
                status: response.status().as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

impl DeviceClient for SoapClient {
    async fn fetch_attributes(&self, address: &str) -> Result<AttributeList, UpnpError> {
        let text = self.call(address, &DEVICE_EVENT, "GetAttributes", "").await?;
        AttributeList::find(&parser::decode(&text)).ok_or(UpnpError::UnexpectedResponse {
            action: "GetAttributes",
        })
    }

    async fn fetch_binary_state(&self, address: &str) -> Result<BinaryState, UpnpError> {
        let text = self.call(address, &BASIC_EVENT, "GetBinaryState", "").await?;
        BinaryState::find(&parser::decode(&text)).ok_or(UpnpError::UnexpectedResponse {
            action: "GetBinaryState",
        })
    }

    async fn set_binary_state(&self, address: &str, on: bool) -> Result<(), UpnpError> {
        let arguments = format!("<BinaryState>{}</BinaryState>", u8::from(on));
        self.call(address, &BASIC_EVENT, "SetBinaryState", &arguments)
            .await?;
        Ok(())
    }
}

fn envelope(urn: &str, action: &str, arguments: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{urn}">{arguments}</u:{action}></s:Body></s:Envelope>"#
    )
}
