/*!
 * Request extraction and validation.
 *
 * Alpaca clients send parameters in the query string for GET and as a
 * urlencoded form for PUT. Parameter names are matched case-insensitively.
 */
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::extract::{ConnectInfo, FromRequest, Request};
use axum::http::Method;

use crate::error::{ApiError, Result};
use crate::session::ClientIdentity;

/// Largest form body accepted on PUT requests
pub const FORM_BODY_LIMIT: usize = 64 * 1024;

/// Name of the client id parameter
pub const CLIENT_ID: &str = "ClientID";

/// Name of the client transaction id parameter
pub const CLIENT_TRANSACTION_ID: &str = "ClientTransactionID";

/// Request parameters with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Wrap decoded name/value pairs
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// Value of a parameter; repeated parameters are joined with commas
    pub fn get(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .0
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }

    /// Value of a parameter, or the empty string
    pub fn get_or_empty(&self, name: &str) -> String {
        self.get(name).unwrap_or_default()
    }

    fn positive(&self, name: &str) -> Option<u32> {
        self.get(name)
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value >= 1)
    }

    /// The client transaction id if it is a valid non-negative integer, else 0
    pub fn transaction_id_or_zero(&self) -> u32 {
        self.get(CLIENT_TRANSACTION_ID)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }
}

/// An Alpaca request: method, parameters and peer address
#[derive(Debug, Clone)]
pub struct AlpacaRequest {
    /// HTTP method
    pub method: Method,
    /// Query parameters (GET) or form fields (everything else)
    pub params: Params,
    /// Address of the peer
    pub remote: SocketAddr,
}

#[async_trait]
impl<S> FromRequest<S> for AlpacaRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self> {
        let (parts, body) = req.into_parts();

        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
            .ok_or_else(|| ApiError::internal("Internal error: peer address unavailable"))?;

        let pairs: Vec<(String, String)> = if parts.method == Method::GET {
            serde_urlencoded::from_str(parts.uri.query().unwrap_or_default())
                .map_err(|_| ApiError::validation("Invalid request"))?
        } else {
            let bytes = to_bytes(body, FORM_BODY_LIMIT)
                .await
                .map_err(|_| ApiError::validation("Invalid request"))?;
            serde_urlencoded::from_bytes(&bytes).map_err(|_| ApiError::validation("Invalid request"))?
        };

        Ok(Self {
            method: parts.method,
            params: Params::from_pairs(pairs),
            remote,
        })
    }
}

/// A request addressed to one device, with validated identifiers
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    /// Device number from the path
    pub device_number: u32,
    /// Who is asking
    pub client: ClientIdentity,
    /// Client transaction id, echoed in the envelope
    pub client_transaction_id: u32,
    /// Remaining parameters
    pub params: Params,
}

impl DeviceRequest {
    /// Validate the device number, ClientID and ClientTransactionID, in that order
    pub fn validate(device_id: &str, request: AlpacaRequest) -> Result<Self> {
        let device_number = device_id
            .parse::<u32>()
            .map_err(|_| ApiError::validation("Invalid device_id parameter"))?;

        let client_id = request
            .params
            .positive(CLIENT_ID)
            .ok_or_else(|| ApiError::validation("Invalid or missing ClientID parameter"))?;

        let client_transaction_id = request
            .params
            .positive(CLIENT_TRANSACTION_ID)
            .ok_or_else(|| ApiError::validation("Invalid or missing ClientTransactionID parameter"))?;

        Ok(Self {
            device_number,
            client: ClientIdentity::new(request.remote.ip(), client_id),
            client_transaction_id,
            params: request.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pairs: &[(&str, &str)]) -> AlpacaRequest {
        AlpacaRequest {
            method: Method::GET,
            params: Params::from_pairs(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            remote: SocketAddr::from(([10, 0, 0, 7], 50000)),
        }
    }

    fn rejection(device_id: &str, pairs: &[(&str, &str)]) -> String {
        DeviceRequest::validate(device_id, request(pairs))
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_params_are_case_insensitive_and_joined() {
        let params = request(&[("clientid", "4"), ("Tag", "a"), ("TAG", "b")]).params;
        assert_eq!(params.get("ClientID").as_deref(), Some("4"));
        assert_eq!(params.get("tag").as_deref(), Some("a,b"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.get_or_empty("missing"), "");
    }

    #[test]
    fn test_valid_request() {
        let valid = DeviceRequest::validate(
            "2",
            request(&[("ClientID", "4"), ("clienttransactionid", "17")]),
        )
        .unwrap();
        assert_eq!(valid.device_number, 2);
        assert_eq!(valid.client.to_string(), "10.0.0.7-4");
        assert_eq!(valid.client_transaction_id, 17);
    }

    #[test]
    fn test_validation_order() {
        let ok = [("ClientID", "1"), ("ClientTransactionID", "1")];
        assert_eq!(rejection("x", &ok), "Invalid device_id parameter");
        assert_eq!(rejection("-1", &ok), "Invalid device_id parameter");
        assert_eq!(rejection("x", &[]), "Invalid device_id parameter");
        assert_eq!(
            rejection("0", &[("ClientTransactionID", "1")]),
            "Invalid or missing ClientID parameter"
        );
        assert_eq!(
            rejection("0", &[("ClientID", "0"), ("ClientTransactionID", "1")]),
            "Invalid or missing ClientID parameter"
        );
        assert_eq!(
            rejection("0", &[("ClientID", "1"), ("ClientTransactionID", "0")]),
            "Invalid or missing ClientTransactionID parameter"
        );
        assert_eq!(
            rejection("0", &[("ClientID", "1")]),
            "Invalid or missing ClientTransactionID parameter"
        );
    }

    #[test]
    fn test_transaction_id_or_zero() {
        assert_eq!(request(&[("ClientTransactionID", "9")]).params.transaction_id_or_zero(), 9);
        assert_eq!(request(&[("ClientTransactionID", "-9")]).params.transaction_id_or_zero(), 0);
        assert_eq!(request(&[]).params.transaction_id_or_zero(), 0);
    }
}
