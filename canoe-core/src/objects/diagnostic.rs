//! Diagnostic device, request and response wrappers.

use serde::Serialize;

use crate::collection::Collection;
use crate::errors::{CanoeError, Result};
use crate::proxy::Proxy;
use crate::value::Value;

proxy! {
    /// Diagnostic access to one ECU.
    pub struct Diagnostic;
}

impl Diagnostic {
    getters! {
        tester_present_status: bool => "TesterPresentStatus";
    }

    /// Request built from a diagnostic primitive qualifier path.
    pub fn create_request(&self, primitive_path: &str) -> Result<DiagnosticRequest> {
        self.handle.call_child("CreateRequest", &[Value::from(primitive_path)])
    }

    /// Request built from raw request bytes.
    pub fn create_request_from_stream(&self, stream: &[u8]) -> Result<DiagnosticRequest> {
        self.handle.call_child("CreateRequestFromStream", &[Value::from(stream)])
    }

    pub fn start_tester_present(&self) -> Result<()> {
        self.handle.invoke("DiagStartTesterPresent", &[]).map(drop)
    }

    pub fn stop_tester_present(&self) -> Result<()> {
        self.handle.invoke("DiagStopTesterPresent", &[]).map(drop)
    }
}

proxy! {
    pub struct DiagnosticRequest;
}

impl DiagnosticRequest {
    getters! {
        /// `true` while responses may still arrive.
        pending: bool => "Pending";
        suppress_positive_response: bool => "SuppressPositiveResponse";
    }

    setters! {
        set_suppress_positive_response: bool => "SuppressPositiveResponse";
    }

    pub fn responses(&self) -> Result<Collection<DiagnosticResponse>> {
        self.handle.child("Responses")
    }

    pub fn send(&self) -> Result<()> {
        self.handle.invoke("Send", &[]).map(drop)
    }

    pub fn set_parameter(&self, qualifier: &str, value: impl Into<Value>) -> Result<()> {
        self.handle
            .invoke("SetParameter", &[Value::from(qualifier), value.into()])
            .map(drop)
    }

    pub fn set_complex_parameter(
        &self,
        qualifier: &str,
        iteration: i32,
        sub_parameter: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.handle
            .invoke(
                "SetComplexParameter",
                &[
                    Value::from(qualifier),
                    Value::from(iteration),
                    Value::from(sub_parameter),
                    value.into(),
                ],
            )
            .map(drop)
    }
}

proxy! {
    pub struct DiagnosticResponse;
}

impl DiagnosticResponse {
    getters! {
        positive: bool => "Positive";
        response_code: i32 => "ResponseCode";
        /// Qualifier of the ECU that answered.
        sender: String => "Sender";
        stream: Vec<u8> => "Stream";
    }

    /// `mode` selects the representation the server returns (raw bytes,
    /// numeric or symbolic).
    pub fn get_parameter(&self, qualifier: &str, mode: i32) -> Result<Value> {
        self.handle
            .invoke("GetParameter", &[Value::from(qualifier), Value::from(mode)])
    }

    pub fn get_complex_parameter(
        &self,
        qualifier: &str,
        iteration: i32,
        sub_parameter: &str,
        mode: i32,
    ) -> Result<Value> {
        self.handle.invoke(
            "GetComplexParameter",
            &[
                Value::from(qualifier),
                Value::from(iteration),
                Value::from(sub_parameter),
                Value::from(mode),
            ],
        )
    }

    pub fn get_complex_iteration_count(&self, qualifier: &str) -> Result<i32> {
        self.handle
            .call("GetComplexIterationCount", &[Value::from(qualifier)])
    }

    pub fn is_complex_parameter(&self, qualifier: &str) -> Result<bool> {
        self.handle
            .call("IsComplexParameter", &[Value::from(qualifier)])
    }

    /// Read all fields into a serializable record.
    pub fn info(&self) -> Result<DiagResponseInfo> {
        let stream = self.stream()?;
        Ok(DiagResponseInfo {
            sender: self.sender()?,
            positive: self.positive()?,
            response_code: self.response_code()?,
            stream_text: format_hex_stream(&stream),
            stream,
        })
    }
}

/// Snapshot of one diagnostic response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagResponseInfo {
    pub sender: String,
    pub positive: bool,
    pub response_code: i32,
    pub stream: Vec<u8>,
    /// `stream` as upper-case hex pairs separated by spaces.
    pub stream_text: String,
}

/// Parse `"10 01"` / `"1001"` into request bytes.
///
/// Whitespace is ignored.  An odd digit count or a non-hex digit is
/// `InvalidArgument`, as is an empty request.
pub fn parse_hex_stream(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.is_empty() {
        return Err(CanoeError::InvalidArgument("empty diagnostic request".into()));
    }
    if digits.len() % 2 != 0 {
        return Err(CanoeError::InvalidArgument(format!(
            "diagnostic request '{text}' has an odd number of hex digits"
        )));
    }
    // `from_str_radix` alone would accept a leading sign.
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(CanoeError::InvalidArgument(format!(
            "diagnostic request '{text}' is not hexadecimal"
        )));
    }
    Ok(digits
        .chunks(2)
        .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
        .collect())
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// `[0x50, 0x01]` -> `"50 01"`.
pub fn format_hex_stream(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
