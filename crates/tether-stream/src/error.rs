use tether_core::error::TransportError;

const DECODE_CODE: &str = "tether.stream.decode_failed";

/// 行内容不是合法 UTF-8。
pub(crate) fn decode_error(err: std::string::FromUtf8Error) -> TransportError {
    TransportError::new(DECODE_CODE, format!("line is not valid UTF-8: {err}")).with_cause(err)
}
