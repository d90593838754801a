use std::io;

use serde::Serialize;
use umbra_accountant::contracts::envelope::failure_from_error;
use umbra_accountant::{ClientError, SuccessEnvelope};

pub fn render_success_json(success: &SuccessEnvelope) -> io::Result<String> {
    serialize_json_pretty(success)
}

/// `{ok: false, error: {...}, data?}`; `data` carries row issues and other
/// structured detail when the error has it.
pub fn render_error_json(error: &ClientError) -> io::Result<String> {
    serialize_json_pretty(&failure_from_error(error))
}

fn serialize_json_pretty<T>(value: &T) -> io::Result<String>
where
    T: Serialize,
{
    serde_json::to_string_pretty(value).map_err(io::Error::other)
}
