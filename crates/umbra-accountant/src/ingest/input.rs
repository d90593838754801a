use std::fs;
use std::io::{IsTerminal, Read};

use crate::ingest::invalid_input_error;
use crate::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum SourceKind {
    File,
    Stdin,
}

impl SourceKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Stdin => "stdin",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedSource {
    pub(crate) source_kind: SourceKind,
    pub(crate) source_ref: Option<String>,
    pub(crate) content: String,
}

/// Picks exactly one input: a file path, or stdin when the path is `-` or
/// absent. `stdin_override` stands in for the process stdin.
pub(crate) fn resolve_source(
    path: Option<&str>,
    stdin_override: Option<String>,
    command: &str,
) -> ClientResult<ResolvedSource> {
    let stdin_body = read_stdin(stdin_override)?;

    match path {
        Some("-") | None => match stdin_body {
            Some(content) => Ok(ResolvedSource {
                source_kind: SourceKind::Stdin,
                source_ref: None,
                content,
            }),
            None if path.is_some() => Err(invalid_input_error(
                "Path `-` means stdin input, but stdin was empty. Pipe JSON/CSV input or pass a file path.",
            )),
            None => Err(invalid_input_error(
                "No input source provided. Pass a file path or pipe input via stdin.",
            )),
        },
        Some(path_value) => {
            if stdin_body.is_some() {
                return Err(invalid_input_error(
                    "Both stdin and file input were provided. Pass exactly one source: either a file path or piped stdin.",
                ));
            }
            let content = fs::read_to_string(path_value).map_err(|error| {
                ClientError::invalid_argument_with_recovery(
                    &format!("Could not read input file `{path_value}`: {error}"),
                    vec![
                        "Verify the path exists and is readable.".to_string(),
                        format!("Rerun `umbra {command} <path>`."),
                    ],
                )
            })?;
            Ok(ResolvedSource {
                source_kind: SourceKind::File,
                source_ref: Some(path_value.to_string()),
                content,
            })
        }
    }
}

fn read_stdin(stdin_override: Option<String>) -> ClientResult<Option<String>> {
    let body = match stdin_override {
        Some(value) => value,
        None => {
            if std::io::stdin().is_terminal() {
                return Ok(None);
            }
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|error| {
                    ClientError::invalid_argument_with_recovery(
                        &format!("Could not read stdin: {error}"),
                        vec![
                            "Retry with an explicit file path argument.".to_string(),
                            "Or rerun with valid stdin content.".to_string(),
                        ],
                    )
                })?;
            buffer
        }
    };

    if body.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(body))
}
