use crate::cli::Cli;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OutputMode {
    Text,
    Json,
}

pub fn mode_for_cli(cli: &Cli) -> OutputMode {
    if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    }
}

/// Used before clap has parsed, e.g. to render a parse error.
pub fn infer_requested_output_mode(raw_args: &[String]) -> OutputMode {
    if raw_args.iter().skip(1).any(|value| value == "--json") {
        OutputMode::Json
    } else {
        OutputMode::Text
    }
}

#[cfg(test)]
mod tests {
    use super::{OutputMode, infer_requested_output_mode, mode_for_cli};
    use crate::cli::parse_from;

    #[test]
    fn json_flag_selects_json_anywhere_on_the_line() {
        let cases: [Vec<&str>; 3] = [
            vec!["umbra", "--json", "fx", "list"],
            vec!["umbra", "fx", "list", "--json"],
            vec!["umbra", "review", "list", "--json", "--user", "u_anna"],
        ];
        for case in cases {
            let parsed = parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse: {case:?}");
            if let Ok(cli) = parsed {
                assert_eq!(mode_for_cli(&cli), OutputMode::Json);
            }
        }
    }

    #[test]
    fn text_is_the_default() {
        let parsed = parse_from(["umbra", "link", "list", "--user", "u_anna"]);
        assert!(parsed.is_ok());
        if let Ok(cli) = parsed {
            assert_eq!(mode_for_cli(&cli), OutputMode::Text);
        }
    }

    #[test]
    fn raw_args_inference_matches_flag_presence() {
        let with_flag = ["umbra", "reconcile", "--json"].map(String::from);
        assert_eq!(infer_requested_output_mode(&with_flag), OutputMode::Json);

        let without_flag = ["umbra", "--json-ish"].map(String::from);
        assert_eq!(infer_requested_output_mode(&without_flag), OutputMode::Text);
    }
}
