//! Command-line parsing.
//!
//! Usage:
//!   agent [--config agent.json] [--worker-id ID] [--worker-type TYPE]
//!         [--host HOST] [--port PORT] [--link agent://host:port]
//!         [--retries N] [--retry-delay-ms MS] [--tick-hz HZ]
//!         [--starting-chunk-min-x X] [--starting-chunk-min-z Z]
//!         [--starting-chunk-size-x W] [--starting-chunk-size-z H]
//!
//! `--config` is applied first wherever it appears; every other flag
//! overrides the loaded values. Unknown arguments are skipped.

use std::{path::Path, str::FromStr};

use agent_shared::config::AgentConfig;
use anyhow::Context;

pub fn parse_args() -> anyhow::Result<AgentConfig> {
    parse_args_from(std::env::args().skip(1))
}

pub fn parse_args_from<I, S>(args: I) -> anyhow::Result<AgentConfig>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            AgentConfig::from_json_file(Path::new(path))?
        }
        None => AgentConfig::default(),
    };

    let mut i = 0;
    while i < args.len() {
        let Some(value) = args.get(i + 1) else {
            break;
        };
        let flag = args[i].as_str();
        match flag {
            "--config" => {}
            "--worker-id" => cfg.worker_id = value.clone(),
            "--worker-type" => cfg.worker_type = value.clone(),
            "--host" => cfg.host = value.clone(),
            "--port" => cfg.port = number(flag, value)?,
            "--link" => cfg.link = Some(value.clone()),
            "--retries" => cfg.network_retries = number(flag, value)?,
            "--retry-delay-ms" => cfg.retry_delay_ms = number(flag, value)?,
            "--tick-hz" => cfg.tick_hz = number(flag, value)?,
            "--starting-chunk-min-x" => cfg.starting_chunk_min_x = Some(number(flag, value)?),
            "--starting-chunk-min-z" => cfg.starting_chunk_min_z = Some(number(flag, value)?),
            "--starting-chunk-size-x" => cfg.starting_chunk_size_x = Some(number(flag, value)?),
            "--starting-chunk-size-z" => cfg.starting_chunk_size_z = Some(number(flag, value)?),
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn number<T>(flag: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("{flag}: invalid value {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_args_gives_defaults() {
        let cfg = parse_args_from(Vec::<String>::new()).unwrap();
        assert_eq!(cfg.port, 7777);
        assert_eq!(cfg.network_retries, 3);
        assert!(cfg.starting_region().is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = parse_args_from([
            "--worker-id",
            "bot-17",
            "--port",
            "9000",
            "--retries",
            "5",
            "--tick-hz",
            "20",
            "--link",
            "agent://sim:7000",
        ])
        .unwrap();

        assert_eq!(cfg.worker_id, "bot-17");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.network_retries, 5);
        assert_eq!(cfg.tick_period_ms(), 50);
        assert_eq!(cfg.endpoint().unwrap(), "sim:7000");
    }

    #[test]
    fn starting_chunk_flags_are_independent() {
        let cfg = parse_args_from(["--starting-chunk-min-x", "3", "--starting-chunk-size-z", "2"])
            .unwrap();
        assert_eq!(cfg.starting_chunk_min_x, Some(3));
        assert_eq!(cfg.starting_chunk_min_z, None);
        assert_eq!(cfg.starting_chunk_size_z, Some(2));
        assert!(cfg.starting_region().is_none());

        let cfg = parse_args_from([
            "--starting-chunk-min-x",
            "3",
            "--starting-chunk-min-z",
            "-4",
            "--starting-chunk-size-x",
            "1",
            "--starting-chunk-size-z",
            "2",
        ])
        .unwrap();
        let region = cfg.starting_region().unwrap();
        assert_eq!((region.min_x, region.min_z), (3, -4));
    }

    #[test]
    fn unknown_arguments_are_skipped() {
        let cfg = parse_args_from(["--verbose", "--host", "10.0.0.2", "stray"]).unwrap();
        assert_eq!(cfg.host, "10.0.0.2");
    }

    #[test]
    fn bad_number_is_an_error() {
        let err = parse_args_from(["--port", "seventy"]).unwrap_err();
        assert!(format!("{err:#}").contains("--port"));
    }

    #[test]
    fn invalid_map_in_config_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("agent-args-map-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "map": { "half_map_width": 55 } }"#).unwrap();

        let err = parse_args_from(["--config".to_string(), path.display().to_string()]).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(format!("{err:#}").contains("half_map_width"));
    }

    #[test]
    fn config_file_is_base_for_overrides() {
        let path = std::env::temp_dir().join(format!("agent-args-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "worker_id": "from-file", "port": 8100 }"#).unwrap();

        let cfg = parse_args_from([
            "--port".to_string(),
            "8200".to_string(),
            "--config".to_string(),
            path.display().to_string(),
        ])
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.worker_id, "from-file");
        assert_eq!(cfg.port, 8200);
    }
}
