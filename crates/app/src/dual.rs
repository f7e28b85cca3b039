//! Two isolated pipeline instances in child processes.
//!
//! Each instance owns its camera, preview window, and (optionally) stream
//! port outright; the parent only launches the children and forwards their
//! exit status. There is no shared state and no coordination between the
//! two; one instance failing never touches the other.

use std::{
    process::{Child, Command},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{error, info};

const DUAL_USAGE: &str = "Usage: cargo run -p app --features with-tch -- \
dual --model <path> [--cameras <a,b>] [--ids <a,b>] [--ports <a,b>] \
[--width <px>] [--height <px>] [--min-detection-confidence <0-1>] \
[--min-tracking-confidence <0-1>]\n\nWithout --ports the children render \
previews only; with it each child streams on its own port.";

struct DualArgs {
    cameras: (i32, i32),
    ids: (i32, i32),
    ports: Option<(u16, u16)>,
    /// Flags forwarded verbatim to both children.
    passthrough: Vec<String>,
}

pub(crate) fn run_from_args(args: &[String]) -> Result<()> {
    run(parse_args(args)?)
}

fn parse_args(args: &[String]) -> Result<DualArgs> {
    let mut cameras = (0, 1);
    let mut ids = (1, 2);
    let mut ports = None;
    let mut passthrough = Vec::new();

    let mut idx = 2;
    while idx < args.len() {
        match args[idx].as_str() {
            "--cameras" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| anyhow!("--cameras requires a value"))?;
                cameras = parse_pair("--cameras", value)?;
                idx += 1;
            }
            "--ids" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| anyhow!("--ids requires a value"))?;
                ids = parse_pair("--ids", value)?;
                idx += 1;
            }
            "--ports" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| anyhow!("--ports requires a value"))?;
                let pair: (u16, u16) = parse_pair("--ports", value)?;
                if pair.0 == 0 || pair.1 == 0 {
                    bail!("--ports values must be between 1 and 65535");
                }
                ports = Some(pair);
                idx += 1;
            }
            "--help" | "-h" => bail!(DUAL_USAGE),
            flag @ ("--model"
            | "--width"
            | "--height"
            | "--min-detection-confidence"
            | "--min-tracking-confidence") => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| anyhow!("{flag} requires a value"))?;
                passthrough.push(flag.to_string());
                passthrough.push(value.clone());
                idx += 1;
            }
            other => bail!("Unrecognised argument: {other}\n\n{DUAL_USAGE}"),
        }
    }

    if cameras.0 == cameras.1 {
        bail!("--cameras must name two distinct devices");
    }
    if let Some((a, b)) = ports {
        if a == b {
            bail!("--ports must name two distinct ports");
        }
    }

    Ok(DualArgs {
        cameras,
        ids,
        ports,
        passthrough,
    })
}

fn parse_pair<T: FromStr>(flag: &str, value: &str) -> Result<(T, T)> {
    let mut parts = value.splitn(2, ',');
    let first = parts.next().unwrap_or_default();
    let second = parts
        .next()
        .ok_or_else(|| anyhow!("{flag} expects two comma-separated values"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<T>()
            .map_err(|_| anyhow!("{flag}: invalid value {part:?}"))
    };
    Ok((parse(first)?, parse(second)?))
}

fn run(args: DualArgs) -> Result<()> {
    let exe = std::env::current_exe().context("failed to locate the current executable")?;

    let instances = [
        (args.ids.0, args.cameras.0, args.ports.map(|p| p.0)),
        (args.ids.1, args.cameras.1, args.ports.map(|p| p.1)),
    ];

    let mut children: Vec<(i32, Child)> = Vec::with_capacity(instances.len());
    for (id, camera, port) in instances {
        let mut cmd = Command::new(&exe);
        cmd.arg("track")
            .arg("--id")
            .arg(id.to_string())
            .arg("--camera")
            .arg(camera.to_string());
        match port {
            Some(port) => {
                cmd.arg("--port").arg(port.to_string());
            }
            None => {
                cmd.arg("--no-stream");
            }
        }
        cmd.args(&args.passthrough);

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to launch pipeline instance {id}"))?;
        info!(
            "launched pipeline instance {id} (camera {camera}, pid {})",
            child.id()
        );
        children.push((id, child));
    }

    let mut failed = false;
    for (id, mut child) in children {
        let status = child
            .wait()
            .with_context(|| format!("failed to wait on pipeline instance {id}"))?;
        if status.success() {
            info!("pipeline instance {id} exited cleanly");
        } else {
            error!("pipeline instance {id} exited with {status}");
            failed = true;
        }
    }

    if failed {
        bail!("one or more pipeline instances failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tail: &[&str]) -> Vec<String> {
        let mut all = vec!["app".to_string(), "dual".to_string()];
        all.extend(tail.iter().map(|s| s.to_string()));
        all
    }

    #[test]
    fn defaults_match_the_two_camera_layout() {
        let parsed = parse_args(&args(&["--model", "pose.pt"])).unwrap();
        assert_eq!(parsed.cameras, (0, 1));
        assert_eq!(parsed.ids, (1, 2));
        assert!(parsed.ports.is_none());
        assert_eq!(parsed.passthrough, vec!["--model", "pose.pt"]);
    }

    #[test]
    fn pair_flags_parse_comma_separated_values() {
        let parsed =
            parse_args(&args(&["--cameras", "2,3", "--ids", "5,6", "--ports", "9100,9101"]))
                .unwrap();
        assert_eq!(parsed.cameras, (2, 3));
        assert_eq!(parsed.ids, (5, 6));
        assert_eq!(parsed.ports, Some((9100, 9101)));
    }

    #[test]
    fn identical_cameras_are_rejected() {
        assert!(parse_args(&args(&["--cameras", "1,1"])).is_err());
    }

    #[test]
    fn identical_ports_are_rejected() {
        assert!(parse_args(&args(&["--ports", "9100,9100"])).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(parse_args(&args(&["--fps", "60"])).is_err());
    }
}
