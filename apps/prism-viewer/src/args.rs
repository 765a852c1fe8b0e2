//! Command line flags.

use std::path::PathBuf;

use anyhow::{bail, Context};

pub const DEFAULT_VERT: &str = "apps/prism-viewer/shaders/mesh.vert.spv";
pub const DEFAULT_FRAG: &str = "apps/prism-viewer/shaders/mesh.frag.spv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub model: Option<PathBuf>,
    pub texture: Option<PathBuf>,
    pub vert: PathBuf,
    pub frag: PathBuf,
    pub vsync: bool,
    pub frames_in_flight: usize,
    pub help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            model: None,
            texture: None,
            vert: PathBuf::from(DEFAULT_VERT),
            frag: PathBuf::from(DEFAULT_FRAG),
            vsync: false,
            frames_in_flight: 2,
            help: false,
        }
    }
}

impl Args {
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{flag} requires a value"))
            };

            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--vsync" => parsed.vsync = true,
                "--model" => parsed.model = Some(value("--model")?.into()),
                "--texture" => parsed.texture = Some(value("--texture")?.into()),
                "--vert" => parsed.vert = value("--vert")?.into(),
                "--frag" => parsed.frag = value("--frag")?.into(),
                "--frames-in-flight" => {
                    let raw = value("--frames-in-flight")?;
                    parsed.frames_in_flight = raw
                        .parse()
                        .with_context(|| format!("Invalid --frames-in-flight value: {raw}"))?;
                    if parsed.frames_in_flight == 0 {
                        bail!("--frames-in-flight must be at least 1");
                    }
                }
                other => bail!("Unknown argument: {other} (see --help)"),
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Args> {
        Args::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn no_flags_gives_defaults() {
        assert_eq!(parse(&[]).unwrap(), Args::default());
    }

    #[test]
    fn parses_every_flag() {
        let args = parse(&[
            "--model",
            "viking_room.obj",
            "--texture",
            "viking_room.png",
            "--vert",
            "v.spv",
            "--frag",
            "f.spv",
            "--vsync",
            "--frames-in-flight",
            "3",
        ])
        .unwrap();

        assert_eq!(args.model, Some(PathBuf::from("viking_room.obj")));
        assert_eq!(args.texture, Some(PathBuf::from("viking_room.png")));
        assert_eq!(args.vert, PathBuf::from("v.spv"));
        assert_eq!(args.frag, PathBuf::from("f.spv"));
        assert!(args.vsync);
        assert_eq!(args.frames_in_flight, 3);
        assert!(!args.help);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--model"]).is_err());
        assert!(parse(&["--frames-in-flight", "zero"]).is_err());
        assert!(parse(&["--frames-in-flight", "0"]).is_err());
        assert!(parse(&["--wireframe"]).is_err());
    }

    #[test]
    fn help_flag() {
        assert!(parse(&["-h"]).unwrap().help);
        assert!(parse(&["--help"]).unwrap().help);
    }
}
