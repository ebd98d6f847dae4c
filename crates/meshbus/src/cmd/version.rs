use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print, OutputFormat, Render};

#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    features: Vec<&'static str>,
}

impl VersionInfo {
    fn collect() -> Self {
        let mut features = vec!["cli"];
        if cfg!(feature = "peer") {
            features.push("peer");
        }
        if cfg!(feature = "async") {
            features.push("async");
        }
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("MESHBUS_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("MESHBUS_BUILD_PROFILE").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            features,
        }
    }
}

impl Render for VersionInfo {
    fn header(&self) -> Vec<&'static str> {
        vec!["FIELD", "VALUE"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        [
            ("name", self.name.to_string()),
            ("version", self.version.to_string()),
            ("target", self.target.to_string()),
            ("profile", self.profile.to_string()),
            ("target_os", self.target_os.to_string()),
            ("target_arch", self.target_arch.to_string()),
            ("features", self.features.join(",")),
        ]
        .into_iter()
        .map(|(field, value)| vec![field.to_string(), value])
        .collect()
    }

    fn pretty(&self) -> String {
        self.rows()
            .into_iter()
            .map(|row| row.join(": "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("meshbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    print(&VersionInfo::collect(), format);
    Ok(SUCCESS)
}
