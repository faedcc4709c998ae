use serde::Serialize;
use tablepb_codec::DEFAULT_MAX_DEPTH;
use tablepb_wire::DEFAULT_MAX_FRAME;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<BuildInfo>,
}

#[derive(Serialize)]
struct BuildInfo {
    target: &'static str,
    profile: &'static str,
    rustc: &'static str,
    git_hash: &'static str,
    async_framing: bool,
    default_max_depth: usize,
    default_max_frame: usize,
}

impl BuildInfo {
    fn current() -> Self {
        Self {
            target: option_env!("TABLEPB_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("TABLEPB_BUILD_PROFILE").unwrap_or("unknown"),
            rustc: option_env!("RUSTC_VERSION").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            async_framing: cfg!(feature = "async"),
            default_max_depth: DEFAULT_MAX_DEPTH,
            default_max_frame: DEFAULT_MAX_FRAME,
        }
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("target", self.target.to_string()),
            ("profile", self.profile.to_string()),
            ("rustc", self.rustc.to_string()),
            ("git_hash", self.git_hash.to_string()),
            ("async_framing", self.async_framing.to_string()),
            ("default_max_depth", self.default_max_depth.to_string()),
            ("default_max_frame", self.default_max_frame.to_string()),
        ]
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let out = VersionOutput {
        name: "tablepb",
        version: env!("CARGO_PKG_VERSION"),
        build: args.extended.then(BuildInfo::current),
    };

    match (format, &out.build) {
        (OutputFormat::Json, _) => print_json(&out),
        (OutputFormat::Table, Some(build)) => {
            let mut table = new_table(["KEY", "VALUE"]);
            table.add_row(vec!["version".to_string(), out.version.to_string()]);
            for (key, value) in build.entries() {
                table.add_row(vec![key.to_string(), value]);
            }
            println!("{table}");
        }
        (_, Some(build)) => {
            println!("name: {}", out.name);
            println!("version: {}", out.version);
            for (key, value) in build.entries() {
                println!("{key}: {value}");
            }
        }
        (_, None) => println!("{} {}", out.name, out.version),
    }

    Ok(SUCCESS)
}
