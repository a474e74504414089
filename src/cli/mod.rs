use std::env;
use std::path::Path;

#[derive(Debug, PartialEq, Eq)]
pub enum CliAction {
    PrintVersion,
    InitConfig,
    RunServer,
}

pub fn parse_args() -> CliAction {
    parse(env::args().skip(1))
}

fn parse(args: impl Iterator<Item = String>) -> CliAction {
    let mut version_flag = false;
    let mut init_config = false;
    for arg in args {
        match arg.as_str() {
            "--version" | "-V" => version_flag = true,
            "--init-config" => init_config = true,
            _ => {}
        }
    }
    if version_flag {
        return CliAction::PrintVersion;
    }
    if init_config {
        return CliAction::InitConfig;
    }
    CliAction::RunServer
}

pub fn print_version() {
    println!("Speedtune v{}", env!("CARGO_PKG_VERSION"));
}

pub fn init_config_file() {
    let target = Path::new("Speedtune.toml");
    if target.exists() {
        eprintln!("Speedtune.toml already exists; aborting --init-config");
        return;
    }
    match std::fs::write(target, crate::config::DEFAULT_CONFIG_TEMPLATE) {
        Ok(()) => println!("Created Speedtune.toml"),
        Err(e) => eprintln!("Failed to write Speedtune.toml: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> CliAction {
        parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn version_wins_over_init() {
        assert_eq!(args(&["--init-config", "-V"]), CliAction::PrintVersion);
        assert_eq!(args(&["--init-config"]), CliAction::InitConfig);
        assert_eq!(args(&["--port", "9"]), CliAction::RunServer);
    }
}
